//! User Handler
//!
//! Registration and preferred-currency updates.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{CurrencySet, DomainError, OperationContext, User};
use crate::error::AppError;
use crate::store::{LedgerStore, LedgerWrite, StoreError, WriteBatch};

use super::{
    load_user, RegisterMembersCommand, RegisterMembersResult, RegisterUserCommand,
    SetCurrencyCommand,
};

/// Handler for user registration and settings
pub struct UserHandler {
    store: Arc<dyn LedgerStore>,
    currencies: Arc<CurrencySet>,
}

impl UserHandler {
    pub fn new(store: Arc<dyn LedgerStore>, currencies: Arc<CurrencySet>) -> Self {
        Self { store, currencies }
    }

    /// Register a user on first contact. Fails if the external id is taken.
    pub async fn register(
        &self,
        command: RegisterUserCommand,
        context: &OperationContext,
    ) -> Result<User, AppError> {
        let display_name = normalize_name(&command.display_name)?;

        if self
            .store
            .find_user_by_external_id(command.external_id)
            .await?
            .is_some()
        {
            return Err(DomainError::UserAlreadyExists(command.external_id.to_string()).into());
        }

        let user = User::new(command.external_id, command.group_id, display_name);

        let mut batch =
            WriteBatch::new("register_user").with_idempotency_key(context.idempotency_key);
        batch.push(LedgerWrite::InsertUser(user.clone()));

        self.store.commit(batch).await.map_err(|e| match e {
            // Lost a race with a concurrent registration of the same id
            StoreError::UniqueViolation(_) => AppError::Domain(DomainError::UserAlreadyExists(
                command.external_id.to_string(),
            )),
            other => AppError::from(other),
        })?;

        tracing::info!(
            user_id = %user.id,
            external_id = user.external_id,
            group_id = user.group_id,
            "User registered"
        );

        Ok(user)
    }

    /// Register several members of a group in one batch.
    ///
    /// Ids that are already registered (or repeated in the request) are
    /// skipped rather than reported as errors.
    pub async fn register_members(
        &self,
        command: RegisterMembersCommand,
        context: &OperationContext,
    ) -> Result<RegisterMembersResult, AppError> {
        let mut seen = HashSet::new();
        let mut batch =
            WriteBatch::new("register_members").with_idempotency_key(context.idempotency_key);
        let mut skipped = 0;

        for member in &command.members {
            let display_name = normalize_name(&member.display_name)?;

            if !seen.insert(member.external_id)
                || self
                    .store
                    .find_user_by_external_id(member.external_id)
                    .await?
                    .is_some()
            {
                skipped += 1;
                continue;
            }

            batch.push(LedgerWrite::InsertUser(User::new(
                member.external_id,
                command.group_id,
                display_name,
            )));
        }

        let registered = batch.writes.len();
        if registered > 0 {
            self.store.commit(batch).await?;
        }

        tracing::info!(
            group_id = command.group_id,
            registered,
            skipped,
            "Group members registered"
        );

        Ok(RegisterMembersResult {
            registered,
            skipped,
        })
    }

    /// Set a user's preferred currency.
    pub async fn set_currency(
        &self,
        command: SetCurrencyCommand,
        context: &OperationContext,
    ) -> Result<User, AppError> {
        let currency = self
            .currencies
            .resolve(&command.currency)
            .map_err(DomainError::from)?;

        let mut user = load_user(self.store.as_ref(), command.external_id).await?;

        let mut batch =
            WriteBatch::new("set_currency").with_idempotency_key(context.idempotency_key);
        batch.push(LedgerWrite::SetCurrency {
            user_id: user.id,
            currency: currency.clone(),
        });
        self.store.commit(batch).await?;

        tracing::info!(user_id = %user.id, currency = %currency, "Preferred currency set");

        user.currency = Some(currency);
        Ok(user)
    }
}

fn normalize_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest(
            "display_name must not be empty".to_string(),
        ));
    }
    Ok(name.to_string())
}
