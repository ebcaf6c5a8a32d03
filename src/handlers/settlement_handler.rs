//! Settlement Handler
//!
//! Records direct repayments. A settlement row and its two balance changes
//! (payer up, receiver down, same amount) are one batch.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Amount, CurrencySet, DomainError, OperationContext, Settlement, User};
use crate::error::AppError;
use crate::store::{LedgerStore, LedgerWrite, WriteBatch};

use super::{load_user, SettleCommand, SettlementResult, UserRef};

/// Handler for settlements between two users
pub struct SettlementHandler {
    store: Arc<dyn LedgerStore>,
    currencies: Arc<CurrencySet>,
}

impl SettlementHandler {
    pub fn new(store: Arc<dyn LedgerStore>, currencies: Arc<CurrencySet>) -> Self {
        Self { store, currencies }
    }

    /// Execute the settle command.
    ///
    /// Every call records a new settlement; identical repeated calls are not
    /// merged unless the context carries an idempotency key.
    pub async fn settle(
        &self,
        command: SettleCommand,
        context: &OperationContext,
    ) -> Result<SettlementResult, AppError> {
        let amount = Amount::new(command.amount).map_err(DomainError::from)?;
        let currency = self
            .currencies
            .resolve(&command.currency)
            .map_err(DomainError::from)?;

        let payer = load_user(self.store.as_ref(), command.payer).await?;
        let receiver = self.resolve_receiver(&payer, &command.receiver).await?;

        if payer.id == receiver.id {
            return Err(DomainError::SameUserSettlement.into());
        }

        let settlement = Settlement {
            id: Uuid::new_v4(),
            payer_id: payer.id,
            receiver_id: receiver.id,
            amount: amount.value(),
            currency,
            created_at: Utc::now(),
        };

        let mut batch = WriteBatch::new("settle").with_idempotency_key(context.idempotency_key);
        batch
            .push(LedgerWrite::InsertSettlement(settlement.clone()))
            .apply_delta(payer.id, &settlement.currency, amount.value())
            .apply_delta(receiver.id, &settlement.currency, -amount.value());

        self.store.commit(batch).await?;

        tracing::info!(
            settlement_id = %settlement.id,
            group_id = payer.group_id,
            payer_id = %payer.id,
            receiver_id = %receiver.id,
            amount = %settlement.amount,
            currency = %settlement.currency,
            "Settlement recorded"
        );

        Ok(SettlementResult {
            settlement,
            payer_name: payer.display_name,
            receiver_name: receiver.display_name,
        })
    }

    /// Find the receiver inside the payer's group.
    async fn resolve_receiver(&self, payer: &User, receiver: &UserRef) -> Result<User, AppError> {
        let found = match receiver {
            UserRef::ExternalId(external_id) => {
                let user = load_user(self.store.as_ref(), *external_id).await?;
                (user.group_id == payer.group_id).then_some(user)
            }
            UserRef::Mention(mention) => {
                let mut matches: Vec<User> = self
                    .store
                    .list_group_users(payer.group_id)
                    .await?
                    .into_iter()
                    .filter(|u| u.matches_mention(mention))
                    .collect();
                if matches.len() > 1 {
                    tracing::warn!(
                        group_id = payer.group_id,
                        mention = %mention,
                        candidates = matches.len(),
                        "Settlement rejected: mention is ambiguous"
                    );
                    return Err(DomainError::AmbiguousUser(mention.clone()).into());
                }
                matches.pop()
            }
        };

        found.ok_or_else(|| {
            let who = match receiver {
                UserRef::ExternalId(id) => id.to_string(),
                UserRef::Mention(m) => m.clone(),
            };
            DomainError::UserNotFound(who).into()
        })
    }
}
