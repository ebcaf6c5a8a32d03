//! Handler tests against the in-memory store

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Arc;
    use uuid::Uuid;

    use crate::domain::{CurrencySet, DomainError, OperationContext};
    use crate::error::{AppError, ErrorKind};
    use crate::handlers::{
        CreateExpenseCommand, MemberInfo, RegisterMembersCommand, RegisterUserCommand,
        RemoveExpenseCommand, SetCurrencyCommand, SettleCommand, SplitExpenseCommand, UserRef,
    };
    use crate::ledger::Ledger;
    use crate::store::MemoryLedgerStore;

    const GROUP: i64 = -1001;
    const OTHER_GROUP: i64 = -2002;

    // U = 1, V = 2, W = 3 in GROUP; X = 9 in OTHER_GROUP
    async fn ledger() -> Ledger {
        let ledger = Ledger::new(Arc::new(MemoryLedgerStore::new()), CurrencySet::default());
        let ctx = OperationContext::new();
        for (id, group, name) in [(1, GROUP, "Ursula"), (2, GROUP, "Victor"), (3, GROUP, "Wendy"), (9, OTHER_GROUP, "Xavier")] {
            ledger
                .register_user(RegisterUserCommand::new(id, group, name), &ctx)
                .await
                .unwrap();
        }
        ledger
    }

    async fn balances(ledger: &Ledger, group_id: i64) -> HashMap<(String, String), Decimal> {
        ledger
            .get_balances(group_id)
            .await
            .unwrap()
            .into_iter()
            .map(|b| ((b.user_name, b.currency.to_string()), b.amount))
            .collect()
    }

    fn expense(amount: Decimal, creator: i64, participants: &[i64]) -> CreateExpenseCommand {
        CreateExpenseCommand {
            amount,
            currency: "USD".to_string(),
            description: "Dinner".to_string(),
            creator,
            participants: participants.to_vec(),
        }
    }

    fn settle(payer: i64, receiver: UserRef, amount: Decimal) -> SettleCommand {
        SettleCommand {
            payer,
            receiver,
            amount,
            currency: "usd".to_string(),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    #[tokio::test]
    async fn test_register_twice_is_already_exists() {
        let ledger = ledger().await;
        let err = ledger
            .register_user(RegisterUserCommand::new(1, GROUP, "Again"), &OperationContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_register_members_skips_known_ids() {
        let ledger = ledger().await;
        let cmd = RegisterMembersCommand {
            group_id: GROUP,
            members: vec![
                MemberInfo { external_id: 1, display_name: "Ursula".into() },
                MemberInfo { external_id: 4, display_name: "Yolanda".into() },
                MemberInfo { external_id: 4, display_name: "Yolanda".into() },
            ],
        };
        let result = ledger.register_members(cmd, &OperationContext::new()).await.unwrap();
        assert_eq!(result.registered, 1);
        assert_eq!(result.skipped, 2);
    }

    #[tokio::test]
    async fn test_set_currency() {
        let ledger = ledger().await;
        let ctx = OperationContext::new();

        let user = ledger
            .set_currency(SetCurrencyCommand { external_id: 2, currency: " eur".into() }, &ctx)
            .await
            .unwrap();
        assert_eq!(user.currency.unwrap().as_str(), "EUR");

        let err = ledger
            .set_currency(SetCurrencyCommand { external_id: 2, currency: "XXX".into() }, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidCurrency(_))));

        let err = ledger
            .set_currency(SetCurrencyCommand { external_id: 77, currency: "USD".into() }, &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    // =========================================================================
    // Expenses
    // =========================================================================

    #[tokio::test]
    async fn test_create_expense_even_split() {
        let ledger = ledger().await;
        let detail = ledger
            .create_expense(expense(dec!(30), 1, &[1, 2, 3]), &OperationContext::new())
            .await
            .unwrap();

        assert_eq!(detail.creator_name, "Ursula");
        assert!(detail.participants.iter().all(|p| p.share == dec!(10)));

        let b = balances(&ledger, GROUP).await;
        assert_eq!(b[&("Ursula".into(), "USD".into())], dec!(20));
        assert_eq!(b[&("Victor".into(), "USD".into())], dec!(-10));
        assert_eq!(b[&("Wendy".into(), "USD".into())], dec!(-10));
    }

    #[tokio::test]
    async fn test_create_expense_validation_writes_nothing() {
        let ledger = ledger().await;
        let ctx = OperationContext::new();

        let cases = vec![
            expense(dec!(0), 1, &[1, 2]),
            expense(dec!(10.001), 1, &[1, 2]),
            expense(dec!(10), 1, &[]),
            expense(dec!(10), 1, &[2, 2]),
            CreateExpenseCommand { description: "  ".into(), ..expense(dec!(10), 1, &[2]) },
            CreateExpenseCommand { currency: "DOGE".into(), ..expense(dec!(10), 1, &[2]) },
        ];

        for cmd in cases {
            let err = ledger.create_expense(cmd, &ctx).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
        }
        assert!(ledger.get_balances(GROUP).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_or_foreign_participant_not_found() {
        let ledger = ledger().await;
        let ctx = OperationContext::new();

        let err = ledger.create_expense(expense(dec!(10), 1, &[2, 55]), &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::UserNotFound(ref id)) if id == "55"));

        let err = ledger.create_expense(expense(dec!(10), 1, &[2, 9]), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = ledger.create_expense(expense(dec!(10), 55, &[1]), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(ledger.group_summary(GROUP).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_split_expense_includes_creator_once() {
        let ledger = ledger().await;
        let detail = ledger
            .split_expense(
                SplitExpenseCommand {
                    amount: dec!(10.01),
                    currency: "usd".into(),
                    creator: 1,
                    participants: vec![2, 1, 3],
                },
                &OperationContext::new(),
            )
            .await
            .unwrap();

        assert_eq!(detail.description, "Split expense of 10.01 USD");
        let shares: Vec<Decimal> = detail.participants.iter().map(|p| p.share).collect();
        assert_eq!(shares, vec![dec!(3.35), dec!(3.33), dec!(3.33)]);
        assert_eq!(detail.participants[0].user_name, "Ursula");
    }

    #[tokio::test]
    async fn test_remove_by_non_creator_is_unauthorized() {
        let ledger = ledger().await;
        let ctx = OperationContext::new();
        let detail = ledger.create_expense(expense(dec!(30), 1, &[1, 2, 3]), &ctx).await.unwrap();
        let before = balances(&ledger, GROUP).await;

        let err = ledger
            .remove_expense(RemoveExpenseCommand { expense_id: detail.id, requester: 2 }, &ctx)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(balances(&ledger, GROUP).await, before);
    }

    #[tokio::test]
    async fn test_remove_restores_balances_and_is_not_repeatable() {
        let ledger = ledger().await;
        let ctx = OperationContext::new();
        ledger.create_expense(expense(dec!(12), 2, &[1, 2]), &ctx).await.unwrap();
        let before = balances(&ledger, GROUP).await;

        let detail = ledger.create_expense(expense(dec!(10.01), 1, &[2, 3, 1]), &ctx).await.unwrap();
        let remove = RemoveExpenseCommand { expense_id: detail.id, requester: 1 };
        ledger.remove_expense(remove.clone(), &ctx).await.unwrap();

        let after: HashMap<_, _> = balances(&ledger, GROUP)
            .await
            .into_iter()
            .filter(|(_, v)| !v.is_zero())
            .collect();
        assert_eq!(after, before);

        let err = ledger.remove_expense(remove, &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::ExpenseNotFound(_))));
    }

    // =========================================================================
    // Settlements
    // =========================================================================

    #[tokio::test]
    async fn test_settle_by_mention() {
        let ledger = ledger().await;
        let ctx = OperationContext::new();
        ledger.create_expense(expense(dec!(30), 1, &[1, 2, 3]), &ctx).await.unwrap();

        let result = ledger
            .settle(settle(2, UserRef::Mention("@ursula".into()), dec!(10)), &ctx)
            .await
            .unwrap();
        assert_eq!(result.receiver_name, "Ursula");
        assert_eq!(result.settlement.currency.as_str(), "USD");

        let b = balances(&ledger, GROUP).await;
        assert_eq!(b[&("Victor".into(), "USD".into())], dec!(0));
        assert_eq!(b[&("Ursula".into(), "USD".into())], dec!(10));
    }

    #[tokio::test]
    async fn test_settle_rejections() {
        let ledger = ledger().await;
        let ctx = OperationContext::new();

        let err = ledger
            .settle(settle(1, UserRef::ExternalId(1), dec!(5)), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::SameUserSettlement)));

        let err = ledger
            .settle(settle(1, UserRef::Mention("@nobody".into()), dec!(5)), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // Receiver registered, but in another group
        let err = ledger
            .settle(settle(1, UserRef::ExternalId(9), dec!(5)), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = ledger
            .settle(settle(1, UserRef::ExternalId(2), dec!(-5)), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidAmount(_))));

        assert!(ledger.get_balances(GROUP).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settle_rejects_ambiguous_mention() {
        let ledger = ledger().await;
        let ctx = OperationContext::new();
        for (id, name) in [(20, "Sam"), (21, "sam")] {
            ledger
                .register_user(RegisterUserCommand::new(id, GROUP, name), &ctx)
                .await
                .unwrap();
        }

        let err = ledger
            .settle(settle(1, UserRef::Mention("@sam".into()), dec!(10)), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::AmbiguousUser(ref m)) if m == "@sam"));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(ledger.get_balances(GROUP).await.unwrap().is_empty());

        // An external id still picks exactly one of them
        let result = ledger
            .settle(settle(1, UserRef::ExternalId(21), dec!(10)), &ctx)
            .await
            .unwrap();
        assert_eq!(result.receiver_name, "sam");
    }

    #[tokio::test]
    async fn test_settlements_are_not_deduplicated_without_key() {
        let ledger = ledger().await;
        let ctx = OperationContext::new();
        for _ in 0..2 {
            ledger
                .settle(settle(1, UserRef::ExternalId(2), dec!(5)), &ctx)
                .await
                .unwrap();
        }
        let b = balances(&ledger, GROUP).await;
        assert_eq!(b[&("Ursula".into(), "USD".into())], dec!(10));
    }

    #[tokio::test]
    async fn test_idempotency_key_replay_is_conflict() {
        let ledger = ledger().await;
        let ctx = OperationContext::new().with_idempotency_key(Uuid::new_v4());

        ledger
            .settle(settle(1, UserRef::ExternalId(2), dec!(5)), &ctx)
            .await
            .unwrap();
        let err = ledger
            .settle(settle(1, UserRef::ExternalId(2), dec!(5)), &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Domain(DomainError::DuplicateOperation { .. })));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let b = balances(&ledger, GROUP).await;
        assert_eq!(b[&("Ursula".into(), "USD".into())], dec!(5));
    }

    // =========================================================================
    // Reset
    // =========================================================================

    #[tokio::test]
    async fn test_reset_group_leaves_other_groups() {
        let ledger = ledger().await;
        let ctx = OperationContext::new();
        ledger
            .register_user(RegisterUserCommand::new(10, OTHER_GROUP, "Yusuf"), &ctx)
            .await
            .unwrap();

        ledger.create_expense(expense(dec!(30), 1, &[1, 2, 3]), &ctx).await.unwrap();
        ledger.settle(settle(2, UserRef::ExternalId(1), dec!(3)), &ctx).await.unwrap();
        ledger.create_expense(expense(dec!(8), 9, &[9, 10]), &ctx).await.unwrap();

        ledger.reset_group(GROUP, &ctx).await.unwrap();

        assert!(ledger.get_balances(GROUP).await.unwrap().is_empty());
        assert!(ledger.group_summary(GROUP).await.unwrap().is_empty());
        assert!(ledger.audit_group(GROUP).await.unwrap().is_consistent());

        let other = balances(&ledger, OTHER_GROUP).await;
        assert_eq!(other[&("Xavier".into(), "USD".into())], dec!(4));
        assert_eq!(ledger.group_summary(OTHER_GROUP).await.unwrap().len(), 1);
    }
}
