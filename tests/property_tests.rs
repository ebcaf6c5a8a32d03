use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

use split_ledger::domain::split_evenly;
use split_ledger::handlers::{CreateExpenseCommand, RemoveExpenseCommand, SettleCommand, UserRef};
use split_ledger::store::LedgerStore;
use split_ledger::{Amount, Ledger, OperationContext};

mod common;
use common::{currency_totals, nonzero_balances, setup_ledger, GROUP, OTHER_GROUP};

/// A random amount in cents, 0.01 to 1,000,000.00
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// External ids of the members of each seeded group
fn members_of(group: i64) -> Vec<i64> {
    if group == GROUP {
        vec![1, 2, 3]
    } else {
        vec![4, 5]
    }
}

/// A member of GROUP by external id
fn arb_member() -> impl Strategy<Value = i64> {
    prop::sample::select(members_of(GROUP))
}

fn arb_group() -> impl Strategy<Value = i64> {
    prop::sample::select(vec![GROUP, OTHER_GROUP])
}

fn arb_currency() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["USD", "EUR", "JPY"])
}

/// A non-empty subset of `members`, in a random order
fn arb_subset(members: Vec<i64>) -> impl Strategy<Value = Vec<i64>> {
    let count = members.len();
    Just(members)
        .prop_shuffle()
        .prop_flat_map(move |all| (Just(all), 1usize..=count))
        .prop_map(|(all, n)| all.into_iter().take(n).collect())
}

fn arb_participants() -> impl Strategy<Value = Vec<i64>> {
    arb_subset(members_of(GROUP))
}

#[derive(Debug, Clone)]
enum Op {
    Expense {
        creator: i64,
        participants: Vec<i64>,
        amount: Decimal,
        currency: &'static str,
    },
    Settle {
        payer: i64,
        receiver: i64,
        amount: Decimal,
        currency: &'static str,
    },
    RemoveLatest {
        group: i64,
    },
    Reset {
        group: i64,
    },
}

/// Any operation against either group
fn arb_op() -> impl Strategy<Value = Op> {
    arb_group().prop_flat_map(|group| {
        let members = members_of(group);
        prop_oneof![
            6 => (
                prop::sample::select(members.clone()),
                arb_subset(members.clone()),
                arb_amount(),
                arb_currency(),
            )
                .prop_map(|(creator, participants, amount, currency)| Op::Expense {
                    creator,
                    participants,
                    amount,
                    currency,
                }),
            4 => arb_settle_in(members),
            2 => Just(Op::RemoveLatest { group }),
            1 => Just(Op::Reset { group }),
        ]
    })
}

fn arb_settle() -> impl Strategy<Value = Op> {
    arb_settle_in(members_of(GROUP))
}

fn arb_settle_in(members: Vec<i64>) -> impl Strategy<Value = Op> {
    (
        prop::sample::select(members.clone()),
        prop::sample::select(members),
        arb_amount(),
        arb_currency(),
    )
        .prop_filter_map(
            "payer must differ from receiver",
            |(payer, receiver, amount, currency)| {
                (payer != receiver).then_some(Op::Settle {
                    payer,
                    receiver,
                    amount,
                    currency,
                })
            },
        )
}

fn expense(creator: i64, participants: Vec<i64>, amount: Decimal, currency: &str) -> CreateExpenseCommand {
    CreateExpenseCommand {
        amount,
        currency: currency.to_string(),
        description: "generated".to_string(),
        creator,
        participants,
    }
}

fn settlement(payer: i64, receiver: i64, amount: Decimal, currency: &str) -> SettleCommand {
    SettleCommand {
        payer,
        receiver: UserRef::ExternalId(receiver),
        amount,
        currency: currency.to_string(),
    }
}

async fn apply(ledger: &Ledger, op: Op) {
    let ctx = OperationContext::new();
    match op {
        Op::Expense {
            creator,
            participants,
            amount,
            currency,
        } => {
            ledger
                .create_expense(expense(creator, participants, amount, currency), &ctx)
                .await
                .unwrap();
        }
        Op::Settle {
            payer,
            receiver,
            amount,
            currency,
        } => {
            ledger
                .settle(settlement(payer, receiver, amount, currency), &ctx)
                .await
                .unwrap();
        }
        Op::RemoveLatest { group } => {
            let summary = ledger.group_summary(group).await.unwrap();
            if let Some(latest) = summary.first() {
                let command = RemoveExpenseCommand {
                    expense_id: latest.id,
                    requester: latest_creator(ledger, group, latest.created_by).await,
                };
                ledger.remove_expense(command, &ctx).await.unwrap();
            }
        }
        Op::Reset { group } => {
            ledger.reset_group(group, &ctx).await.unwrap();
        }
    }
}

async fn latest_creator(ledger: &Ledger, group: i64, user_id: uuid::Uuid) -> i64 {
    ledger
        .store()
        .list_group_users(group)
        .await
        .unwrap()
        .into_iter()
        .find(|u| u.id == user_id)
        .map(|u| u.external_id)
        .unwrap()
}

fn fresh_ledger() -> Arc<Ledger> {
    tokio_test::block_on(setup_ledger())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // ===================================================================
    // Shares always add up to the expense amount, differ from each
    // other by at most the remainder, and carry two decimal places.
    // ===================================================================
    #[test]
    fn split_is_exact(
        total in arb_amount(),
        count in 1usize..=50,
        payer in 0usize..60,
    ) {
        let participants: Vec<usize> = (0..count).collect();
        let shares = split_evenly(Amount::new(total).unwrap(), &participants, &payer).unwrap();

        prop_assert_eq!(shares.len(), count);
        let sum: Decimal = shares.iter().map(|s| s.amount).sum();
        prop_assert_eq!(sum, total);

        let remainder_holder = if payer < count { payer } else { 0 };
        let base = shares
            .iter()
            .find(|s| s.participant != remainder_holder)
            .map(|s| s.amount);
        for share in &shares {
            prop_assert_eq!(share.amount.scale(), 2);
            prop_assert!(share.amount >= Decimal::ZERO);
            if let Some(base) = base {
                if share.participant != remainder_holder {
                    prop_assert_eq!(share.amount, base);
                } else {
                    prop_assert!(share.amount >= base);
                    prop_assert!(share.amount - base < Decimal::from(count as i64) / Decimal::from(100));
                }
            }
        }
    }

    // ===================================================================
    // Any sequence of operations, resets included, leaves every currency
    // of every group summing to zero, and the stored balances equal a
    // replay of the history.
    // ===================================================================
    #[test]
    fn balances_always_sum_to_zero(ops in prop::collection::vec(arb_op(), 1..30)) {
        let ledger = fresh_ledger();
        tokio_test::block_on(async {
            for op in ops {
                apply(&ledger, op).await;
            }
        });

        for group in [GROUP, OTHER_GROUP] {
            let totals = tokio_test::block_on(currency_totals(&ledger, group));
            for (currency, total) in totals {
                prop_assert_eq!(
                    total,
                    Decimal::ZERO,
                    "currency {} of group {} does not net to zero",
                    currency,
                    group
                );
            }

            let audit = tokio_test::block_on(ledger.audit_group(group)).unwrap();
            prop_assert!(audit.is_consistent(), "audit of group {} found {:?}", group, audit);
        }
    }

    // ===================================================================
    // Removing an expense restores exactly the balances before it.
    // ===================================================================
    #[test]
    fn remove_undoes_create(
        history in prop::collection::vec(arb_op(), 0..10),
        creator in arb_member(),
        participants in arb_participants(),
        amount in arb_amount(),
        currency in arb_currency(),
    ) {
        let ledger = fresh_ledger();
        let ctx = OperationContext::new();

        let (before, after) = tokio_test::block_on(async {
            for op in history {
                apply(&ledger, op).await;
            }
            let before = nonzero_balances(&ledger, GROUP).await;

            let detail = ledger
                .create_expense(expense(creator, participants, amount, currency), &ctx)
                .await
                .unwrap();
            ledger
                .remove_expense(
                    RemoveExpenseCommand { expense_id: detail.id, requester: creator },
                    &ctx,
                )
                .await
                .unwrap();

            (before, nonzero_balances(&ledger, GROUP).await)
        });

        prop_assert_eq!(before, after);
    }

    // ===================================================================
    // A settlement followed by the same settlement in reverse is a no-op.
    // ===================================================================
    #[test]
    fn settle_back_is_identity(
        history in prop::collection::vec(arb_op(), 0..10),
        op in arb_settle(),
    ) {
        let Op::Settle { payer, receiver, amount, currency } = op else {
            unreachable!()
        };
        let ledger = fresh_ledger();
        let ctx = OperationContext::new();

        let (before, after) = tokio_test::block_on(async {
            for op in history {
                apply(&ledger, op).await;
            }
            let before = nonzero_balances(&ledger, GROUP).await;

            ledger
                .settle(settlement(payer, receiver, amount, currency), &ctx)
                .await
                .unwrap();
            ledger
                .settle(settlement(receiver, payer, amount, currency), &ctx)
                .await
                .unwrap();

            (before, nonzero_balances(&ledger, GROUP).await)
        });

        prop_assert_eq!(before, after);
    }
}
