//! Common test utilities

#![allow(dead_code)]

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use split_ledger::handlers::RegisterUserCommand;
use split_ledger::store::MemoryLedgerStore;
use split_ledger::{CurrencySet, Ledger, OperationContext};

pub const GROUP: i64 = -100;
pub const OTHER_GROUP: i64 = -200;

/// Members of GROUP: (external id, display name)
pub const MEMBERS: [(i64, &str); 3] = [(1, "U"), (2, "V"), (3, "W")];

/// Memory-backed ledger with U, V, W registered in GROUP and
/// X (4), Y (5) registered in OTHER_GROUP.
pub async fn setup_ledger() -> Arc<Ledger> {
    let ledger = Arc::new(Ledger::new(
        Arc::new(MemoryLedgerStore::new()),
        CurrencySet::default(),
    ));
    let ctx = OperationContext::new();

    let users = MEMBERS
        .iter()
        .map(|(id, name)| (*id, GROUP, *name))
        .chain([(4, OTHER_GROUP, "X"), (5, OTHER_GROUP, "Y")]);

    for (id, group, name) in users {
        ledger
            .register_user(RegisterUserCommand::new(id, group, name), &ctx)
            .await
            .expect("Failed to seed user");
    }

    ledger
}

/// Current balances of a group keyed by (display name, currency)
pub async fn balance_map(ledger: &Ledger, group_id: i64) -> HashMap<(String, String), Decimal> {
    ledger
        .get_balances(group_id)
        .await
        .expect("Failed to load balances")
        .into_iter()
        .map(|b| ((b.user_name, b.currency.to_string()), b.amount))
        .collect()
}

/// Same as `balance_map` but without zero entries, so a missing row and a
/// zeroed row compare equal.
pub async fn nonzero_balances(ledger: &Ledger, group_id: i64) -> HashMap<(String, String), Decimal> {
    balance_map(ledger, group_id)
        .await
        .into_iter()
        .filter(|(_, v)| !v.is_zero())
        .collect()
}

/// Sum of every balance per currency
pub async fn currency_totals(ledger: &Ledger, group_id: i64) -> HashMap<String, Decimal> {
    let mut totals = HashMap::new();
    for ((_, currency), amount) in balance_map(ledger, group_id).await {
        *totals.entry(currency).or_insert(Decimal::ZERO) += amount;
    }
    totals
}
