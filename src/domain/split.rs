//! Split Calculator
//!
//! Pure division of an expense total into per-participant shares. Shares are
//! whole cents and always sum to exactly the total: the leftover cents from
//! truncation go to one designated participant instead of being spread out.

use rust_decimal::{Decimal, RoundingStrategy};

use super::amount::{Amount, MINOR_UNITS};
use super::error::DomainError;

/// One participant's portion of an expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share<P> {
    pub participant: P,
    pub amount: Decimal,
}

/// Split `total` evenly over `participants` (in input order).
///
/// The remainder of the truncated division is assigned to `payer` when it is
/// one of the participants, otherwise to the first participant.
///
/// # Errors
/// `DomainError::NoParticipants` if the list is empty.
pub fn split_evenly<P>(
    total: Amount,
    participants: &[P],
    payer: &P,
) -> Result<Vec<Share<P>>, DomainError>
where
    P: Clone + PartialEq,
{
    if participants.is_empty() {
        return Err(DomainError::NoParticipants);
    }

    let count = Decimal::from(participants.len());
    let base = (total.value() / count)
        .round_dp_with_strategy(MINOR_UNITS, RoundingStrategy::ToZero);
    let remainder = total.value() - base * count;

    let remainder_index = participants
        .iter()
        .position(|p| p == payer)
        .unwrap_or(0);

    let shares = participants
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut amount = if i == remainder_index {
                base + remainder
            } else {
                base
            };
            amount.rescale(MINOR_UNITS);
            Share {
                participant: p.clone(),
                amount,
            }
        })
        .collect();

    Ok(shares)
}
