//! Currency codes and the supported-currency allow-list

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Currencies accepted when no explicit allow-list is configured
pub const DEFAULT_CURRENCIES: [&str; 38] = [
    "USD", "EUR", "GBP", "JPY", "AUD", "CAD", "CHF", "CNY", "HKD", "NZD", "SEK", "KRW", "SGD",
    "NOK", "MXN", "INR", "RUB", "ZAR", "TRY", "BRL", "TWD", "DKK", "PLN", "THB", "IDR", "HUF",
    "CZK", "ILS", "CLP", "PHP", "AED", "COP", "SAR", "MYR", "RON", "ARS", "BGN", "VND",
];

/// A three-letter, upper-case currency code.
///
/// Constructing a `CurrencyCode` only checks its shape; membership in the
/// allow-list is checked by [`CurrencySet::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid currency code: {0:?}")]
pub struct CurrencyError(pub String);

impl CurrencyCode {
    /// Normalise (trim, upper-case) and shape-check a code.
    pub fn parse(raw: &str) -> Result<Self, CurrencyError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CurrencyError(raw.to_string()));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CurrencyCode::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// Closed set of currencies shared by SetCurrency, CreateExpense and Settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencySet {
    codes: BTreeSet<CurrencyCode>,
}

impl CurrencySet {
    /// Build an allow-list from raw codes. Fails on the first malformed code.
    pub fn new<I, S>(codes: I) -> Result<Self, CurrencyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let codes = codes
            .into_iter()
            .map(|c| CurrencyCode::parse(c.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { codes })
    }

    /// Parse a comma-separated list such as `"USD, eur,GBP"`.
    pub fn from_csv(csv: &str) -> Result<Self, CurrencyError> {
        Self::new(csv.split(',').map(str::trim).filter(|s| !s.is_empty()))
    }

    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.codes.contains(code)
    }

    /// Normalise user input and check it against the allow-list.
    pub fn resolve(&self, raw: &str) -> Result<CurrencyCode, CurrencyError> {
        let code = CurrencyCode::parse(raw)?;
        if !self.contains(&code) {
            return Err(CurrencyError(raw.to_string()));
        }
        Ok(code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CurrencyCode> {
        self.codes.iter()
    }
}

impl Default for CurrencySet {
    fn default() -> Self {
        Self {
            codes: DEFAULT_CURRENCIES
                .iter()
                .map(|c| CurrencyCode(c.to_string()))
                .collect(),
        }
    }
}
