//! Per-variant token policy
//!
//! The three token kinds share one lifecycle. Everything that differs between
//! them (code prefix, code alphabet, usage ceiling, validity period and the
//! reissuance rule) is answered here so the engine never branches on field
//! names.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const UPPERCASE_ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Token variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// Consumer referral token ("B2C")
    #[serde(rename = "b2c")]
    Consumer,
    /// Business-partner token ("B2B")
    #[serde(rename = "b2b")]
    Business,
    /// Agent batch token ("B2BA")
    #[serde(rename = "b2ba")]
    Agent,
}

/// Automatic usage-ceiling extension for low-business tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReissuePolicy {
    /// Tokens whose total business is strictly below this are reissued.
    pub business_threshold: f64,
    /// Added to `max_uses` on every reissuance.
    pub extra_uses: u32,
}

/// How long a freshly issued token stays valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Same calendar date one year later.
    CalendarYear,
    /// A fixed number of days.
    Days(i64),
}

impl TokenKind {
    pub const ALL: [TokenKind; 3] = [TokenKind::Consumer, TokenKind::Business, TokenKind::Agent];

    /// Path segment and storage tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Consumer => "b2c",
            TokenKind::Business => "b2b",
            TokenKind::Agent => "b2ba",
        }
    }

    /// Human label used in report titles.
    pub fn label(&self) -> &'static str {
        match self {
            TokenKind::Consumer => "B2C",
            TokenKind::Business => "B2B",
            TokenKind::Agent => "B2BA",
        }
    }

    pub fn code_prefix(&self) -> &'static str {
        match self {
            TokenKind::Consumer => "K1",
            TokenKind::Business => "B1",
            TokenKind::Agent => "A1",
        }
    }

    pub fn code_alphabet(&self) -> &'static [u8] {
        match self {
            TokenKind::Consumer => UPPERCASE_ALNUM,
            TokenKind::Business | TokenKind::Agent => UPPERCASE,
        }
    }

    /// Usage ceiling assigned when the caller does not choose one.
    ///
    /// Only consumer tokens have a fixed default; partners and agents must
    /// state how many uses they are buying.
    pub fn default_max_uses(&self) -> Option<u32> {
        match self {
            TokenKind::Consumer => Some(5),
            TokenKind::Business | TokenKind::Agent => None,
        }
    }

    /// Largest usage ceiling a caller may request at creation.
    pub fn max_uses_limit(&self) -> Option<u32> {
        match self {
            TokenKind::Agent => Some(500),
            TokenKind::Consumer | TokenKind::Business => None,
        }
    }

    /// Resolve the creation-time usage ceiling for this kind.
    pub fn initial_max_uses(&self, requested: Option<u32>) -> Result<u32, LedgerError> {
        match (self.default_max_uses(), requested) {
            (Some(default), _) => Ok(default),
            (None, None) => Err(LedgerError::InvalidInput(format!(
                "maxUses is required for {} tokens",
                self.label()
            ))),
            (None, Some(0)) => Err(LedgerError::InvalidInput(
                "maxUses must be at least 1".to_string(),
            )),
            (None, Some(n)) => match self.max_uses_limit() {
                Some(limit) if n > limit => Err(LedgerError::InvalidInput(format!(
                    "Number of uses must be between 1 and {limit}"
                ))),
                _ => Ok(n),
            },
        }
    }

    pub fn validity(&self) -> Validity {
        match self {
            TokenKind::Consumer | TokenKind::Business => Validity::CalendarYear,
            TokenKind::Agent => Validity::Days(365),
        }
    }

    /// Expiration instant for a token issued at `issued`.
    pub fn expiration_for(&self, issued: DateTime<Utc>) -> DateTime<Utc> {
        match self.validity() {
            Validity::CalendarYear => issued
                .checked_add_months(Months::new(12))
                .unwrap_or_else(|| issued + Duration::days(365)),
            Validity::Days(days) => issued + Duration::days(days),
        }
    }

    pub fn reissue_policy(&self) -> Option<ReissuePolicy> {
        match self {
            TokenKind::Consumer => Some(ReissuePolicy {
                business_threshold: 40_000.0,
                extra_uses: 5,
            }),
            TokenKind::Business | TokenKind::Agent => None,
        }
    }

    /// Whether operators may push the expiration date forward.
    pub fn supports_extension(&self) -> bool {
        !matches!(self, TokenKind::Consumer)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "b2c" => Ok(TokenKind::Consumer),
            "b2b" => Ok(TokenKind::Business),
            "b2ba" => Ok(TokenKind::Agent),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown token variant '{other}'"
            ))),
        }
    }
}
