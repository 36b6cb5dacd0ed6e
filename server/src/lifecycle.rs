//! Token lifecycle engine
//!
//! Pure state transitions over [`Token`]. Every function takes `now`
//! explicitly; nothing here touches storage or the clock.
//!
//! A token is date-expired once `expiration_date <= now`. Otherwise its
//! remaining day count is the ceiling of the time left, so the last valid day
//! always reads "1 days left".

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{Holder, RedeemerBusiness, Redemption, Token, TokenStatus, SYSTEM_REDEEMER};
use crate::policy::{ReissuePolicy, TokenKind};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Whole days until `expiration`, rounded up, or `None` once it has passed.
pub fn remaining_days(expiration: DateTime<Utc>, now: DateTime<Utc>) -> Option<i64> {
    let millis = (expiration - now).num_milliseconds();
    if millis <= 0 {
        None
    } else {
        Some((millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY)
    }
}

pub fn remaining_days_label(remaining: Option<i64>) -> String {
    match remaining {
        Some(days) => format!("{days} days left"),
        None => "Expired".to_string(),
    }
}

/// Format a rupee amount with thousands separators, e.g. `40,000`.
pub fn format_rupees(amount: f64) -> String {
    let rendered = format!("{amount}");
    let (whole, fraction) = match rendered.split_once('.') {
        Some((w, f)) => (w.to_string(), Some(f.to_string())),
        None => (rendered, None),
    };
    let (sign, digits) = match whole.strip_prefix('-') {
        Some(d) => ("-", d),
        None => ("", whole.as_str()),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match fraction {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Record of one automatic reissuance
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reissue {
    pub business_total: f64,
    pub previous_uses: u32,
    pub new_max_uses: u32,
}

/// A redemption request after transport-level validation
#[derive(Debug, Clone, PartialEq)]
pub struct RedemptionInput {
    pub redeemer_name: String,
    pub redeemer_phone: String,
    pub redeemer_residence: Option<String>,
    pub amount: f64,
}

impl Token {
    /// Build a freshly issued token with its derived fields computed.
    pub fn issue(
        serial: i64,
        code: String,
        holder: Holder,
        max_uses: u32,
        now: DateTime<Utc>,
    ) -> Token {
        let kind = holder.kind();
        let mut token = Token {
            id: Uuid::new_v4(),
            serial,
            code,
            holder,
            uses: 0,
            max_uses,
            initial_max_uses: max_uses,
            redemptions: Vec::new(),
            redeemer_business: Vec::new(),
            total_business: 0.0,
            status: TokenStatus::Active,
            remaining_days: String::new(),
            status_color: String::new(),
            issue_date: now,
            expiration_date: kind.expiration_for(now),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        token.refresh(now);
        token
    }

    fn compute_total_business(&self) -> f64 {
        self.holder.owner_business() + self.redeemer_total()
    }

    /// Recompute every derived field, applying the reissuance rule first.
    ///
    /// Returns the reissuance performed, if any. Calling this again with the
    /// same `now` and no intervening mutation changes nothing.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> Option<Reissue> {
        self.recompute(now, true)
    }

    fn recompute(&mut self, now: DateTime<Utc>, allow_reissue: bool) -> Option<Reissue> {
        let remaining = remaining_days(self.expiration_date, now);
        let date_expired = remaining.is_none();
        self.total_business = self.compute_total_business();

        let reissue = match self.kind().reissue_policy() {
            Some(policy) if allow_reissue && !date_expired && self.is_reissue_due(&policy) => {
                Some(self.reissue(&policy, now))
            }
            _ => None,
        };

        let exhausted = self.uses >= self.max_uses;
        self.status = if date_expired || exhausted {
            TokenStatus::Expired
        } else {
            TokenStatus::Active
        };
        self.remaining_days = remaining_days_label(remaining);
        self.status_color = self.status.color().to_string();
        reissue
    }

    fn is_reissue_due(&self, policy: &ReissuePolicy) -> bool {
        self.uses >= self.max_uses && self.total_business < policy.business_threshold
    }

    fn reissue(&mut self, policy: &ReissuePolicy, now: DateTime<Utc>) -> Reissue {
        let previous_uses = self.uses;
        // Counted from `uses` when it already overshot the ceiling, so one
        // reissue always leaves the token usable.
        self.max_uses = self.max_uses.max(self.uses) + policy.extra_uses;
        self.updated_at = now;

        let note = format!(
            "Token reissued - Business (₹{}) under ₹{} - Previous uses: {}, New max uses: {}",
            self.total_business,
            format_rupees(policy.business_threshold),
            previous_uses,
            self.max_uses
        );
        self.redemptions.push(Redemption {
            date: now,
            redeemer_name: SYSTEM_REDEEMER.to_string(),
            redeemer_phone: "-".to_string(),
            redeemer_residence: None,
            bill_amount: None,
            note: Some(note),
        });

        tracing::info!(
            code = %self.code,
            business = self.total_business,
            previous_uses,
            new_max_uses = self.max_uses,
            "token reissued"
        );

        Reissue {
            business_total: self.total_business,
            previous_uses,
            new_max_uses: self.max_uses,
        }
    }

    fn expiry_reason(&self) -> String {
        if self.uses >= self.max_uses {
            format!("Token {} has reached maximum uses", self.code)
        } else {
            format!("Token {} is expired", self.code)
        }
    }

    /// Record one redemption.
    ///
    /// The token is refreshed first (which may reissue it); if it is still
    /// expired the redemption is rejected and no usage is recorded. A token
    /// reissued before the usage is counted is not reissued again after it.
    pub fn redeem(
        &mut self,
        input: RedemptionInput,
        now: DateTime<Utc>,
    ) -> Result<Option<Reissue>, LedgerError> {
        if !input.amount.is_finite() || input.amount < 0.0 {
            return Err(LedgerError::InvalidInput(
                "amount must be a non-negative number".to_string(),
            ));
        }

        let before = self.refresh(now);
        if self.status == TokenStatus::Expired {
            return Err(LedgerError::Expired(self.expiry_reason()));
        }

        self.uses += 1;
        if self.kind() == TokenKind::Consumer {
            self.redeemer_business.push(RedeemerBusiness {
                redeemer_name: input.redeemer_name.clone(),
                amount: input.amount,
            });
        }
        self.redemptions.push(Redemption {
            date: now,
            redeemer_name: input.redeemer_name,
            redeemer_phone: input.redeemer_phone,
            redeemer_residence: input.redeemer_residence,
            bill_amount: Some(input.amount),
            note: None,
        });
        self.updated_at = now;

        // The reissuance gate runs at most once per redemption.
        let after = self.recompute(now, before.is_none());
        Ok(before.or(after))
    }

    /// Push the expiration date forward by `days`.
    pub fn extend(&mut self, days: i64, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if !self.kind().supports_extension() {
            return Err(LedgerError::InvalidInput(format!(
                "{} tokens cannot be extended",
                self.kind().label()
            )));
        }
        if days <= 0 {
            return Err(LedgerError::InvalidInput(
                "Invalid number of days".to_string(),
            ));
        }

        self.expiration_date = Duration::try_days(days)
            .and_then(|delta| self.expiration_date.checked_add_signed(delta))
            .ok_or_else(|| LedgerError::InvalidInput("Invalid number of days".to_string()))?;
        self.updated_at = now;
        self.refresh(now);
        Ok(())
    }

    /// Replace the holder identity, keeping usage and history.
    pub fn edit(&mut self, holder: Holder, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if holder.kind() != self.kind() {
            return Err(LedgerError::InvalidInput(format!(
                "cannot store {} details on a {} token",
                holder.kind().label(),
                self.kind().label()
            )));
        }
        self.holder = holder;
        self.updated_at = now;
        self.refresh(now);
        Ok(())
    }
}
