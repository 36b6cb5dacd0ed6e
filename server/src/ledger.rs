//! Ledger service for the Kalon token system
//!
//! Each operation runs as read-current-state, compute, write-new-state
//! against the [`TokenStore`]. Writes are version-checked; a lost race comes
//! back as [`LedgerError::Conflict`] and is never retried here.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use crate::codes::{generate_code, normalize_code};
use crate::error::LedgerError;
use crate::lifecycle::{RedemptionInput, Reissue};
use crate::models::{Holder, PaginationParams, Token};
use crate::policy::TokenKind;
use crate::report::{build_report, partner_rankings, Rankings, Report, ReportFilter};
use crate::store::{ListFilter, TokenStore};

/// Attempts at finding a free serial and code before giving up.
pub const MAX_CREATE_ATTEMPTS: usize = 5;

/// Wall-clock time at the precision Postgres `TIMESTAMPTZ` keeps, so a
/// token handed back to the caller matches what a later read decodes.
fn current_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Input for issuing a token
#[derive(Debug, Clone)]
pub struct NewToken {
    pub holder: Holder,
    /// Ignored for variants with a fixed default.
    pub max_uses: Option<u32>,
}

/// Outcome of a successful redemption
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redeemed {
    pub token: Token,
    pub remaining_uses: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reissue: Option<Reissue>,
}

/// Counters from one background refresh pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub scanned: usize,
    pub updated: usize,
    pub conflicts: usize,
}

/// Ledger service
pub struct LedgerService {
    store: Arc<dyn TokenStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Issue a new token with the next free serial and a fresh code.
    pub async fn create(&self, kind: TokenKind, req: NewToken) -> Result<Token, LedgerError> {
        if req.holder.kind() != kind {
            return Err(LedgerError::InvalidInput(format!(
                "expected {} token details",
                kind.label()
            )));
        }
        req.holder.validate()?;
        let max_uses = kind.initial_max_uses(req.max_uses)?;

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let serial = self.store.max_serial(kind).await? + 1;
            let code = generate_code(kind, &mut rand::thread_rng());
            if self.store.find_by_code(kind, &code).await?.is_some() {
                tracing::debug!(%code, attempt, "code collision, regenerating");
                continue;
            }

            let token = Token::issue(serial, code, req.holder.clone(), max_uses, current_time());
            match self.store.insert(&token).await {
                Ok(()) => {
                    tracing::info!(
                        kind = %kind,
                        serial = token.serial,
                        code = %token.code,
                        max_uses = token.max_uses,
                        "token created"
                    );
                    return Ok(token);
                }
                Err(LedgerError::Conflict(reason)) => {
                    tracing::debug!(%reason, attempt, "allocation collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(kind = %kind, "gave up allocating a serial and code");
        Err(LedgerError::Conflict(format!(
            "could not allocate a unique {} token after {MAX_CREATE_ATTEMPTS} attempts",
            kind.label()
        )))
    }

    /// Refresh derived fields and persist them if anything changed.
    ///
    /// Used on read paths: a concurrent writer winning the race is not an
    /// error here, the caller still gets an up-to-date view. A token deleted
    /// in the meantime is reported as not found.
    async fn refreshed(&self, mut token: Token, now: DateTime<Utc>) -> Result<Token, LedgerError> {
        let before = token.clone();
        token.refresh(now);
        if token == before {
            return Ok(token);
        }
        token.updated_at = now;

        match self.store.save(&token).await {
            Ok(()) => {
                token.version += 1;
                Ok(token)
            }
            Err(LedgerError::Conflict(_)) => {
                tracing::debug!(code = %token.code, "skipped persisting refreshed token");
                Ok(token)
            }
            Err(e) => Err(e),
        }
    }

    async fn load_by_serial(&self, kind: TokenKind, serial: i64) -> Result<Token, LedgerError> {
        self.store
            .find_by_serial(kind, serial)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("{} token #{serial}", kind.label())))
    }

    async fn load_by_code(&self, kind: TokenKind, code: &str) -> Result<Token, LedgerError> {
        let code = normalize_code(code);
        self.store
            .find_by_code(kind, &code)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("{} token {code}", kind.label())))
    }

    async fn persist(&self, token: &mut Token) -> Result<(), LedgerError> {
        self.store.save(token).await?;
        token.version += 1;
        Ok(())
    }

    pub async fn get_by_serial(&self, kind: TokenKind, serial: i64) -> Result<Token, LedgerError> {
        let token = self.load_by_serial(kind, serial).await?;
        self.refreshed(token, current_time()).await
    }

    pub async fn get_by_code(&self, kind: TokenKind, code: &str) -> Result<Token, LedgerError> {
        let token = self.load_by_code(kind, code).await?;
        self.refreshed(token, current_time()).await
    }

    /// All tokens of `kind`, refreshed, ordered by serial.
    pub async fn list(&self, kind: TokenKind, filter: &ListFilter) -> Result<Vec<Token>, LedgerError> {
        let now = current_time();
        let stored = self.store.list(kind, filter).await?;
        let mut tokens = Vec::with_capacity(stored.len());
        for token in stored {
            tokens.push(self.refreshed(token, now).await?);
        }
        Ok(tokens)
    }

    pub async fn redeem(
        &self,
        kind: TokenKind,
        code: &str,
        input: RedemptionInput,
    ) -> Result<Redeemed, LedgerError> {
        let mut token = self.load_by_code(kind, code).await?;
        let reissue = match token.redeem(input, current_time()) {
            Ok(reissue) => reissue,
            Err(e) => {
                tracing::info!(code = %token.code, error = %e, "redemption rejected");
                return Err(e);
            }
        };
        self.persist(&mut token).await?;

        tracing::info!(
            code = %token.code,
            uses = token.uses,
            max_uses = token.max_uses,
            total_business = token.total_business,
            "token redeemed"
        );
        Ok(Redeemed {
            remaining_uses: token.remaining_uses(),
            token,
            reissue,
        })
    }

    pub async fn edit(&self, kind: TokenKind, serial: i64, holder: Holder) -> Result<Token, LedgerError> {
        holder.validate()?;
        let mut token = self.load_by_serial(kind, serial).await?;
        token.edit(holder, current_time())?;
        self.persist(&mut token).await?;
        tracing::info!(code = %token.code, serial, "token updated");
        Ok(token)
    }

    pub async fn extend(&self, kind: TokenKind, code: &str, days: i64) -> Result<Token, LedgerError> {
        if !kind.supports_extension() {
            return Err(LedgerError::InvalidInput(format!(
                "{} tokens cannot be extended",
                kind.label()
            )));
        }
        let mut token = self.load_by_code(kind, code).await?;
        token.extend(days, current_time())?;
        self.persist(&mut token).await?;
        tracing::info!(
            code = %token.code,
            days,
            expiration_date = %token.expiration_date,
            "token extended"
        );
        Ok(token)
    }

    pub async fn delete_by_serial(&self, kind: TokenKind, serial: i64) -> Result<(), LedgerError> {
        if !self.store.delete_by_serial(kind, serial).await? {
            return Err(LedgerError::NotFound(format!("{} token #{serial}", kind.label())));
        }
        tracing::info!(kind = %kind, serial, "token deleted");
        Ok(())
    }

    pub async fn delete_by_code(&self, kind: TokenKind, code: &str) -> Result<(), LedgerError> {
        let code = normalize_code(code);
        if !self.store.delete_by_code(kind, &code).await? {
            return Err(LedgerError::NotFound(format!("{} token {code}", kind.label())));
        }
        tracing::info!(kind = %kind, %code, "token deleted");
        Ok(())
    }

    pub async fn report(
        &self,
        kind: TokenKind,
        filter: ReportFilter,
        pagination: PaginationParams,
    ) -> Result<Report, LedgerError> {
        let tokens = self.list(kind, &ListFilter::default()).await?;
        Ok(build_report(kind, filter, &tokens, pagination, current_time()))
    }

    pub async fn rankings(&self, kind: TokenKind) -> Result<Rankings, LedgerError> {
        let tokens = self.list(kind, &ListFilter::default()).await?;
        Ok(partner_rankings(&tokens))
    }

    /// Refresh and persist every stored token whose derived fields drifted.
    pub async fn sweep(&self) -> Result<SweepOutcome, LedgerError> {
        let now = current_time();
        let mut outcome = SweepOutcome::default();

        for kind in TokenKind::ALL {
            for mut token in self.store.list(kind, &ListFilter::default()).await? {
                outcome.scanned += 1;
                let before = token.clone();
                token.refresh(now);
                if token == before {
                    continue;
                }
                token.updated_at = now;
                match self.store.save(&token).await {
                    Ok(()) => outcome.updated += 1,
                    Err(LedgerError::Conflict(_)) | Err(LedgerError::NotFound(_)) => {
                        outcome.conflicts += 1;
                        tracing::debug!(code = %token.code, "sweep skipped token changed underneath it");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(outcome)
    }
}
