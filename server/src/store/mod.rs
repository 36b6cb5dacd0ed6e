//! Token persistence
//!
//! [`TokenStore`] is the only way the ledger reaches stored tokens. Writes are
//! guarded by the token's `version` so two requests racing on one code cannot
//! silently overwrite each other.

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::models::Token;
use crate::policy::TokenKind;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Optional narrowing for [`TokenStore::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Exact match on the holder's contact phone.
    pub phone: Option<String>,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Exact match on the (already normalised) code.
    async fn find_by_code(&self, kind: TokenKind, code: &str) -> Result<Option<Token>, LedgerError>;

    async fn find_by_serial(&self, kind: TokenKind, serial: i64) -> Result<Option<Token>, LedgerError>;

    /// Highest serial ever allocated for `kind`, or 0 if none.
    ///
    /// Deleting the newest token does not lower this value.
    async fn max_serial(&self, kind: TokenKind) -> Result<i64, LedgerError>;

    /// Store a new token.
    ///
    /// Fails with [`LedgerError::Conflict`] if its serial or code is taken.
    async fn insert(&self, token: &Token) -> Result<(), LedgerError>;

    /// Overwrite an existing token.
    ///
    /// `token.version` must equal the stored version; the stored copy gets
    /// `version + 1`. Every other field, `updated_at` included, is stored as
    /// given. A mismatch is [`LedgerError::Conflict`], a missing token is
    /// [`LedgerError::NotFound`].
    async fn save(&self, token: &Token) -> Result<(), LedgerError>;

    async fn delete_by_serial(&self, kind: TokenKind, serial: i64) -> Result<bool, LedgerError>;

    async fn delete_by_code(&self, kind: TokenKind, code: &str) -> Result<bool, LedgerError>;

    /// All tokens of `kind` matching `filter`, ordered by serial.
    async fn list(&self, kind: TokenKind, filter: &ListFilter) -> Result<Vec<Token>, LedgerError>;
}
