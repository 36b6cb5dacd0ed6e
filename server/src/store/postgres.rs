//! PostgreSQL token store
//!
//! Holder identity and the redemption logs live in JSONB columns; everything
//! the ledger filters or sorts on is a plain column. See
//! `migrations/20250101000000_create_tokens.sql` for the schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::{ListFilter, TokenStore};
use crate::error::LedgerError;
use crate::models::{Holder, RedeemerBusiness, Redemption, Token, TokenStatus};
use crate::policy::TokenKind;

const TOKEN_COLUMNS: &str = "id, kind, serial, code, holder, uses, max_uses, initial_max_uses, \
     redemptions, redeemer_business, total_business, status, remaining_days, status_color, \
     issue_date, expiration_date, version, created_at, updated_at";

/// Token store backed by a Postgres pool
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    kind: String,
    serial: i64,
    code: String,
    holder: Json<Holder>,
    uses: i32,
    max_uses: i32,
    initial_max_uses: i32,
    redemptions: Json<Vec<Redemption>>,
    redeemer_business: Json<Vec<RedeemerBusiness>>,
    total_business: f64,
    status: String,
    remaining_days: String,
    status_color: String,
    issue_date: DateTime<Utc>,
    expiration_date: DateTime<Utc>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn corrupt(column: &str, detail: impl std::fmt::Display) -> LedgerError {
    LedgerError::Database(sqlx::Error::Decode(
        format!("invalid {column}: {detail}").into(),
    ))
}

fn to_count(value: i32, column: &str) -> Result<u32, LedgerError> {
    u32::try_from(value).map_err(|e| corrupt(column, e))
}

fn to_column(value: u32, column: &str) -> Result<i32, LedgerError> {
    i32::try_from(value).map_err(|_| LedgerError::InvalidInput(format!("{column} is too large")))
}

impl TryFrom<TokenRow> for Token {
    type Error = LedgerError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        let kind: TokenKind = row.kind.parse().map_err(|e| corrupt("kind", e))?;
        let holder = row.holder.0;
        if holder.kind() != kind {
            return Err(corrupt("holder", format!("expected {kind} holder")));
        }
        let status = TokenStatus::parse(&row.status).ok_or_else(|| corrupt("status", &row.status))?;

        Ok(Token {
            id: row.id,
            serial: row.serial,
            code: row.code,
            holder,
            uses: to_count(row.uses, "uses")?,
            max_uses: to_count(row.max_uses, "max_uses")?,
            initial_max_uses: to_count(row.initial_max_uses, "initial_max_uses")?,
            redemptions: row.redemptions.0,
            redeemer_business: row.redeemer_business.0,
            total_business: row.total_business,
            status,
            remaining_days: row.remaining_days,
            status_color: row.status_color,
            issue_date: row.issue_date,
            expiration_date: row.expiration_date,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl TokenStore for PgStore {
    async fn find_by_code(&self, kind: TokenKind, code: &str) -> Result<Option<Token>, LedgerError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE kind = $1 AND code = $2"
        ))
        .bind(kind.as_str())
        .bind(code)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(Token::try_from).transpose()
    }

    async fn find_by_serial(&self, kind: TokenKind, serial: i64) -> Result<Option<Token>, LedgerError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE kind = $1 AND serial = $2"
        ))
        .bind(kind.as_str())
        .bind(serial)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(Token::try_from).transpose()
    }

    async fn max_serial(&self, kind: TokenKind) -> Result<i64, LedgerError> {
        let last: Option<i64> =
            sqlx::query_scalar("SELECT last_serial FROM token_serials WHERE kind = $1")
                .bind(kind.as_str())
                .fetch_optional(&*self.pool)
                .await?;

        Ok(last.unwrap_or(0))
    }

    async fn insert(&self, token: &Token) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO tokens (
                id, kind, serial, code, holder, contact_phone, uses, max_uses,
                initial_max_uses, redemptions, redeemer_business, total_business,
                status, remaining_days, status_color, issue_date, expiration_date,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(token.id)
        .bind(token.kind().as_str())
        .bind(token.serial)
        .bind(&token.code)
        .bind(Json(&token.holder))
        .bind(token.holder.contact_phone())
        .bind(to_column(token.uses, "uses")?)
        .bind(to_column(token.max_uses, "maxUses")?)
        .bind(to_column(token.initial_max_uses, "maxUses")?)
        .bind(Json(&token.redemptions))
        .bind(Json(&token.redeemer_business))
        .bind(token.total_business)
        .bind(token.status.as_str())
        .bind(&token.remaining_days)
        .bind(&token.status_color)
        .bind(token.issue_date)
        .bind(token.expiration_date)
        .bind(token.version)
        .bind(token.created_at)
        .bind(token.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(LedgerError::Conflict(format!(
                    "serial {} or code {} already taken",
                    token.serial, token.code
                )));
            }
            Err(e) => return Err(e.into()),
        }

        sqlx::query(
            r#"
            INSERT INTO token_serials (kind, last_serial)
            VALUES ($1, $2)
            ON CONFLICT (kind)
            DO UPDATE SET last_serial = GREATEST(token_serials.last_serial, EXCLUDED.last_serial)
            "#,
        )
        .bind(token.kind().as_str())
        .bind(token.serial)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn save(&self, token: &Token) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE tokens
            SET holder = $1, contact_phone = $2, uses = $3, max_uses = $4,
                redemptions = $5, redeemer_business = $6, total_business = $7,
                status = $8, remaining_days = $9, status_color = $10,
                expiration_date = $11, updated_at = $12, version = version + 1
            WHERE id = $13 AND version = $14
            "#,
        )
        .bind(Json(&token.holder))
        .bind(token.holder.contact_phone())
        .bind(to_column(token.uses, "uses")?)
        .bind(to_column(token.max_uses, "maxUses")?)
        .bind(Json(&token.redemptions))
        .bind(Json(&token.redeemer_business))
        .bind(token.total_business)
        .bind(token.status.as_str())
        .bind(&token.remaining_days)
        .bind(&token.status_color)
        .bind(token.expiration_date)
        .bind(token.updated_at)
        .bind(token.id)
        .bind(token.version)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tokens WHERE id = $1)")
            .bind(token.id)
            .fetch_one(&*self.pool)
            .await?;

        if exists {
            Err(LedgerError::Conflict(format!(
                "token {} was modified concurrently",
                token.code
            )))
        } else {
            Err(LedgerError::NotFound(format!("Token {}", token.code)))
        }
    }

    async fn delete_by_serial(&self, kind: TokenKind, serial: i64) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM tokens WHERE kind = $1 AND serial = $2")
            .bind(kind.as_str())
            .bind(serial)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_code(&self, kind: TokenKind, code: &str) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM tokens WHERE kind = $1 AND code = $2")
            .bind(kind.as_str())
            .bind(code)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, kind: TokenKind, filter: &ListFilter) -> Result<Vec<Token>, LedgerError> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            r#"
            SELECT {TOKEN_COLUMNS} FROM tokens
            WHERE kind = $1 AND ($2::TEXT IS NULL OR contact_phone = $2)
            ORDER BY serial ASC
            "#
        ))
        .bind(kind.as_str())
        .bind(filter.phone.as_deref())
        .fetch_all(&*self.pool)
        .await?;

        rows.into_iter().map(Token::try_from).collect()
    }
}
