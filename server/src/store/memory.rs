//! In-process token store
//!
//! Used by the test suite and when no `DATABASE_URL` is configured. The lock
//! is `parking_lot` and is never held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{ListFilter, TokenStore};
use crate::error::LedgerError;
use crate::models::Token;
use crate::policy::TokenKind;

#[derive(Debug, Default)]
struct Inner {
    tokens: HashMap<Uuid, Token>,
    high_water: HashMap<TokenKind, i64>,
}

/// Thread-safe, cloneable in-memory token store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn find<'a>(inner: &'a Inner, kind: TokenKind, pred: impl Fn(&Token) -> bool) -> Option<&'a Token> {
    inner
        .tokens
        .values()
        .find(|t| t.kind() == kind && pred(t))
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn find_by_code(&self, kind: TokenKind, code: &str) -> Result<Option<Token>, LedgerError> {
        let inner = self.inner.read();
        Ok(find(&inner, kind, |t| t.code == code).cloned())
    }

    async fn find_by_serial(&self, kind: TokenKind, serial: i64) -> Result<Option<Token>, LedgerError> {
        let inner = self.inner.read();
        Ok(find(&inner, kind, |t| t.serial == serial).cloned())
    }

    async fn max_serial(&self, kind: TokenKind) -> Result<i64, LedgerError> {
        Ok(self.inner.read().high_water.get(&kind).copied().unwrap_or(0))
    }

    async fn insert(&self, token: &Token) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        let kind = token.kind();
        if find(&inner, kind, |t| t.serial == token.serial).is_some() {
            return Err(LedgerError::Conflict(format!(
                "serial {} already allocated",
                token.serial
            )));
        }
        if inner.tokens.values().any(|t| t.code == token.code) {
            return Err(LedgerError::Conflict(format!(
                "code {} already issued",
                token.code
            )));
        }

        let high_water = inner.high_water.entry(kind).or_insert(0);
        *high_water = (*high_water).max(token.serial);
        inner.tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn save(&self, token: &Token) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        let stored = inner
            .tokens
            .get_mut(&token.id)
            .ok_or_else(|| LedgerError::NotFound(format!("Token {}", token.code)))?;

        if stored.version != token.version {
            return Err(LedgerError::Conflict(format!(
                "token {} was modified concurrently",
                token.code
            )));
        }

        let mut next = token.clone();
        next.version += 1;
        *stored = next;
        Ok(())
    }

    async fn delete_by_serial(&self, kind: TokenKind, serial: i64) -> Result<bool, LedgerError> {
        let mut inner = self.inner.write();
        let id = find(&inner, kind, |t| t.serial == serial).map(|t| t.id);
        Ok(id.and_then(|id| inner.tokens.remove(&id)).is_some())
    }

    async fn delete_by_code(&self, kind: TokenKind, code: &str) -> Result<bool, LedgerError> {
        let mut inner = self.inner.write();
        let id = find(&inner, kind, |t| t.code == code).map(|t| t.id);
        Ok(id.and_then(|id| inner.tokens.remove(&id)).is_some())
    }

    async fn list(&self, kind: TokenKind, filter: &ListFilter) -> Result<Vec<Token>, LedgerError> {
        let inner = self.inner.read();
        let mut tokens: Vec<Token> = inner
            .tokens
            .values()
            .filter(|t| t.kind() == kind)
            .filter(|t| {
                filter
                    .phone
                    .as_deref()
                    .map_or(true, |phone| t.holder.contact_phone() == phone)
            })
            .cloned()
            .collect();
        tokens.sort_by_key(|t| t.serial);
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConsumerHolder, Holder};
    use chrono::{Duration, Utc};

    fn token(serial: i64, code: &str, phone: &str) -> Token {
        Token::issue(
            serial,
            code.to_string(),
            Holder::Consumer(ConsumerHolder {
                owner_name: "Asha".to_string(),
                owner_phone: phone.to_string(),
                residence: "Pune".to_string(),
                owner_business: 0.0,
            }),
            5,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = MemoryStore::new();
        let t = token(1, "K1AAAAA", "98");
        store.insert(&t).await.unwrap();

        let by_code = store
            .find_by_code(TokenKind::Consumer, "K1AAAAA")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_code.id, t.id);

        let by_serial = store
            .find_by_serial(TokenKind::Consumer, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_serial.code, "K1AAAAA");

        assert!(store
            .find_by_serial(TokenKind::Business, 1)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_serial_or_code_conflicts() {
        let store = MemoryStore::new();
        store.insert(&token(1, "K1AAAAA", "98")).await.unwrap();

        let err = store.insert(&token(1, "K1BBBBB", "98")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        let err = store.insert(&token(2, "K1AAAAA", "98")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_max_serial_survives_deletion() {
        let store = MemoryStore::new();
        assert_eq!(store.max_serial(TokenKind::Consumer).await.unwrap(), 0);
        store.insert(&token(1, "K1AAAAA", "98")).await.unwrap();
        store.insert(&token(2, "K1BBBBB", "98")).await.unwrap();

        assert!(store.delete_by_serial(TokenKind::Consumer, 2).await.unwrap());
        assert_eq!(store.max_serial(TokenKind::Consumer).await.unwrap(), 2);
        assert!(!store.delete_by_serial(TokenKind::Consumer, 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_is_compare_and_swap() {
        let store = MemoryStore::new();
        let t = token(1, "K1AAAAA", "98");
        store.insert(&t).await.unwrap();

        let mut first = t.clone();
        first.uses = 1;
        store.save(&first).await.unwrap();

        let mut stale = t.clone();
        stale.uses = 1;
        let err = store.save(&stale).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));

        let stored = store
            .find_by_code(TokenKind::Consumer, "K1AAAAA")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.uses, 1);
    }

    #[tokio::test]
    async fn test_save_keeps_caller_timestamps() {
        let store = MemoryStore::new();
        let t = token(1, "K1AAAAA", "98");
        store.insert(&t).await.unwrap();

        let mut edited = t.clone();
        edited.updated_at = t.updated_at + Duration::minutes(5);
        store.save(&edited).await.unwrap();

        let stored = store
            .find_by_serial(TokenKind::Consumer, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.updated_at, edited.updated_at);
    }

    #[tokio::test]
    async fn test_list_orders_and_filters() {
        let store = MemoryStore::new();
        store.insert(&token(3, "K1CCCCC", "77")).await.unwrap();
        store.insert(&token(1, "K1AAAAA", "98")).await.unwrap();
        store.insert(&token(2, "K1BBBBB", "98")).await.unwrap();

        let all = store
            .list(TokenKind::Consumer, &ListFilter::default())
            .await
            .unwrap();
        let serials: Vec<i64> = all.iter().map(|t| t.serial).collect();
        assert_eq!(serials, vec![1, 2, 3]);

        let filter = ListFilter {
            phone: Some("98".to_string()),
        };
        let mine = store.list(TokenKind::Consumer, &filter).await.unwrap();
        assert_eq!(mine.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_by_code() {
        let store = MemoryStore::new();
        store.insert(&token(1, "K1AAAAA", "98")).await.unwrap();
        assert!(store
            .delete_by_code(TokenKind::Consumer, "K1AAAAA")
            .await
            .unwrap());
        assert!(store.is_empty());
    }
}
