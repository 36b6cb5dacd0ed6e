//! Data models for the Kalon token ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::LedgerError;
use crate::policy::TokenKind;

/// Redeemer name marking engine-generated reissuance entries in the log.
pub const SYSTEM_REDEEMER: &str = "SYSTEM";

/// Token status
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Active,
    Expired,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Active => "Active",
            TokenStatus::Expired => "Expired",
        }
    }

    /// Badge colour shown next to the status.
    pub fn color(&self) -> &'static str {
        match self {
            TokenStatus::Active => "green",
            TokenStatus::Expired => "red",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Active" => Some(TokenStatus::Active),
            "Expired" => Some(TokenStatus::Expired),
            _ => None,
        }
    }
}

/// Consumer token holder
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerHolder {
    #[validate(length(min = 1, message = "ownerName is required"))]
    pub owner_name: String,
    #[validate(length(min = 1, message = "ownerPhone is required"))]
    pub owner_phone: String,
    #[validate(length(min = 1, message = "residence is required"))]
    pub residence: String,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "ownerBusiness must not be negative"))]
    pub owner_business: f64,
}

/// Business-partner token holder
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusinessHolder {
    #[validate(length(min = 1, message = "businessName is required"))]
    pub business_name: String,
    #[validate(length(min = 1, message = "businessOwner is required"))]
    pub business_owner: String,
    #[validate(length(min = 1, message = "businessPhone is required"))]
    pub business_phone: String,
    #[validate(length(min = 1, message = "businessType is required"))]
    pub business_type: String,
    #[validate(length(min = 1, message = "businessLocation is required"))]
    pub business_location: String,
    #[validate(length(min = 1, message = "instagramProfile is required"))]
    pub instagram_profile: String,
}

/// Agent token holder
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentHolder {
    #[validate(length(min = 1, message = "businessName is required"))]
    pub business_name: String,
    #[validate(length(min = 1, message = "agentName is required"))]
    pub agent_name: String,
    #[validate(length(min = 1, message = "phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "businessType is required"))]
    pub business_type: String,
    #[validate(length(min = 1, message = "region is required"))]
    pub region: String,
    /// Commission percentage paid to the agent.
    #[validate(range(min = 0.0, message = "commission must not be negative"))]
    pub commission: f64,
}

/// Identity of whoever a token was issued to, one shape per variant
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind")]
pub enum Holder {
    #[serde(rename = "b2c")]
    Consumer(ConsumerHolder),
    #[serde(rename = "b2b")]
    Business(BusinessHolder),
    #[serde(rename = "b2ba")]
    Agent(AgentHolder),
}

impl Holder {
    pub fn kind(&self) -> TokenKind {
        match self {
            Holder::Consumer(_) => TokenKind::Consumer,
            Holder::Business(_) => TokenKind::Business,
            Holder::Agent(_) => TokenKind::Agent,
        }
    }

    /// Name shown on cards and report blocks.
    pub fn display_name(&self) -> &str {
        match self {
            Holder::Consumer(h) => &h.owner_name,
            Holder::Business(h) => &h.business_name,
            Holder::Agent(h) => &h.business_name,
        }
    }

    /// The person answerable for the token (owner or agent).
    pub fn contact_name(&self) -> &str {
        match self {
            Holder::Consumer(h) => &h.owner_name,
            Holder::Business(h) => &h.business_owner,
            Holder::Agent(h) => &h.agent_name,
        }
    }

    pub fn contact_phone(&self) -> &str {
        match self {
            Holder::Consumer(h) => &h.owner_phone,
            Holder::Business(h) => &h.business_phone,
            Holder::Agent(h) => &h.phone,
        }
    }

    pub fn business_type(&self) -> Option<&str> {
        match self {
            Holder::Consumer(_) => None,
            Holder::Business(h) => Some(&h.business_type),
            Holder::Agent(h) => Some(&h.business_type),
        }
    }

    /// Business credited to the holder directly rather than through redemptions.
    pub fn owner_business(&self) -> f64 {
        match self {
            Holder::Consumer(h) => h.owner_business,
            Holder::Business(_) | Holder::Agent(_) => 0.0,
        }
    }

    /// Run field validation for whichever shape this is.
    pub fn validate(&self) -> Result<(), LedgerError> {
        match self {
            Holder::Consumer(h) => h.validate()?,
            Holder::Business(h) => h.validate()?,
            Holder::Agent(h) => h.validate()?,
        }
        Ok(())
    }
}

/// One entry of a token's redemption log
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub date: DateTime<Utc>,
    pub redeemer_name: String,
    pub redeemer_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemer_residence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bill_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Redemption {
    /// Whether this entry was written by the reissuance rule.
    pub fn is_system(&self) -> bool {
        self.redeemer_name == SYSTEM_REDEEMER
    }
}

/// Business brought in by a consumer token's redeemer
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedeemerBusiness {
    pub redeemer_name: String,
    pub amount: f64,
}

/// Redeemable token
///
/// `total_business`, `status`, `remaining_days` and `status_color` are a cache
/// of values derived from the other fields and are rewritten by
/// [`Token::refresh`] before any use.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: Uuid,
    pub serial: i64,
    pub code: String,
    pub holder: Holder,
    /// Non-system redemptions performed so far (`currentUses` for partners).
    pub uses: u32,
    pub max_uses: u32,
    /// Ceiling the token was issued with; anything above it came from reissuance.
    pub initial_max_uses: u32,
    pub redemptions: Vec<Redemption>,
    #[serde(default)]
    pub redeemer_business: Vec<RedeemerBusiness>,
    pub total_business: f64,
    pub status: TokenStatus,
    pub remaining_days: String,
    pub status_color: String,
    pub issue_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by every successful save.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        self.holder.kind()
    }

    pub fn is_reissued(&self) -> bool {
        self.max_uses > self.initial_max_uses
    }

    /// Sum of the amounts recorded against redemptions.
    pub fn redeemer_total(&self) -> f64 {
        match self.kind() {
            TokenKind::Consumer => self.redeemer_business.iter().map(|b| b.amount).sum(),
            TokenKind::Business | TokenKind::Agent => self
                .redemptions
                .iter()
                .filter_map(|r| r.bill_amount)
                .sum(),
        }
    }

    pub fn remaining_uses(&self) -> u32 {
        self.max_uses.saturating_sub(self.uses)
    }

    /// Redemptions made by customers, without reissuance markers.
    pub fn customer_redemptions(&self) -> impl Iterator<Item = &Redemption> {
        self.redemptions.iter().filter(|r| !r.is_system())
    }
}

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Pagination parameters
#[derive(Debug, Deserialize, Default, Clone, Copy)]
pub struct PaginationParams {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}
