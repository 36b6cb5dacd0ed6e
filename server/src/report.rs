//! Status reports and partner rankings
//!
//! Reports consume tokens whose derived fields have already been refreshed
//! and hold no business rules of their own.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::LedgerError;
use crate::models::{PaginationParams, Token, TokenStatus};
use crate::policy::TokenKind;

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Which tokens a report covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFilter {
    All,
    Active,
    Expired,
    Reissued,
}

impl ReportFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFilter::All => "all",
            ReportFilter::Active => "active",
            ReportFilter::Expired => "expired",
            ReportFilter::Reissued => "reissued",
        }
    }

    pub fn matches(&self, token: &Token) -> bool {
        match self {
            ReportFilter::All => true,
            ReportFilter::Active => token.status == TokenStatus::Active,
            ReportFilter::Expired => token.status == TokenStatus::Expired,
            ReportFilter::Reissued => token.is_reissued(),
        }
    }
}

impl FromStr for ReportFilter {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(ReportFilter::All),
            "active" => Ok(ReportFilter::Active),
            "expired" => Ok(ReportFilter::Expired),
            "reissued" => Ok(ReportFilter::Reissued),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown report type '{other}'"
            ))),
        }
    }
}

/// A line of a token's redemption history
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryLine {
    pub date: NaiveDate,
    pub redeemer_name: String,
    pub redeemer_phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Per-token block of a report
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub serial: i64,
    pub code: String,
    pub holder_name: String,
    pub contact_name: String,
    pub phone: String,
    pub status: TokenStatus,
    pub uses: u32,
    pub max_uses: u32,
    pub reissued: bool,
    /// Redemptions by customers, not counting reissuance markers.
    pub customer_visits: usize,
    pub owner_business: f64,
    pub redeemer_total: f64,
    pub total_business: f64,
    pub issue_date: NaiveDate,
    pub expiration_date: NaiveDate,
    pub remaining_days: String,
    pub history: Vec<HistoryLine>,
}

impl From<&Token> for ReportEntry {
    fn from(token: &Token) -> Self {
        let history = token
            .redemptions
            .iter()
            .map(|r| HistoryLine {
                date: r.date.date_naive(),
                redeemer_name: r.redeemer_name.clone(),
                redeemer_phone: r.redeemer_phone.clone(),
                amount: r.bill_amount,
                note: r.note.clone(),
            })
            .collect();

        Self {
            serial: token.serial,
            code: token.code.clone(),
            holder_name: token.holder.display_name().to_string(),
            contact_name: token.holder.contact_name().to_string(),
            phone: token.holder.contact_phone().to_string(),
            status: token.status,
            uses: token.uses,
            max_uses: token.max_uses,
            reissued: token.is_reissued(),
            customer_visits: token.customer_redemptions().count(),
            owner_business: token.holder.owner_business(),
            redeemer_total: token.redeemer_total(),
            total_business: token.total_business,
            issue_date: token.issue_date.date_naive(),
            expiration_date: token.expiration_date.date_naive(),
            remaining_days: token.remaining_days.clone(),
            history,
        }
    }
}

/// Aggregate over the whole selection
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_tokens: usize,
    pub total_business: f64,
    pub active_tokens: usize,
    pub expired_tokens: usize,
    pub reissued_tokens: usize,
}

impl ReportSummary {
    pub fn of<'a>(tokens: impl IntoIterator<Item = &'a Token>) -> Self {
        tokens.into_iter().fold(Self::default(), |mut acc, t| {
            acc.total_tokens += 1;
            acc.total_business += t.total_business;
            match t.status {
                TokenStatus::Active => acc.active_tokens += 1,
                TokenStatus::Expired => acc.expired_tokens += 1,
            }
            if t.is_reissued() {
                acc.reissued_tokens += 1;
            }
            acc
        })
    }
}

/// Token status report
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub title: String,
    pub kind: TokenKind,
    pub filter: ReportFilter,
    pub generated_on: NaiveDate,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
    pub entries: Vec<ReportEntry>,
    pub summary: ReportSummary,
}

pub fn report_title(kind: TokenKind, filter: ReportFilter) -> String {
    let scope = filter.as_str().to_ascii_uppercase();
    match kind {
        TokenKind::Consumer => format!("Kalon Salon & Academy - {scope} Tokens Report"),
        _ => format!(
            "Kalon Salon & Academy - {} {scope} Tokens Report",
            kind.label()
        ),
    }
}

/// Select the tokens matching `filter` and lay out one page of the report.
pub fn build_report(
    kind: TokenKind,
    filter: ReportFilter,
    tokens: &[Token],
    pagination: PaginationParams,
    now: DateTime<Utc>,
) -> Report {
    let selected: Vec<&Token> = tokens.iter().filter(|t| filter.matches(t)).collect();
    let summary = ReportSummary::of(selected.iter().copied());

    let limit = pagination
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let page = pagination.page.unwrap_or(1).max(1);
    let total_pages = selected.len().div_ceil(limit).max(1);

    let entries = selected
        .iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .map(|t| ReportEntry::from(*t))
        .collect();

    Report {
        title: report_title(kind, filter),
        kind,
        filter,
        generated_on: now.date_naive(),
        page,
        limit,
        total_pages,
        entries,
        summary,
    }
}

/// One row of the partner ranking
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartnerRanking {
    pub serial: i64,
    pub code: String,
    pub business_name: String,
    pub contact_name: String,
    pub business_type: Option<String>,
    pub total_business: f64,
    pub status: TokenStatus,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankingSummary {
    pub total_business: f64,
    pub active_tokens: usize,
    pub expired_tokens: usize,
    pub total_partners: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rankings {
    pub partners: Vec<PartnerRanking>,
    pub summary: RankingSummary,
}

/// Rank holders by the business their token brought in, highest first.
pub fn partner_rankings(tokens: &[Token]) -> Rankings {
    let mut partners: Vec<PartnerRanking> = tokens
        .iter()
        .map(|t| PartnerRanking {
            serial: t.serial,
            code: t.code.clone(),
            business_name: t.holder.display_name().to_string(),
            contact_name: t.holder.contact_name().to_string(),
            business_type: t.holder.business_type().map(str::to_string),
            total_business: t.total_business,
            status: t.status,
        })
        .collect();
    partners.sort_by(|a, b| {
        b.total_business
            .total_cmp(&a.total_business)
            .then(a.serial.cmp(&b.serial))
    });

    let summary = RankingSummary {
        total_business: partners.iter().map(|p| p.total_business).sum(),
        active_tokens: partners
            .iter()
            .filter(|p| p.status == TokenStatus::Active)
            .count(),
        expired_tokens: partners
            .iter()
            .filter(|p| p.status == TokenStatus::Expired)
            .count(),
        total_partners: partners.len(),
    };

    Rankings { partners, summary }
}
