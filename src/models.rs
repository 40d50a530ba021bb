use crate::errors::ExchangeEngineError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::ValidationError;

/// Order side enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order status enumeration: OPEN is the only non-terminal state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Open,       // Standing offer, may be accepted or cancelled
    Completed,  // Matched at accept time; settlement proceeds via escrow
    Cancelled,  // Withdrawn by the owner before any match
}

/// Escrow status enumeration: PENDING is the only non-terminal state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    Pending,
    Released,
    Cancelled,
}

/// Closed set of comparison operators for rate triggers.
/// Dispatched through an explicit match, never through dynamic evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text")]
pub enum ComparisonOp {
    #[sqlx(rename = ">")]
    #[serde(rename = ">")]
    Gt,
    #[sqlx(rename = ">=")]
    #[serde(rename = ">=")]
    Ge,
    #[sqlx(rename = "<")]
    #[serde(rename = "<")]
    Lt,
    #[sqlx(rename = "<=")]
    #[serde(rename = "<=")]
    Le,
    #[sqlx(rename = "==")]
    #[serde(rename = "==")]
    Eq,
}

impl ComparisonOp {
    /// Evaluate `rate <op> threshold`
    pub fn compare(&self, rate: Decimal, threshold: Decimal) -> bool {
        match self {
            ComparisonOp::Gt => rate > threshold,
            ComparisonOp::Ge => rate >= threshold,
            ComparisonOp::Lt => rate < threshold,
            ComparisonOp::Le => rate <= threshold,
            ComparisonOp::Eq => rate == threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Eq => "==",
        }
    }
}

impl FromStr for ComparisonOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            ">" => Ok(ComparisonOp::Gt),
            ">=" => Ok(ComparisonOp::Ge),
            "<" => Ok(ComparisonOp::Lt),
            "<=" => Ok(ComparisonOp::Le),
            "==" => Ok(ComparisonOp::Eq),
            other => Err(format!("unsupported operator: {}", other)),
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local user row, anchored to the external identity subject
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub external_uid: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-(user, currency) balance row. Mutated only by wallet credit/debit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WalletBalance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: String,
    pub balance: Decimal,
}

/// Standing offer to exchange base-currency amount at a stated price
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub side: OrderSide,
    pub base_currency: String,
    pub target_currency: String,
    pub amount: Decimal,
    pub price: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Accept guard: only OPEN orders, never by their own owner.
    /// Checked before any mutation; the SQL compare-and-set re-asserts it.
    pub fn ensure_acceptable_by(&self, acceptor_id: Uuid) -> Result<(), ExchangeEngineError> {
        if self.owner_id == acceptor_id {
            return Err(ExchangeEngineError::SelfTrade(self.id));
        }

        if self.status != OrderStatus::Open {
            return Err(ExchangeEngineError::OrderNotOpen(self.id));
        }

        Ok(())
    }

    /// Cancel guard: owner-only, OPEN-only
    pub fn ensure_cancellable_by(&self, caller_id: Uuid) -> Result<(), ExchangeEngineError> {
        if self.owner_id != caller_id {
            return Err(ExchangeEngineError::Unauthorized(
                "only the order owner may cancel".to_string(),
            ));
        }

        if self.status != OrderStatus::Open {
            return Err(ExchangeEngineError::OrderNotOpen(self.id));
        }

        Ok(())
    }
}

/// Held funds bridging order acceptance and final settlement
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Escrow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount: Decimal,
    pub price: Decimal,
    pub target_currency: String,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Escrow {
    /// Release guard: the named seller, while PENDING. Authorization is
    /// checked before state so a wrong caller learns nothing about status.
    pub fn ensure_releasable_by(&self, caller_id: Uuid) -> Result<(), ExchangeEngineError> {
        if self.seller_id != caller_id {
            return Err(ExchangeEngineError::Unauthorized(
                "only the escrow seller may release".to_string(),
            ));
        }

        if self.status != EscrowStatus::Pending {
            return Err(ExchangeEngineError::EscrowFinalized(self.id));
        }

        Ok(())
    }

    /// Amount credited to the buyer on release
    pub fn settlement_amount(&self) -> Decimal {
        self.amount * self.price
    }
}

/// Append-only reputation record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Rating {
    pub id: Uuid,
    pub rater_id: Uuid,
    pub ratee_id: Uuid,
    pub score: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only currency-conversion record; feeds the derived rate signal
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversion {
    pub id: Uuid,
    pub user_id: Uuid,
    pub usd_amount: Decimal,
    pub lbp_amount: Decimal,
    pub usd_to_lbp: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Rate alert with a one-shot triggered latch
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RateTrigger {
    pub id: Uuid,
    pub base_currency: String,
    pub target_currency: String,
    pub operator: ComparisonOp,
    pub threshold: Decimal,
    pub triggered: bool,
    pub created_at: DateTime<Utc>,
}

/// Domain event published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct ExchangeEvent {
    pub event_type: ExchangeEventType,
    pub entity_id: Uuid,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExchangeEventType {
    OrderCreated,
    OrderAccepted,
    OrderCancelled,
    EscrowReleased,
    ConversionRecorded,
}

// ---------- request / response types ----------

fn validate_positive(amount: &Decimal) -> std::result::Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    Ok(())
}

fn validate_currency(code: &str) -> std::result::Result<(), ValidationError> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::new("invalid_currency_code"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct DepositRequest {
    #[validate(custom = "validate_currency")]
    pub currency: String,
    #[validate(custom = "validate_positive")]
    pub amount: Decimal,
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct CreateOrderRequest {
    pub side: OrderSide,
    #[validate(custom = "validate_currency")]
    pub base_currency: String,
    #[validate(custom = "validate_currency")]
    pub target_currency: String,
    #[validate(custom = "validate_positive")]
    pub amount: Decimal,
    #[validate(custom = "validate_positive")]
    pub price: Decimal,
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct RatingRequest {
    pub ratee_id: Uuid,
    #[validate(range(min = 1, max = 5))]
    pub score: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct ConversionRequest {
    #[validate(custom = "validate_positive")]
    pub usd_amount: Decimal,
    #[validate(custom = "validate_positive")]
    pub lbp_amount: Decimal,
    pub usd_to_lbp: bool,
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct CreateTriggerRequest {
    #[validate(custom = "validate_currency")]
    pub base_currency: String,
    #[validate(custom = "validate_currency")]
    pub target_currency: String,
    pub operator: String,
    #[validate(custom = "validate_positive")]
    pub threshold: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceView {
    pub currency: String,
    pub balance: Decimal,
}

/// Derived market-rate signal aggregated from the conversion ledger
#[derive(Debug, Serialize, Deserialize)]
pub struct RateSignal {
    pub usd_to_lbp: Decimal,
    pub lbp_to_usd: Decimal,
    pub window_hours: i64,
    pub sample_count: i64,
}

/// A trigger that fired during a sweep
#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerAlert {
    pub id: Uuid,
    pub base_currency: String,
    pub target_currency: String,
    pub operator: ComparisonOp,
    pub threshold: Decimal,
    pub live_rate: Decimal,
}

/// A trigger whose evaluation failed; reported alongside successes, never dropped
#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerFailure {
    pub id: Uuid,
    pub base_currency: String,
    pub target_currency: String,
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerSweepResult {
    pub alerts: Vec<TriggerAlert>,
    pub failures: Vec<TriggerFailure>,
}

/// Platform margin over the official market rate
#[derive(Debug, Serialize, Deserialize)]
pub struct MarginInfo {
    pub base: String,
    pub currency: String,
    pub official_rate: Decimal,
    pub platform_rate: Decimal,
    pub markup_percent: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSuggestion {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: chrono::NaiveDate,
    pub predicted: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub source: String,
    pub currency: String,
    pub suggestion: TradeSuggestion,
    pub points: Vec<ForecastPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_comparison_op_dispatch() {
        assert!(ComparisonOp::Gt.compare(dec!(1.5), dec!(1.0)));
        assert!(!ComparisonOp::Gt.compare(dec!(1.0), dec!(1.0)));
        assert!(ComparisonOp::Ge.compare(dec!(1.0), dec!(1.0)));
        assert!(ComparisonOp::Lt.compare(dec!(0.9), dec!(1.0)));
        assert!(!ComparisonOp::Lt.compare(dec!(1.0), dec!(1.0)));
        assert!(ComparisonOp::Le.compare(dec!(1.0), dec!(1.0)));
        assert!(ComparisonOp::Eq.compare(dec!(89000), dec!(89000)));
        assert!(!ComparisonOp::Eq.compare(dec!(89000.5), dec!(89000)));
    }

    #[test]
    fn test_comparison_op_round_trip() {
        for symbol in [">", ">=", "<", "<=", "=="] {
            let op: ComparisonOp = symbol.parse().unwrap();
            assert_eq!(op.as_str(), symbol);
        }
        assert!("=>".parse::<ComparisonOp>().is_err());
        assert!("!=".parse::<ComparisonOp>().is_err());
    }

    #[test]
    fn test_status_serialization_matches_storage() {
        assert_eq!(
            serde_json::to_value(OrderStatus::Open).unwrap(),
            serde_json::json!("OPEN")
        );
        assert_eq!(
            serde_json::to_value(EscrowStatus::Pending).unwrap(),
            serde_json::json!("PENDING")
        );
        assert_eq!(
            serde_json::to_value(OrderSide::Sell).unwrap(),
            serde_json::json!("SELL")
        );
    }

    #[test]
    fn test_deposit_request_validation() {
        use validator::Validate;

        let ok = DepositRequest {
            currency: "USD".to_string(),
            amount: dec!(100),
        };
        assert!(ok.validate().is_ok());

        let bad_amount = DepositRequest {
            currency: "USD".to_string(),
            amount: dec!(0),
        };
        assert!(bad_amount.validate().is_err());

        let bad_currency = DepositRequest {
            currency: "usd".to_string(),
            amount: dec!(1),
        };
        assert!(bad_currency.validate().is_err());
    }
}
