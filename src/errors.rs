use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, ExchangeEngineError>;

#[derive(Error, Debug)]
pub enum ExchangeEngineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("NATS error: {0}")]
    Nats(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Escrow not found: {0}")]
    EscrowNotFound(Uuid),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("No wallet balance for currency {0}")]
    BalanceNotFound(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("Order is not open: {0}")]
    OrderNotOpen(Uuid),

    #[error("Cannot accept own order: {0}")]
    SelfTrade(Uuid),

    #[error("Escrow already finalized: {0}")]
    EscrowFinalized(Uuid),

    #[error("No conversion data in the requested window")]
    NoRateData,

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ResponseError for ExchangeEngineError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = self.to_string();

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": error_message,
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ExchangeEngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ExchangeEngineError::Nats(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ExchangeEngineError::DecimalParse(_) => StatusCode::BAD_REQUEST,
            ExchangeEngineError::Validation(_) => StatusCode::BAD_REQUEST,
            ExchangeEngineError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            ExchangeEngineError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ExchangeEngineError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            ExchangeEngineError::EscrowNotFound(_) => StatusCode::NOT_FOUND,
            ExchangeEngineError::UserNotFound(_) => StatusCode::NOT_FOUND,
            ExchangeEngineError::BalanceNotFound(_) => StatusCode::NOT_FOUND,
            ExchangeEngineError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ExchangeEngineError::OrderNotOpen(_) => StatusCode::CONFLICT,
            ExchangeEngineError::SelfTrade(_) => StatusCode::CONFLICT,
            ExchangeEngineError::EscrowFinalized(_) => StatusCode::CONFLICT,
            ExchangeEngineError::NoRateData => StatusCode::NOT_FOUND,
            ExchangeEngineError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ExchangeEngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ExchangeEngineError {
    fn error_type(&self) -> &str {
        match self {
            ExchangeEngineError::Database(_) => "database_error",
            ExchangeEngineError::Nats(_) => "messaging_error",
            ExchangeEngineError::DecimalParse(_) => "decimal_parse_error",
            ExchangeEngineError::Validation(_) => "validation_error",
            ExchangeEngineError::AuthFailed(_) => "auth_failed",
            ExchangeEngineError::Unauthorized(_) => "unauthorized",
            ExchangeEngineError::OrderNotFound(_) => "not_found",
            ExchangeEngineError::EscrowNotFound(_) => "not_found",
            ExchangeEngineError::UserNotFound(_) => "not_found",
            ExchangeEngineError::BalanceNotFound(_) => "not_found",
            ExchangeEngineError::InsufficientFunds { .. } => "insufficient_funds",
            ExchangeEngineError::OrderNotOpen(_) => "conflict",
            ExchangeEngineError::SelfTrade(_) => "conflict",
            ExchangeEngineError::EscrowFinalized(_) => "conflict",
            ExchangeEngineError::NoRateData => "no_rate_data",
            ExchangeEngineError::Upstream(_) => "external_service_error",
            ExchangeEngineError::Internal(_) => "internal_error",
        }
    }
}
