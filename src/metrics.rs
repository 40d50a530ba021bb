use actix_web::HttpResponse;
use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

lazy_static! {
    pub static ref ORDERS_CREATED_TOTAL: IntCounter = register_int_counter!(
        "exchange_orders_created_total",
        "Total orders created"
    )
    .unwrap();
    pub static ref ORDERS_ACCEPTED_TOTAL: IntCounter = register_int_counter!(
        "exchange_orders_accepted_total",
        "Total orders accepted into escrow"
    )
    .unwrap();
    pub static ref ORDERS_CANCELLED_TOTAL: IntCounter = register_int_counter!(
        "exchange_orders_cancelled_total",
        "Total orders cancelled by their owner"
    )
    .unwrap();
    pub static ref ESCROWS_RELEASED_TOTAL: IntCounter = register_int_counter!(
        "exchange_escrows_released_total",
        "Total escrows released to the buyer"
    )
    .unwrap();
    pub static ref DEPOSITS_TOTAL: IntCounter = register_int_counter!(
        "exchange_wallet_deposits_total",
        "Total wallet deposits"
    )
    .unwrap();
    pub static ref CONVERSIONS_RECORDED_TOTAL: IntCounter = register_int_counter!(
        "exchange_conversions_recorded_total",
        "Total conversion ledger records"
    )
    .unwrap();
    pub static ref TRIGGERS_FIRED_TOTAL: IntCounter = register_int_counter!(
        "exchange_triggers_fired_total",
        "Total rate triggers fired"
    )
    .unwrap();
    pub static ref UPSTREAM_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "exchange_upstream_failures_total",
        "Total external collaborator failures"
    )
    .unwrap();
}

/// Prometheus exposition endpoint
pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("Metrics encoding failed: {}", e));
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
