use crate::errors::ExchangeEngineError;
use crate::metrics;
use crate::models::{
    ConversionRequest, CreateOrderRequest, CreateTriggerRequest, DepositRequest, RatingRequest,
};
use crate::services::ExchangeService;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "exchange-engine",
        "version": "1.0.0"
    }))
}

fn bearer_token(req: &HttpRequest) -> Result<&str, ExchangeEngineError> {
    req.headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            ExchangeEngineError::AuthFailed("Missing or malformed Authorization header".to_string())
        })
}

// ---------- wallet ----------

pub async fn deposit(
    service: web::Data<Arc<ExchangeService>>,
    req: HttpRequest,
    request: web::Json<DepositRequest>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let user = service.authenticate(bearer_token(&req)?).await?;
    let balance = service.deposit(user.id, request.into_inner()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "currency": balance.currency,
        "balance": balance.balance,
    })))
}

pub async fn get_wallet(
    service: web::Data<Arc<ExchangeService>>,
    req: HttpRequest,
) -> Result<HttpResponse, ExchangeEngineError> {
    let user = service.authenticate(bearer_token(&req)?).await?;
    let balances = service.wallet(user.id).await?;

    Ok(HttpResponse::Ok().json(balances))
}

// ---------- orders & escrow ----------

pub async fn create_order(
    service: web::Data<Arc<ExchangeService>>,
    req: HttpRequest,
    request: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let user = service.authenticate(bearer_token(&req)?).await?;
    let order = service.create_order(user.id, request.into_inner()).await?;

    Ok(HttpResponse::Created().json(order))
}

pub async fn list_orders(
    service: web::Data<Arc<ExchangeService>>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let orders = service.list_open_orders().await?;

    Ok(HttpResponse::Ok().json(orders))
}

pub async fn get_order(
    service: web::Data<Arc<ExchangeService>>,
    order_id: web::Path<Uuid>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let order = service.get_order(*order_id).await?;

    Ok(HttpResponse::Ok().json(order))
}

pub async fn get_escrow(
    service: web::Data<Arc<ExchangeService>>,
    escrow_id: web::Path<Uuid>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let escrow = service.get_escrow(*escrow_id).await?;

    Ok(HttpResponse::Ok().json(escrow))
}

pub async fn accept_order(
    service: web::Data<Arc<ExchangeService>>,
    req: HttpRequest,
    order_id: web::Path<Uuid>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let user = service.authenticate(bearer_token(&req)?).await?;
    let escrow = service.accept_order(*order_id, user.id).await?;

    Ok(HttpResponse::Created().json(escrow))
}

pub async fn cancel_order(
    service: web::Data<Arc<ExchangeService>>,
    req: HttpRequest,
    order_id: web::Path<Uuid>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let user = service.authenticate(bearer_token(&req)?).await?;
    let order = service.cancel_order(*order_id, user.id).await?;

    Ok(HttpResponse::Ok().json(order))
}

pub async fn release_escrow(
    service: web::Data<Arc<ExchangeService>>,
    req: HttpRequest,
    escrow_id: web::Path<Uuid>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let user = service.authenticate(bearer_token(&req)?).await?;
    let escrow = service.release_escrow(*escrow_id, user.id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "id": escrow.id,
        "status": escrow.status,
    })))
}

// ---------- ratings ----------

pub async fn create_rating(
    service: web::Data<Arc<ExchangeService>>,
    req: HttpRequest,
    request: web::Json<RatingRequest>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let user = service.authenticate(bearer_token(&req)?).await?;
    let rating = service.record_rating(user.id, request.into_inner()).await?;

    Ok(HttpResponse::Created().json(json!({ "id": rating.id })))
}

pub async fn list_ratings(
    service: web::Data<Arc<ExchangeService>>,
    ratee_id: web::Path<Uuid>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let ratings = service.list_ratings(*ratee_id).await?;

    Ok(HttpResponse::Ok().json(ratings))
}

// ---------- conversion ledger ----------

pub async fn record_conversion(
    service: web::Data<Arc<ExchangeService>>,
    req: HttpRequest,
    request: web::Json<ConversionRequest>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let user = service.authenticate(bearer_token(&req)?).await?;
    let conversion = service
        .record_conversion(user.id, request.into_inner())
        .await?;

    Ok(HttpResponse::Created().json(conversion))
}

pub async fn list_conversions(
    service: web::Data<Arc<ExchangeService>>,
    req: HttpRequest,
) -> Result<HttpResponse, ExchangeEngineError> {
    let user = service.authenticate(bearer_token(&req)?).await?;
    let conversions = service.list_conversions(user.id).await?;

    Ok(HttpResponse::Ok().json(conversions))
}

pub async fn latest_conversion(
    service: web::Data<Arc<ExchangeService>>,
    req: HttpRequest,
) -> Result<HttpResponse, ExchangeEngineError> {
    let user = service.authenticate(bearer_token(&req)?).await?;
    let conversion = service.latest_conversion(user.id).await?;

    Ok(HttpResponse::Ok().json(conversion))
}

#[derive(Debug, Deserialize)]
pub struct RateQuery {
    pub window_hours: Option<i64>,
}

pub async fn derived_rate(
    service: web::Data<Arc<ExchangeService>>,
    query: web::Query<RateQuery>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let signal = service.derive_rate(query.window_hours).await?;

    Ok(HttpResponse::Ok().json(signal))
}

// ---------- rate triggers ----------

pub async fn create_trigger(
    service: web::Data<Arc<ExchangeService>>,
    req: HttpRequest,
    request: web::Json<CreateTriggerRequest>,
) -> Result<HttpResponse, ExchangeEngineError> {
    service.authenticate(bearer_token(&req)?).await?;
    let trigger = service.create_trigger(request.into_inner()).await?;

    Ok(HttpResponse::Created().json(json!({ "id": trigger.id })))
}

pub async fn check_triggers(
    service: web::Data<Arc<ExchangeService>>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let result = service.check_triggers().await?;

    Ok(HttpResponse::Ok().json(result))
}

// ---------- market data & forecast ----------

#[derive(Debug, Deserialize)]
pub struct LiveRatesQuery {
    pub source: Option<String>,
    pub symbols: Option<String>,
}

pub async fn live_rates(
    service: web::Data<Arc<ExchangeService>>,
    query: web::Query<LiveRatesQuery>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let source = query.source.as_deref().unwrap_or("USD");
    let symbols = query.symbols.as_deref().unwrap_or("EUR,GBP,CAD,JPY");
    let symbols: Vec<&str> = symbols.split(',').filter(|s| !s.is_empty()).collect();

    let rates = service.live_rates(source, &symbols).await?;

    Ok(HttpResponse::Ok().json(rates))
}

#[derive(Debug, Deserialize)]
pub struct HistoricalQuery {
    pub source: Option<String>,
    pub days: Option<i64>,
}

pub async fn historical_rates(
    service: web::Data<Arc<ExchangeService>>,
    currency: web::Path<String>,
    query: web::Query<HistoricalQuery>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let source = query.source.as_deref().unwrap_or("USD");
    let days = query.days.unwrap_or(7);

    let points = service
        .historical_rates(source, &currency.to_uppercase(), days)
        .await?;

    Ok(HttpResponse::Ok().json(points))
}

#[derive(Debug, Deserialize)]
pub struct MarginQuery {
    pub source: Option<String>,
    pub percent: Option<f64>,
}

pub async fn margin_info(
    service: web::Data<Arc<ExchangeService>>,
    currency: web::Path<String>,
    query: web::Query<MarginQuery>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let source = query.source.as_deref().unwrap_or("USD");
    let percent = query.percent.unwrap_or(service.default_margin_percent);

    let info = service
        .margin_info(source, &currency.to_uppercase(), percent)
        .await?;

    Ok(HttpResponse::Ok().json(info))
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub source: Option<String>,
    pub currency: String,
    pub history_days: Option<i64>,
    pub forecast_days: Option<i64>,
}

pub async fn forecast(
    service: web::Data<Arc<ExchangeService>>,
    query: web::Query<ForecastQuery>,
) -> Result<HttpResponse, ExchangeEngineError> {
    let source = query.source.as_deref().unwrap_or("USD");
    let history_days = query.history_days.unwrap_or(30);
    let forecast_days = query.forecast_days.unwrap_or(7);

    let response = service
        .forecast(
            source,
            &query.currency.to_uppercase(),
            history_days,
            forecast_days,
        )
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(metrics::metrics_handler))
        .service(
            web::scope("/api/v1")
                .route("/wallet", web::get().to(get_wallet))
                .route("/wallet/deposit", web::post().to(deposit))
                .route("/orders", web::post().to(create_order))
                .route("/orders", web::get().to(list_orders))
                .route("/orders/{id}", web::get().to(get_order))
                .route("/orders/{id}/accept", web::post().to(accept_order))
                .route("/orders/{id}/cancel", web::post().to(cancel_order))
                .route("/escrow/{id}", web::get().to(get_escrow))
                .route("/escrow/{id}/release", web::post().to(release_escrow))
                .route("/ratings", web::post().to(create_rating))
                .route("/ratings/{user_id}", web::get().to(list_ratings))
                .route("/conversions", web::post().to(record_conversion))
                .route("/conversions", web::get().to(list_conversions))
                .route("/conversions/latest", web::get().to(latest_conversion))
                .route("/rate", web::get().to(derived_rate))
                .route("/triggers", web::post().to(create_trigger))
                .route("/triggers/check", web::post().to(check_triggers))
                .route("/rates/live", web::get().to(live_rates))
                .route("/rates/historical/{currency}", web::get().to(historical_rates))
                .route("/rates/margin/{currency}", web::get().to(margin_info))
                .route("/rates/forecast", web::get().to(forecast)),
        );
}
