use crate::database::Database;
use crate::errors::{ExchangeEngineError, Result};
use crate::events::NatsProducer;
use crate::forecast_client::ForecastClient;
use crate::identity_client::IdentityClient;
use crate::market_client::{LiveRates, MarketDataClient, RatePoint};
use crate::metrics;
use crate::models::{
    BalanceView, ComparisonOp, Conversion, ConversionRequest, CreateOrderRequest,
    CreateTriggerRequest, DepositRequest, Escrow, ExchangeEvent, ExchangeEventType,
    ForecastResponse, MarginInfo, Order, RateSignal, RateTrigger, Rating, RatingRequest,
    TradeSuggestion, TriggerAlert, TriggerFailure, TriggerSweepResult, User, WalletBalance,
};
use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct ExchangeService {
    pub db: Arc<Database>,
    pub nats: Arc<NatsProducer>,
    pub identity: Arc<IdentityClient>,
    pub market_data: Arc<MarketDataClient>,
    pub forecast_client: Arc<ForecastClient>,
    pub rate_window_hours: i64,
    pub max_rate_window_hours: i64,
    pub default_margin_percent: f64,
}

impl ExchangeService {
    pub fn new(
        db: Arc<Database>,
        nats: Arc<NatsProducer>,
        identity: Arc<IdentityClient>,
        market_data: Arc<MarketDataClient>,
        forecast_client: Arc<ForecastClient>,
        rate_window_hours: i64,
        max_rate_window_hours: i64,
        default_margin_percent: f64,
    ) -> Self {
        ExchangeService {
            db,
            nats,
            identity,
            market_data,
            forecast_client,
            rate_window_hours,
            max_rate_window_hours,
            default_margin_percent,
        }
    }

    /// Resolve a bearer token to the local user, creating the row on first
    /// successful authentication.
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        let subject = self.identity.verify_token(token).await?;

        self.db
            .get_or_create_user(&subject.subject, subject.email.as_deref())
            .await
    }

    // ---------- wallet ----------

    pub async fn deposit(&self, user_id: Uuid, request: DepositRequest) -> Result<WalletBalance> {
        validator::Validate::validate(&request)
            .map_err(|e| ExchangeEngineError::Validation(e.to_string()))?;

        let balance = self
            .db
            .credit_balance(user_id, &request.currency, request.amount)
            .await?;

        metrics::DEPOSITS_TOTAL.inc();

        info!(
            "Deposited {} {} for user {}",
            request.amount, request.currency, user_id
        );

        Ok(balance)
    }

    pub async fn wallet(&self, user_id: Uuid) -> Result<Vec<BalanceView>> {
        let balances = self.db.list_balances(user_id).await?;

        Ok(balances
            .into_iter()
            .map(|b| BalanceView {
                currency: b.currency,
                balance: b.balance,
            })
            .collect())
    }

    // ---------- order book ----------

    pub async fn create_order(&self, owner_id: Uuid, request: CreateOrderRequest) -> Result<Order> {
        validator::Validate::validate(&request)
            .map_err(|e| ExchangeEngineError::Validation(e.to_string()))?;

        if request.base_currency == request.target_currency {
            return Err(ExchangeEngineError::Validation(
                "base and target currency must differ".to_string(),
            ));
        }

        let order = self
            .db
            .create_order(
                owner_id,
                request.side,
                &request.base_currency,
                &request.target_currency,
                request.amount,
                request.price,
            )
            .await?;

        self.publish_event(
            ExchangeEventType::OrderCreated,
            order.id,
            owner_id,
            serde_json::json!({
                "side": order.side,
                "base_currency": order.base_currency,
                "target_currency": order.target_currency,
                "amount": order.amount,
                "price": order.price,
            }),
        )
        .await;

        metrics::ORDERS_CREATED_TOTAL.inc();

        info!(
            "Created {:?} order {} {} -> {} amount {} price {}",
            order.side, order.id, order.base_currency, order.target_currency, order.amount,
            order.price
        );

        Ok(order)
    }

    pub async fn list_open_orders(&self) -> Result<Vec<Order>> {
        self.db.list_open_orders().await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order> {
        self.db
            .get_order(order_id)
            .await?
            .ok_or(ExchangeEngineError::OrderNotFound(order_id))
    }

    pub async fn cancel_order(&self, order_id: Uuid, owner_id: Uuid) -> Result<Order> {
        let order = self.db.cancel_order(order_id, owner_id).await?;

        self.publish_event(
            ExchangeEventType::OrderCancelled,
            order.id,
            owner_id,
            serde_json::json!({ "status": order.status }),
        )
        .await;

        metrics::ORDERS_CANCELLED_TOTAL.inc();

        info!("Cancelled order {}", order_id);

        Ok(order)
    }

    // ---------- escrow protocol ----------

    /// Accept an open order: the acceptor's base-currency funds move into a
    /// PENDING escrow and the order completes, all in one transaction.
    pub async fn accept_order(&self, order_id: Uuid, acceptor_id: Uuid) -> Result<Escrow> {
        let (order, escrow) = self.db.accept_order(order_id, acceptor_id).await?;

        self.publish_event(
            ExchangeEventType::OrderAccepted,
            escrow.id,
            acceptor_id,
            serde_json::json!({
                "order_id": order.id,
                "seller_id": escrow.seller_id,
                "amount": escrow.amount,
                "price": escrow.price,
                "target_currency": escrow.target_currency,
            }),
        )
        .await;

        metrics::ORDERS_ACCEPTED_TOTAL.inc();

        info!(
            "Order {} accepted by {}; escrow {} holding {} {}",
            order.id, acceptor_id, escrow.id, escrow.amount, order.base_currency
        );

        Ok(escrow)
    }

    pub async fn get_escrow(&self, escrow_id: Uuid) -> Result<Escrow> {
        self.db
            .get_escrow(escrow_id)
            .await?
            .ok_or(ExchangeEngineError::EscrowNotFound(escrow_id))
    }

    /// Release a pending escrow: seller-only; credits the buyer's
    /// target-currency wallet with amount * price.
    pub async fn release_escrow(&self, escrow_id: Uuid, caller_id: Uuid) -> Result<Escrow> {
        let escrow = self.db.release_escrow(escrow_id, caller_id).await?;

        self.publish_event(
            ExchangeEventType::EscrowReleased,
            escrow.id,
            caller_id,
            serde_json::json!({
                "order_id": escrow.order_id,
                "buyer_id": escrow.buyer_id,
                "settled": escrow.amount * escrow.price,
                "target_currency": escrow.target_currency,
            }),
        )
        .await;

        metrics::ESCROWS_RELEASED_TOTAL.inc();

        info!(
            "Escrow {} released; credited {} {} to buyer {}",
            escrow.id,
            escrow.amount * escrow.price,
            escrow.target_currency,
            escrow.buyer_id
        );

        Ok(escrow)
    }

    // ---------- conversion ledger ----------

    pub async fn record_conversion(
        &self,
        user_id: Uuid,
        request: ConversionRequest,
    ) -> Result<Conversion> {
        validator::Validate::validate(&request)
            .map_err(|e| ExchangeEngineError::Validation(e.to_string()))?;

        let conversion = self
            .db
            .record_conversion(
                user_id,
                request.usd_amount,
                request.lbp_amount,
                request.usd_to_lbp,
            )
            .await?;

        self.publish_event(
            ExchangeEventType::ConversionRecorded,
            conversion.id,
            user_id,
            serde_json::json!({
                "usd_amount": conversion.usd_amount,
                "lbp_amount": conversion.lbp_amount,
                "usd_to_lbp": conversion.usd_to_lbp,
            }),
        )
        .await;

        metrics::CONVERSIONS_RECORDED_TOTAL.inc();

        Ok(conversion)
    }

    pub async fn list_conversions(&self, user_id: Uuid) -> Result<Vec<Conversion>> {
        self.db.list_conversions(user_id).await
    }

    pub async fn latest_conversion(&self, user_id: Uuid) -> Result<Conversion> {
        self.db
            .latest_conversion(user_id)
            .await?
            .ok_or(ExchangeEngineError::NoRateData)
    }

    /// Market-rate signal from USD->LBP conversions in the trailing window
    pub async fn derive_rate(&self, window_hours: Option<i64>) -> Result<RateSignal> {
        let window = window_hours.unwrap_or(self.rate_window_hours);

        if window <= 0 || window > self.max_rate_window_hours {
            return Err(ExchangeEngineError::Validation(format!(
                "window_hours must be between 1 and {}",
                self.max_rate_window_hours
            )));
        }

        let (total_usd, total_lbp, sample_count) = self.db.conversion_totals(window).await?;

        compute_rate_signal(total_usd, total_lbp, sample_count, window)
    }

    // ---------- rating ledger ----------

    pub async fn record_rating(&self, rater_id: Uuid, request: RatingRequest) -> Result<Rating> {
        validator::Validate::validate(&request)
            .map_err(|e| ExchangeEngineError::Validation(e.to_string()))?;

        self.db
            .get_user(request.ratee_id)
            .await?
            .ok_or(ExchangeEngineError::UserNotFound(request.ratee_id))?;

        self.db
            .record_rating(
                rater_id,
                request.ratee_id,
                request.score,
                request.comment.as_deref(),
            )
            .await
    }

    pub async fn list_ratings(&self, ratee_id: Uuid) -> Result<Vec<Rating>> {
        self.db.list_ratings_for(ratee_id).await
    }

    // ---------- rate triggers ----------

    pub async fn create_trigger(&self, request: CreateTriggerRequest) -> Result<RateTrigger> {
        validator::Validate::validate(&request)
            .map_err(|e| ExchangeEngineError::Validation(e.to_string()))?;

        let operator: ComparisonOp = request
            .operator
            .parse()
            .map_err(ExchangeEngineError::Validation)?;

        self.db
            .create_trigger(
                &request.base_currency,
                &request.target_currency,
                operator,
                request.threshold,
            )
            .await
    }

    /// Evaluate every untriggered alert against the live market rate.
    /// Failures are collected per trigger and reported alongside the alerts;
    /// one bad quote neither aborts the sweep nor disappears.
    pub async fn check_triggers(&self) -> Result<TriggerSweepResult> {
        let triggers = self.db.list_untriggered().await?;

        let mut alerts = Vec::new();
        let mut failures = Vec::new();

        for trigger in triggers {
            let rate = match self
                .market_data
                .live_rate(&trigger.base_currency, &trigger.target_currency)
                .await
            {
                Ok(rate) => rate,
                Err(e) => {
                    metrics::UPSTREAM_FAILURES_TOTAL.inc();
                    warn!("Trigger {} evaluation failed: {}", trigger.id, e);
                    failures.push(TriggerFailure {
                        id: trigger.id,
                        base_currency: trigger.base_currency,
                        target_currency: trigger.target_currency,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if !trigger.operator.compare(rate, trigger.threshold) {
                continue;
            }

            // The latch may lose to a concurrent sweep; only the winner alerts.
            if self.db.mark_triggered(trigger.id).await? {
                metrics::TRIGGERS_FIRED_TOTAL.inc();
                info!(
                    "Trigger {} fired: {}{} {} {} at rate {}",
                    trigger.id,
                    trigger.base_currency,
                    trigger.target_currency,
                    trigger.operator,
                    trigger.threshold,
                    rate
                );
                alerts.push(TriggerAlert {
                    id: trigger.id,
                    base_currency: trigger.base_currency,
                    target_currency: trigger.target_currency,
                    operator: trigger.operator,
                    threshold: trigger.threshold,
                    live_rate: rate,
                });
            }
        }

        Ok(TriggerSweepResult { alerts, failures })
    }

    // ---------- market data & forecast (external collaborators) ----------

    pub async fn live_rates(&self, source: &str, symbols: &[&str]) -> Result<LiveRates> {
        self.market_data.live_rates(source, symbols).await
    }

    pub async fn historical_rates(
        &self,
        source: &str,
        target: &str,
        days: i64,
    ) -> Result<Vec<RatePoint>> {
        if !(1..=365).contains(&days) {
            return Err(ExchangeEngineError::Validation(
                "days must be between 1 and 365".to_string(),
            ));
        }

        self.market_data.historical_rates(source, target, days).await
    }

    pub async fn margin_info(
        &self,
        source: &str,
        target: &str,
        margin_percent: f64,
    ) -> Result<MarginInfo> {
        let percent = Decimal::from_f64(margin_percent)
            .filter(|p| *p >= Decimal::ZERO)
            .ok_or_else(|| {
                ExchangeEngineError::Validation("percent must be a non-negative number".to_string())
            })?;

        let official_rate = self.market_data.live_rate(source, target).await?;

        Ok(compute_margin(source, target, official_rate, percent))
    }

    pub async fn forecast(
        &self,
        source: &str,
        target: &str,
        history_days: i64,
        forecast_days: i64,
    ) -> Result<ForecastResponse> {
        if !(1..=365).contains(&history_days) || !(1..=90).contains(&forecast_days) {
            return Err(ExchangeEngineError::Validation(
                "history_days must be 1-365 and forecast_days 1-90".to_string(),
            ));
        }

        let series = self
            .market_data
            .historical_rates(source, target, history_days)
            .await?;

        let last_observed = series
            .last()
            .map(|p| p.rate)
            .ok_or_else(|| {
                ExchangeEngineError::Upstream(
                    "Market data provider returned an empty series".to_string(),
                )
            })?;

        let points = self.forecast_client.forecast(&series, forecast_days).await?;

        let suggestion = points
            .first()
            .map(|p| suggestion_for(last_observed, p.predicted))
            .unwrap_or(TradeSuggestion::Hold);

        Ok(ForecastResponse {
            source: source.to_string(),
            currency: target.to_string(),
            suggestion,
            points,
        })
    }

    /// Publish failures are logged, never failed back to the caller: the
    /// ledger mutation has already committed.
    async fn publish_event(
        &self,
        event_type: ExchangeEventType,
        entity_id: Uuid,
        user_id: Uuid,
        payload: serde_json::Value,
    ) {
        let event = ExchangeEvent {
            event_type,
            entity_id,
            user_id,
            timestamp: Utc::now(),
            payload,
        };

        if let Err(e) = self.nats.publish_exchange_event(&event).await {
            error!("Failed to publish {:?} event: {}", event_type, e);
        }
    }
}

/// Rate signal arithmetic, factored out of the database path
fn compute_rate_signal(
    total_usd: Decimal,
    total_lbp: Decimal,
    sample_count: i64,
    window_hours: i64,
) -> Result<RateSignal> {
    if sample_count == 0 {
        return Err(ExchangeEngineError::NoRateData);
    }

    // Unreachable given per-record validation, but the guard stays.
    if total_usd.is_zero() || total_lbp.is_zero() {
        return Err(ExchangeEngineError::Internal(
            "conversion totals would divide by zero".to_string(),
        ));
    }

    let usd_to_lbp = total_lbp / total_usd;

    Ok(RateSignal {
        usd_to_lbp,
        lbp_to_usd: Decimal::ONE / usd_to_lbp,
        window_hours,
        sample_count,
    })
}

fn compute_margin(
    source: &str,
    target: &str,
    official_rate: Decimal,
    margin_percent: Decimal,
) -> MarginInfo {
    let hundred = Decimal::from(100);
    let platform_rate = official_rate * (Decimal::ONE + margin_percent / hundred);

    MarginInfo {
        base: source.to_string(),
        currency: target.to_string(),
        official_rate,
        platform_rate,
        markup_percent: margin_percent,
    }
}

fn suggestion_for(last_observed: Decimal, first_predicted: Decimal) -> TradeSuggestion {
    if first_predicted > last_observed {
        TradeSuggestion::Buy
    } else if first_predicted < last_observed {
        TradeSuggestion::Sell
    } else {
        TradeSuggestion::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rate_signal_from_totals() {
        let signal = compute_rate_signal(dec!(200), dec!(17800000), 4, 72).unwrap();
        assert_eq!(signal.usd_to_lbp, dec!(89000));
        assert_eq!(signal.sample_count, 4);
        assert_eq!(signal.window_hours, 72);
        assert!(signal.lbp_to_usd > Decimal::ZERO);
        assert!(signal.lbp_to_usd < Decimal::ONE);
    }

    #[test]
    fn test_rate_signal_requires_samples() {
        let err = compute_rate_signal(Decimal::ZERO, Decimal::ZERO, 0, 72).unwrap_err();
        assert!(matches!(err, ExchangeEngineError::NoRateData));
    }

    #[test]
    fn test_rate_signal_division_guard() {
        let err = compute_rate_signal(Decimal::ZERO, dec!(100), 1, 72).unwrap_err();
        assert!(matches!(err, ExchangeEngineError::Internal(_)));
    }

    #[test]
    fn test_margin_markup() {
        let info = compute_margin("USD", "EUR", dec!(0.90), dec!(2));
        assert_eq!(info.platform_rate, dec!(0.918));
        assert_eq!(info.official_rate, dec!(0.90));
    }

    #[test]
    fn test_margin_zero_percent_is_identity() {
        let info = compute_margin("USD", "EUR", dec!(0.90), Decimal::ZERO);
        assert_eq!(info.platform_rate, dec!(0.90));
    }

    #[test]
    fn test_forecast_suggestion() {
        assert_eq!(suggestion_for(dec!(1.0), dec!(1.1)), TradeSuggestion::Buy);
        assert_eq!(suggestion_for(dec!(1.1), dec!(1.0)), TradeSuggestion::Sell);
        assert_eq!(suggestion_for(dec!(1.0), dec!(1.0)), TradeSuggestion::Hold);
    }
}
