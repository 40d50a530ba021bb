use crate::errors::{ExchangeEngineError, Result};
use crate::models::{
    ComparisonOp, Conversion, Escrow, EscrowStatus, Order, OrderSide, OrderStatus, RateTrigger,
    Rating, User, WalletBalance,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Pool, Postgres, Row};
use std::time::Duration;
use uuid::Uuid;

pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| ExchangeEngineError::Internal(format!("Migration failed: {}", e)))?;

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---------- users ----------

    /// Map an external identity subject to the local user row, creating it on
    /// first sight. Only the email may change on subsequent authentications.
    pub async fn get_or_create_user(
        &self,
        external_uid: &str,
        email: Option<&str>,
    ) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, external_uid, email, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (external_uid)
            DO UPDATE SET email = COALESCE(EXCLUDED.email, users.email)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(external_uid)
        .bind(email)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    // ---------- wallet store ----------

    /// Credit a wallet, creating the balance row on first use
    pub async fn credit_balance(
        &self,
        user_id: Uuid,
        currency: &str,
        amount: Decimal,
    ) -> Result<WalletBalance> {
        if amount <= Decimal::ZERO {
            return Err(ExchangeEngineError::Validation(
                "credit amount must be positive".to_string(),
            ));
        }

        let balance = sqlx::query_as::<_, WalletBalance>(
            r#"
            INSERT INTO wallet_balances (id, user_id, currency, balance)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, currency)
            DO UPDATE SET balance = wallet_balances.balance + EXCLUDED.balance
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(currency)
        .bind(amount)
        .fetch_one(&self.pool)
        .await?;

        Ok(balance)
    }

    /// Debit a wallet. Fails if the row is absent or the balance is short;
    /// the conditional UPDATE serializes concurrent debits on the same row.
    pub async fn debit_balance(
        &self,
        user_id: Uuid,
        currency: &str,
        amount: Decimal,
    ) -> Result<WalletBalance> {
        if amount <= Decimal::ZERO {
            return Err(ExchangeEngineError::Validation(
                "debit amount must be positive".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT balance FROM wallet_balances
            WHERE user_id = $1 AND currency = $2
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(currency)
        .fetch_optional(&mut *tx)
        .await?;

        let available: Decimal = match row {
            Some(row) => row.get("balance"),
            None => return Err(ExchangeEngineError::BalanceNotFound(currency.to_string())),
        };

        if available < amount {
            return Err(ExchangeEngineError::InsufficientFunds {
                required: amount.to_string(),
                available: available.to_string(),
            });
        }

        let balance = sqlx::query_as::<_, WalletBalance>(
            r#"
            UPDATE wallet_balances
            SET balance = balance - $1
            WHERE user_id = $2 AND currency = $3 AND balance >= $1
            RETURNING *
            "#,
        )
        .bind(amount)
        .bind(user_id)
        .bind(currency)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(balance)
    }

    /// Current balance, zero if the row does not exist. Read-only.
    pub async fn get_balance(&self, user_id: Uuid, currency: &str) -> Result<Decimal> {
        let row = sqlx::query(
            r#"
            SELECT balance FROM wallet_balances
            WHERE user_id = $1 AND currency = $2
            "#,
        )
        .bind(user_id)
        .bind(currency)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("balance")).unwrap_or(Decimal::ZERO))
    }

    pub async fn list_balances(&self, user_id: Uuid) -> Result<Vec<WalletBalance>> {
        let balances = sqlx::query_as::<_, WalletBalance>(
            r#"
            SELECT * FROM wallet_balances
            WHERE user_id = $1
            ORDER BY currency
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(balances)
    }

    // ---------- order book ----------

    pub async fn create_order(
        &self,
        owner_id: Uuid,
        side: OrderSide,
        base_currency: &str,
        target_currency: &str,
        amount: Decimal,
        price: Decimal,
    ) -> Result<Order> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (
                id, owner_id, side, base_currency, target_currency,
                amount, price, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(side)
        .bind(base_currency)
        .bind(target_currency)
        .bind(amount)
        .bind(price)
        .bind(OrderStatus::Open)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(order)
    }

    /// Open orders in deterministic creation order
    pub async fn list_open_orders(&self) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE status = 'OPEN'
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Owner-only OPEN -> CANCELLED transition
    pub async fn cancel_order(&self, order_id: Uuid, owner_id: Uuid) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ExchangeEngineError::OrderNotFound(order_id))?;

        order.ensure_cancellable_by(owner_id)?;

        let cancelled = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = 'CANCELLED'
            WHERE id = $1 AND status = 'OPEN'
            RETURNING *
            "#,
        )
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(cancelled)
    }

    // ---------- escrow engine ----------

    /// Accept protocol, one transaction: lock the order, check the acceptor's
    /// base-currency funds, debit, flip OPEN -> COMPLETED, open the escrow.
    /// A failed funds check aborts with no mutation; after the debit the
    /// status flip and escrow insert commit or roll back with it.
    pub async fn accept_order(&self, order_id: Uuid, acceptor_id: Uuid) -> Result<(Order, Escrow)> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ExchangeEngineError::OrderNotFound(order_id))?;

        order.ensure_acceptable_by(acceptor_id)?;

        // Lock the acceptor's wallet row; an absent row reads as zero funds.
        let wallet_row = sqlx::query(
            r#"
            SELECT balance FROM wallet_balances
            WHERE user_id = $1 AND currency = $2
            FOR UPDATE
            "#,
        )
        .bind(acceptor_id)
        .bind(&order.base_currency)
        .fetch_optional(&mut *tx)
        .await?;

        let available: Decimal = wallet_row
            .map(|r| r.get("balance"))
            .unwrap_or(Decimal::ZERO);

        if available < order.amount {
            return Err(ExchangeEngineError::InsufficientFunds {
                required: order.amount.to_string(),
                available: available.to_string(),
            });
        }

        sqlx::query(
            r#"
            UPDATE wallet_balances
            SET balance = balance - $1
            WHERE user_id = $2 AND currency = $3 AND balance >= $1
            "#,
        )
        .bind(order.amount)
        .bind(acceptor_id)
        .bind(&order.base_currency)
        .execute(&mut *tx)
        .await?;

        // Compare-and-set; the row lock already serialized us, the status
        // guard is the invariant of record.
        let completed = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = 'COMPLETED'
            WHERE id = $1 AND status = 'OPEN'
            RETURNING *
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ExchangeEngineError::OrderNotOpen(order_id))?;

        let escrow = sqlx::query_as::<_, Escrow>(
            r#"
            INSERT INTO escrows (
                id, order_id, buyer_id, seller_id, amount, price,
                target_currency, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(acceptor_id)
        .bind(order.owner_id)
        .bind(order.amount)
        .bind(order.price)
        .bind(&order.target_currency)
        .bind(EscrowStatus::Pending)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((completed, escrow))
    }

    pub async fn get_escrow(&self, escrow_id: Uuid) -> Result<Option<Escrow>> {
        let escrow = sqlx::query_as::<_, Escrow>(
            r#"
            SELECT * FROM escrows WHERE id = $1
            "#,
        )
        .bind(escrow_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(escrow)
    }

    /// Release protocol, one transaction: only the named seller, only while
    /// PENDING. Credits the buyer's target-currency wallet with amount * price
    /// and flips PENDING -> RELEASED together.
    pub async fn release_escrow(&self, escrow_id: Uuid, caller_id: Uuid) -> Result<Escrow> {
        let mut tx = self.pool.begin().await?;

        let escrow = sqlx::query_as::<_, Escrow>(
            r#"
            SELECT * FROM escrows WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(escrow_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ExchangeEngineError::EscrowNotFound(escrow_id))?;

        escrow.ensure_releasable_by(caller_id)?;

        let settlement = escrow.settlement_amount();

        sqlx::query(
            r#"
            INSERT INTO wallet_balances (id, user_id, currency, balance)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, currency)
            DO UPDATE SET balance = wallet_balances.balance + EXCLUDED.balance
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(escrow.buyer_id)
        .bind(&escrow.target_currency)
        .bind(settlement)
        .execute(&mut *tx)
        .await?;

        let released = sqlx::query_as::<_, Escrow>(
            r#"
            UPDATE escrows
            SET status = 'RELEASED', updated_at = $2
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(escrow_id)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ExchangeEngineError::EscrowFinalized(escrow_id))?;

        tx.commit().await?;

        Ok(released)
    }

    // ---------- conversion ledger ----------

    pub async fn record_conversion(
        &self,
        user_id: Uuid,
        usd_amount: Decimal,
        lbp_amount: Decimal,
        usd_to_lbp: bool,
    ) -> Result<Conversion> {
        let conversion = sqlx::query_as::<_, Conversion>(
            r#"
            INSERT INTO conversions (id, user_id, usd_amount, lbp_amount, usd_to_lbp, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(usd_amount)
        .bind(lbp_amount)
        .bind(usd_to_lbp)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(conversion)
    }

    pub async fn list_conversions(&self, user_id: Uuid) -> Result<Vec<Conversion>> {
        let conversions = sqlx::query_as::<_, Conversion>(
            r#"
            SELECT * FROM conversions
            WHERE user_id = $1
            ORDER BY recorded_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(conversions)
    }

    pub async fn latest_conversion(&self, user_id: Uuid) -> Result<Option<Conversion>> {
        let conversion = sqlx::query_as::<_, Conversion>(
            r#"
            SELECT * FROM conversions
            WHERE user_id = $1
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversion)
    }

    /// Sums over USD->LBP records in the trailing window, for rate derivation
    pub async fn conversion_totals(&self, window_hours: i64) -> Result<(Decimal, Decimal, i64)> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(usd_amount), 0) AS total_usd,
                COALESCE(SUM(lbp_amount), 0) AS total_lbp,
                COUNT(*) AS sample_count
            FROM conversions
            WHERE usd_to_lbp AND recorded_at >= NOW() - make_interval(hours => $1::int)
            "#,
        )
        .bind(window_hours)
        .fetch_one(&self.pool)
        .await?;

        Ok((
            row.get("total_usd"),
            row.get("total_lbp"),
            row.get("sample_count"),
        ))
    }

    // ---------- rating ledger ----------

    pub async fn record_rating(
        &self,
        rater_id: Uuid,
        ratee_id: Uuid,
        score: i32,
        comment: Option<&str>,
    ) -> Result<Rating> {
        let rating = sqlx::query_as::<_, Rating>(
            r#"
            INSERT INTO ratings (id, rater_id, ratee_id, score, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(rater_id)
        .bind(ratee_id)
        .bind(score)
        .bind(comment)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(rating)
    }

    pub async fn list_ratings_for(&self, ratee_id: Uuid) -> Result<Vec<Rating>> {
        let ratings = sqlx::query_as::<_, Rating>(
            r#"
            SELECT * FROM ratings
            WHERE ratee_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(ratee_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ratings)
    }

    // ---------- rate triggers ----------

    pub async fn create_trigger(
        &self,
        base_currency: &str,
        target_currency: &str,
        operator: ComparisonOp,
        threshold: Decimal,
    ) -> Result<RateTrigger> {
        let trigger = sqlx::query_as::<_, RateTrigger>(
            r#"
            INSERT INTO rate_triggers (
                id, base_currency, target_currency, operator, threshold, triggered, created_at
            )
            VALUES ($1, $2, $3, $4, $5, FALSE, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(base_currency)
        .bind(target_currency)
        .bind(operator)
        .bind(threshold)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(trigger)
    }

    pub async fn list_untriggered(&self) -> Result<Vec<RateTrigger>> {
        let triggers = sqlx::query_as::<_, RateTrigger>(
            r#"
            SELECT * FROM rate_triggers
            WHERE NOT triggered
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(triggers)
    }

    /// One-shot latch; the triggered guard keeps concurrent sweeps from
    /// firing the same trigger twice.
    pub async fn mark_triggered(&self, trigger_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE rate_triggers
            SET triggered = TRUE
            WHERE id = $1 AND NOT triggered
            "#,
        )
        .bind(trigger_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
