//! Property-based tests for protocol invariants
//!
//! - Terminal order/escrow states never pass the transition guards
//! - Settlement arithmetic is positive and linear in the escrowed amount
//! - Comparison operators partition the rate line consistently

use chrono::Utc;
use exchange_engine::models::{
    ComparisonOp, Escrow, EscrowStatus, Order, OrderSide, OrderStatus,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Strategy for generating valid amounts (positive decimals)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..1_000_000_00u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

/// Strategy for generating prices with up to six fractional digits
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..10_000_000u64).prop_map(|micros| Decimal::new(micros as i64, 6))
}

fn side_strategy() -> impl Strategy<Value = OrderSide> {
    prop_oneof![Just(OrderSide::Buy), Just(OrderSide::Sell)]
}

fn terminal_order_status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![Just(OrderStatus::Completed), Just(OrderStatus::Cancelled)]
}

fn terminal_escrow_status_strategy() -> impl Strategy<Value = EscrowStatus> {
    prop_oneof![Just(EscrowStatus::Released), Just(EscrowStatus::Cancelled)]
}

fn operator_strategy() -> impl Strategy<Value = ComparisonOp> {
    prop_oneof![
        Just(ComparisonOp::Gt),
        Just(ComparisonOp::Ge),
        Just(ComparisonOp::Lt),
        Just(ComparisonOp::Le),
        Just(ComparisonOp::Eq),
    ]
}

fn order_with(status: OrderStatus, side: OrderSide, amount: Decimal, price: Decimal) -> Order {
    Order {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        side,
        base_currency: "USD".to_string(),
        target_currency: "EUR".to_string(),
        amount,
        price,
        status,
        created_at: Utc::now(),
    }
}

fn escrow_with(status: EscrowStatus, amount: Decimal, price: Decimal) -> Escrow {
    Escrow {
        id: Uuid::new_v4(),
        order_id: Uuid::new_v4(),
        buyer_id: Uuid::new_v4(),
        seller_id: Uuid::new_v4(),
        amount,
        price,
        target_currency: "EUR".to_string(),
        status,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: no terminal order ever passes the accept guard
    #[test]
    fn prop_terminal_orders_reject_accept(
        status in terminal_order_status_strategy(),
        side in side_strategy(),
        amount in amount_strategy(),
        price in price_strategy(),
    ) {
        let order = order_with(status, side, amount, price);
        prop_assert!(order.ensure_acceptable_by(Uuid::new_v4()).is_err());
    }

    /// Property: the owner never passes the accept guard, open or not
    #[test]
    fn prop_owner_never_accepts(
        side in side_strategy(),
        amount in amount_strategy(),
        price in price_strategy(),
    ) {
        let order = order_with(OrderStatus::Open, side, amount, price);
        prop_assert!(order.ensure_acceptable_by(order.owner_id).is_err());
    }

    /// Property: open orders accept any non-owner counterparty
    #[test]
    fn prop_open_orders_accept_counterparty(
        side in side_strategy(),
        amount in amount_strategy(),
        price in price_strategy(),
    ) {
        let order = order_with(OrderStatus::Open, side, amount, price);
        prop_assert!(order.ensure_acceptable_by(Uuid::new_v4()).is_ok());
    }

    /// Property: finalized escrows reject release even from their seller
    #[test]
    fn prop_finalized_escrows_reject_release(
        status in terminal_escrow_status_strategy(),
        amount in amount_strategy(),
        price in price_strategy(),
    ) {
        let escrow = escrow_with(status, amount, price);
        prop_assert!(escrow.ensure_releasable_by(escrow.seller_id).is_err());
    }

    /// Property: settlement is positive and scales linearly with the amount
    #[test]
    fn prop_settlement_arithmetic(
        amount in amount_strategy(),
        price in price_strategy(),
    ) {
        let single = escrow_with(EscrowStatus::Pending, amount, price);
        let double = escrow_with(EscrowStatus::Pending, amount * Decimal::from(2), price);

        prop_assert!(single.settlement_amount() > Decimal::ZERO);
        prop_assert_eq!(
            double.settlement_amount(),
            single.settlement_amount() * Decimal::from(2)
        );
    }

    /// Property: strict and non-strict comparisons partition the rate line
    #[test]
    fn prop_comparison_partition(
        rate in price_strategy(),
        threshold in price_strategy(),
    ) {
        prop_assert_ne!(
            ComparisonOp::Gt.compare(rate, threshold),
            ComparisonOp::Le.compare(rate, threshold)
        );
        prop_assert_ne!(
            ComparisonOp::Lt.compare(rate, threshold),
            ComparisonOp::Ge.compare(rate, threshold)
        );

        if ComparisonOp::Eq.compare(rate, threshold) {
            prop_assert!(ComparisonOp::Ge.compare(rate, threshold));
            prop_assert!(ComparisonOp::Le.compare(rate, threshold));
        }
    }

    /// Property: every operator survives a parse round trip
    #[test]
    fn prop_operator_round_trip(op in operator_strategy()) {
        let parsed: ComparisonOp = op.as_str().parse().unwrap();
        prop_assert_eq!(parsed, op);
    }
}
