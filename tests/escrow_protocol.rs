//! Scenario tests for the order/escrow state machine guards.
//!
//! The guards are the pre-mutation checks of the accept and release
//! protocols; the SQL layer re-asserts them with compare-and-set updates.

use chrono::Utc;
use exchange_engine::errors::ExchangeEngineError;
use exchange_engine::models::{Escrow, EscrowStatus, Order, OrderSide, OrderStatus};
use rust_decimal_macros::dec;
use uuid::Uuid;

fn sell_order(owner_id: Uuid) -> Order {
    Order {
        id: Uuid::new_v4(),
        owner_id,
        side: OrderSide::Sell,
        base_currency: "USD".to_string(),
        target_currency: "EUR".to_string(),
        amount: dec!(100),
        price: dec!(0.9),
        status: OrderStatus::Open,
        created_at: Utc::now(),
    }
}

fn escrow_for(order: &Order, buyer_id: Uuid) -> Escrow {
    Escrow {
        id: Uuid::new_v4(),
        order_id: order.id,
        buyer_id,
        seller_id: order.owner_id,
        amount: order.amount,
        price: order.price,
        target_currency: order.target_currency.clone(),
        status: EscrowStatus::Pending,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn open_order_is_acceptable_by_counterparty() {
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let order = sell_order(seller);

    assert!(order.ensure_acceptable_by(buyer).is_ok());
}

#[test]
fn owner_cannot_accept_own_order() {
    let seller = Uuid::new_v4();
    let order = sell_order(seller);

    let err = order.ensure_acceptable_by(seller).unwrap_err();
    assert!(matches!(err, ExchangeEngineError::SelfTrade(_)));
}

#[test]
fn accepted_order_rejects_second_accept() {
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let mut order = sell_order(seller);

    // First accept completes the order at match time.
    assert!(order.ensure_acceptable_by(buyer).is_ok());
    order.status = OrderStatus::Completed;

    let late_buyer = Uuid::new_v4();
    let err = order.ensure_acceptable_by(late_buyer).unwrap_err();
    assert!(matches!(err, ExchangeEngineError::OrderNotOpen(_)));
}

#[test]
fn cancelled_order_is_terminal() {
    let seller = Uuid::new_v4();
    let mut order = sell_order(seller);

    assert!(order.ensure_cancellable_by(seller).is_ok());
    order.status = OrderStatus::Cancelled;

    assert!(matches!(
        order.ensure_cancellable_by(seller).unwrap_err(),
        ExchangeEngineError::OrderNotOpen(_)
    ));
    assert!(matches!(
        order.ensure_acceptable_by(Uuid::new_v4()).unwrap_err(),
        ExchangeEngineError::OrderNotOpen(_)
    ));
}

#[test]
fn only_owner_may_cancel() {
    let seller = Uuid::new_v4();
    let order = sell_order(seller);

    let err = order.ensure_cancellable_by(Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, ExchangeEngineError::Unauthorized(_)));
}

#[test]
fn seller_releases_pending_escrow_once() {
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let order = sell_order(seller);
    let mut escrow = escrow_for(&order, buyer);

    assert!(escrow.ensure_releasable_by(seller).is_ok());
    escrow.status = EscrowStatus::Released;

    let err = escrow.ensure_releasable_by(seller).unwrap_err();
    assert!(matches!(err, ExchangeEngineError::EscrowFinalized(_)));
}

#[test]
fn non_seller_release_is_unauthorized() {
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let order = sell_order(seller);
    let escrow = escrow_for(&order, buyer);

    // Neither the buyer nor a stranger may trigger settlement.
    assert!(matches!(
        escrow.ensure_releasable_by(buyer).unwrap_err(),
        ExchangeEngineError::Unauthorized(_)
    ));
    assert!(matches!(
        escrow.ensure_releasable_by(Uuid::new_v4()).unwrap_err(),
        ExchangeEngineError::Unauthorized(_)
    ));
}

#[test]
fn cancelled_escrow_is_terminal() {
    let seller = Uuid::new_v4();
    let order = sell_order(seller);
    let mut escrow = escrow_for(&order, Uuid::new_v4());
    escrow.status = EscrowStatus::Cancelled;

    assert!(matches!(
        escrow.ensure_releasable_by(seller).unwrap_err(),
        ExchangeEngineError::EscrowFinalized(_)
    ));
}

#[test]
fn settlement_credits_amount_times_price() {
    // 100 USD at 0.9 settles 90 EUR to the buyer.
    let seller = Uuid::new_v4();
    let order = sell_order(seller);
    let escrow = escrow_for(&order, Uuid::new_v4());

    assert_eq!(escrow.settlement_amount(), dec!(90));
    assert_eq!(escrow.target_currency, "EUR");
}
