mod common;

use chrono::Utc;
use common::{cart, world};
use localretail_commerce::domain::aggregates::loyalty::ledger_is_consistent;
use localretail_commerce::domain::aggregates::{AddressInput, OrderStatus, Shop, Subscription, SubscriptionStatus, Tier, TransactionType};
use localretail_commerce::domain::value_objects::Money;
use localretail_commerce::service::Actor;
use localretail_commerce::store::OrderStore;
use localretail_commerce::{CommerceError, Order};
use rust_decimal_macros::dec;
use uuid::Uuid;

const TO_DELIVERED: [OrderStatus; 4] = [OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered];

async fn advance(w: &common::World, order: &Order, steps: &[OrderStatus]) -> Order {
    let mut current = order.clone();
    for next in steps {
        current = w.svc.transition_status(&w.merchant, order.id, *next, None).await.unwrap();
    }
    current
}

fn reconciles(order: &Order) -> bool {
    let lines: Money = order.items.iter().map(|i| i.line_total).sum();
    lines + order.tax_amount + order.shipping_cost - order.discount_amount - order.tokens_value == order.total
}

#[tokio::test]
async fn test_free_shipping_scenario() {
    let w = world().await;
    let a = w.product("A", dec!(10.00), 10).await;
    let b = w.product("B", dec!(30.00), 10).await;

    let order = w.svc.create_order(&w.customer, cart(&[(&a, 2), (&b, 1)])).await.unwrap();
    assert_eq!(order.subtotal.amount(), dec!(50.00));
    assert_eq!(order.tax_amount.amount(), dec!(9.50));
    assert_eq!(order.shipping_cost, Money::ZERO);
    assert_eq!(order.total.amount(), dec!(59.50));
    assert!(reconciles(&order));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.status_history[0].notes, "Order placed");
    assert_eq!(order.status_history[0].changed_by, "anna");

    advance(&w, &order, &TO_DELIVERED).await;
    assert_eq!(w.svc.loyalty_balance(&w.customer).await.unwrap().balance, 0);
}

#[tokio::test]
async fn test_flat_shipping_scenario() {
    let w = world().await;
    let a = w.product("A", dec!(19.99), 10).await;
    let b = w.product("B", dec!(30.00), 10).await;

    let order = w.svc.create_order(&w.customer, cart(&[(&a, 1), (&b, 1)])).await.unwrap();
    assert_eq!(order.subtotal.amount(), dec!(49.99));
    assert_eq!(order.shipping_cost.amount(), dec!(4.99));
    assert_eq!(order.total.amount(), dec!(64.48));
    assert!(reconciles(&order));
}

#[tokio::test]
async fn test_checkout_decrements_stock_and_records_customer() {
    let w = world().await;
    let a = w.product("A", dec!(5.00), 10).await;
    let order = w.svc.create_order(&w.customer, cart(&[(&a, 3), (&a, 1)])).await.unwrap();

    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].quantity, 4);
    assert_eq!(w.stock(&a).await, 6);
    assert_eq!(w.svc.store().product(a.id).await.unwrap().sales_count, 4);
    let customer = w.svc.store().customer(w.customer.id).await.unwrap().unwrap();
    assert_eq!(customer.total_orders, 1);
    assert_eq!(customer.total_spent, order.total);
    assert_eq!(order.shipping_address.city, "Leipzig");
    assert_eq!(order.shipping_address.country, "DE");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_drain_stock_exactly() {
    const N: u32 = 25;
    let w = world().await;
    let p = w.product("HOT", dec!(2.50), N).await;

    let mut tasks = Vec::new();
    for _ in 0..N {
        let svc = w.svc.clone();
        let actor = w.customer.clone();
        let request = cart(&[(&p, 1)]);
        tasks.push(tokio::spawn(async move { svc.create_order(&actor, request).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(w.stock(&p).await, 0);
    let err = w.svc.create_order(&w.customer, cart(&[(&p, 1)])).await.unwrap_err();
    assert!(matches!(err, CommerceError::OutOfStock { requested: 1, available: 0, .. }));
    assert_eq!(w.svc.my_orders(&w.customer).await.unwrap().len(), N as usize);
}

#[tokio::test]
async fn test_out_of_stock_leaves_everything_untouched() {
    let w = world().await;
    let a = w.product("A", dec!(10), 5).await;
    let b = w.product("B", dec!(10), 1).await;

    let err = w.svc.create_order(&w.customer, cart(&[(&a, 2), (&b, 2)])).await.unwrap_err();
    match err {
        CommerceError::OutOfStock { product, requested, available } => {
            assert_eq!((product.as_str(), requested, available), ("B", 2, 1));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(w.stock(&a).await, 5);
    assert!(w.svc.my_orders(&w.customer).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_rejections() {
    let w = world().await;
    let a = w.product("A", dec!(10), 5).await;

    let mut inactive = w.product("OFF", dec!(10), 5).await;
    inactive.is_active = false;
    w.svc.store().upsert_product(inactive.clone()).await;
    assert!(matches!(w.svc.create_order(&w.customer, cart(&[(&inactive, 1)])).await, Err(CommerceError::ProductInactive(_))));

    let mut missing = cart(&[(&a, 1)]);
    missing.items[0].product_id = Uuid::now_v7();
    assert!(matches!(w.svc.create_order(&w.customer, missing).await, Err(CommerceError::NotFound(_))));

    assert!(matches!(w.svc.create_order(&w.customer, cart(&[])).await, Err(CommerceError::Validation(_))));
    assert!(matches!(w.svc.create_order(&w.customer, cart(&[(&a, 0)])).await, Err(CommerceError::Validation(_))));
    assert!(matches!(w.svc.create_order(&w.merchant, cart(&[(&a, 1)])).await, Err(CommerceError::Forbidden(_))));

    let mut other_shop_id = cart(&[(&a, 1)]);
    other_shop_id.shop_id = Some(Uuid::now_v7());
    assert!(matches!(w.svc.create_order(&w.customer, other_shop_id).await, Err(CommerceError::Validation(_))));
}

#[tokio::test]
async fn test_orders_never_span_shops() {
    let w = world().await;
    let second = Shop { id: Uuid::now_v7(), merchant_id: Uuid::now_v7(), name: "Bäckerei".into(), is_active: true, subscription: Subscription::default() };
    w.svc.store().insert_shop(second.clone()).await;
    let a = w.product("A", dec!(10), 5).await;
    let b = w.product_in(second.id, "B", dec!(10), 5).await;

    let err = w.svc.create_order(&w.customer, cart(&[(&a, 1), (&b, 1)])).await.unwrap_err();
    assert!(matches!(err, CommerceError::Validation(ref m) if m.contains("same shop")));
}

#[tokio::test]
async fn test_suspended_shop_rejects_orders() {
    let w = world().await;
    let a = w.product("A", dec!(10), 5).await;
    let mut shop = w.shop.clone();
    shop.subscription.status = SubscriptionStatus::Suspended;
    w.svc.store().insert_shop(shop).await;

    let err = w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap_err();
    assert!(matches!(err, CommerceError::Validation(ref m) if m.contains("not accepting orders")));
    assert_eq!(w.stock(&a).await, 5);
}

#[tokio::test]
async fn test_shipping_address_falls_back_to_profile() {
    let w = world().await;
    let a = w.product("A", dec!(10), 5).await;

    let mut request = cart(&[(&a, 1)]);
    request.address = AddressInput { city: Some("Dresden".into()), ..Default::default() };
    let order = w.svc.create_order(&w.customer, request).await.unwrap();
    assert_eq!(order.shipping_address.city, "Dresden");
    assert_eq!(order.shipping_address.street_address, "Hauptstraße 5");

    let homeless = w.svc.store().customer(w.customer.id).await.unwrap().map(|mut c| {
        c.id = Uuid::now_v7();
        c.street_address.clear();
        c
    }).unwrap();
    w.svc.store().insert_customer(homeless.clone()).await;
    let err = w.svc.create_order(&Actor::customer(homeless.id, "nobody"), cart(&[(&a, 1)])).await.unwrap_err();
    assert!(matches!(err, CommerceError::Validation(_)));
}

#[tokio::test]
async fn test_snapshot_survives_product_edits() {
    let w = world().await;
    let a = w.product("A", dec!(10), 5).await;
    let order = w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap();

    let mut edited = w.svc.store().product(a.id).await.unwrap();
    edited.name = "Renamed".into();
    edited.price = Money::new(dec!(99));
    w.svc.store().upsert_product(edited).await;

    for _ in 0..3 {
        let fetched = w.svc.get_order(&w.customer, order.id).await.unwrap();
        assert_eq!(fetched.items[0].product_name, "A");
        assert_eq!(fetched.items[0].unit_price.amount(), dec!(10));
        assert_eq!(fetched.total, order.total);
    }
}

#[tokio::test]
async fn test_delivered_is_final() {
    let w = world().await;
    let a = w.product("A", dec!(10), 5).await;
    let order = w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap();
    let delivered = advance(&w, &order, &TO_DELIVERED).await;
    assert!(delivered.confirmed_at.is_some() && delivered.shipped_at.is_some() && delivered.delivered_at.is_some());

    let err = w.svc.transition_status(&w.merchant, order.id, OrderStatus::Confirmed, None).await.unwrap_err();
    assert!(matches!(err, CommerceError::InvalidTransition { from: OrderStatus::Delivered, to: OrderStatus::Confirmed }));
    let stored = w.svc.get_order(&w.merchant, order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Delivered);
    assert_eq!(stored.status_history.len(), 5);
    assert_eq!(stored.confirmed_at, delivered.confirmed_at);
}

#[tokio::test]
async fn test_transition_history_and_permissions() {
    let w = world().await;
    let a = w.product("A", dec!(10), 5).await;
    let order = w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap();

    let err = w.svc.transition_status(&w.customer, order.id, OrderStatus::Confirmed, None).await.unwrap_err();
    assert!(matches!(err, CommerceError::Forbidden(_)));

    let confirmed = w.svc.transition_status(&w.merchant, order.id, OrderStatus::Confirmed, None).await.unwrap();
    let entry = confirmed.status_history.last().unwrap();
    assert_eq!(entry.notes, "Status changed from pending to confirmed");
    assert_eq!(entry.changed_by, "mueller");

    let skipped = w.svc.transition_status(&w.merchant, order.id, OrderStatus::Delivered, Some("skip")).await.unwrap_err();
    assert!(matches!(skipped, CommerceError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_insufficient_balance_leaves_balance_unchanged() {
    let w = world().await;
    w.grant_tokens(&w.customer, 5).await;
    let a = w.product("A", dec!(20), 5).await;

    let mut request = cart(&[(&a, 1)]);
    request.tokens_to_spend = 6;
    let err = w.svc.create_order(&w.customer, request).await.unwrap_err();
    assert!(matches!(err, CommerceError::InsufficientBalance { requested: 6, available: 5 }));
    assert_eq!(w.svc.loyalty_balance(&w.customer).await.unwrap().balance, 5);
    assert_eq!(w.stock(&a).await, 5);

    let order = w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap();
    let err = w.svc.spend_loyalty(w.customer.id, 6, &order).await.unwrap_err();
    assert!(matches!(err, CommerceError::InsufficientBalance { .. }));
    assert_eq!(w.svc.loyalty_balance(&w.customer).await.unwrap().balance, 5);
    assert!(matches!(w.svc.spend_loyalty(w.customer.id, 0, &order).await, Err(CommerceError::Validation(_))));
}

#[tokio::test]
async fn test_tokens_reduce_total() {
    let w = world().await;
    w.grant_tokens(&w.customer, 10).await;
    let a = w.product("A", dec!(20), 5).await;

    let mut request = cart(&[(&a, 1)]);
    request.tokens_to_spend = 4;
    let order = w.svc.create_order(&w.customer, request).await.unwrap();
    // 20.00 + 3.80 VAT + 4.99 shipping - 4.00 tokens
    assert_eq!(order.total.amount(), dec!(24.79));
    assert_eq!(order.tokens_value.amount(), dec!(4.00));
    assert!(reconciles(&order));

    let balance = w.svc.loyalty_balance(&w.customer).await.unwrap();
    assert_eq!(balance.balance, 6);
    assert_eq!(balance.value.amount(), dec!(6.00));
    let history = w.svc.loyalty_history(&w.customer).await.unwrap();
    assert_eq!(history.last().unwrap().transaction_type, TransactionType::Spent);
    assert_eq!(history.last().unwrap().amount, -4);
}

#[tokio::test]
async fn test_tokens_cannot_exceed_order_value() {
    let w = world().await;
    w.grant_tokens(&w.customer, 100).await;
    let a = w.product("A", dec!(10), 5).await;

    let mut request = cart(&[(&a, 1)]);
    request.tokens_to_spend = 20;
    assert!(matches!(w.svc.create_order(&w.customer, request).await, Err(CommerceError::Validation(_))));
    assert_eq!(w.svc.loyalty_balance(&w.customer).await.unwrap().balance, 100);
}

#[tokio::test]
async fn test_cancel_restocks_and_refunds_tokens() {
    let w = world().await;
    w.grant_tokens(&w.customer, 5).await;
    let a = w.product("A", dec!(10), 10).await;

    let mut request = cart(&[(&a, 3)]);
    request.tokens_to_spend = 2;
    let order = w.svc.create_order(&w.customer, request).await.unwrap();
    assert_eq!(w.stock(&a).await, 7);
    assert_eq!(w.svc.loyalty_balance(&w.customer).await.unwrap().balance, 3);

    let cancelled = w.svc.cancel(&w.customer, order.id, None).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(cancelled.status_history.last().unwrap().notes, "Order cancelled: No reason provided");
    assert_eq!(w.stock(&a).await, 10);
    assert_eq!(w.svc.loyalty_balance(&w.customer).await.unwrap().balance, 5);

    let again = w.svc.cancel(&w.customer, order.id, Some("twice")).await.unwrap_err();
    assert!(matches!(again, CommerceError::InvalidTransition { from: OrderStatus::Cancelled, to: OrderStatus::Cancelled }));
    assert_eq!(w.stock(&a).await, 10);
}

#[tokio::test]
async fn test_cancel_rules() {
    let w = world().await;
    let a = w.product("A", dec!(10), 10).await;
    let stranger = w.second_customer("bob").await;

    let order = w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap();
    assert!(matches!(w.svc.cancel(&stranger, order.id, None).await, Err(CommerceError::Forbidden(_))));

    advance(&w, &order, &[OrderStatus::Confirmed, OrderStatus::Processing]).await;
    let err = w.svc.cancel(&w.customer, order.id, Some("too slow")).await.unwrap_err();
    assert!(matches!(err, CommerceError::InvalidTransition { from: OrderStatus::Processing, to: OrderStatus::Cancelled }));

    let second = w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap();
    let cancelled = w.svc.cancel(&w.merchant, second.id, Some("  out of season ")).await.unwrap();
    assert_eq!(cancelled.status_history.last().unwrap().notes, "Order cancelled: out of season");
}

#[tokio::test]
async fn test_refund_after_shipping_does_not_restock() {
    let w = world().await;
    let a = w.product("A", dec!(10), 10).await;
    let order = w.svc.create_order(&w.customer, cart(&[(&a, 2)])).await.unwrap();
    advance(&w, &order, &[OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Refunded]).await;
    assert_eq!(w.stock(&a).await, 8);

    let early = w.svc.create_order(&w.customer, cart(&[(&a, 2)])).await.unwrap();
    advance(&w, &early, &[OrderStatus::Confirmed, OrderStatus::Refunded]).await;
    assert_eq!(w.stock(&a).await, 8);
}

#[tokio::test]
async fn test_delivery_accrues_loyalty_once() {
    let w = world().await;
    let a = w.product("A", dec!(120), 10).await;
    let order = w.svc.create_order(&w.customer, cart(&[(&a, 2)])).await.unwrap();
    // 240.00 + 45.60 VAT
    assert_eq!(order.total.amount(), dec!(285.60));
    assert_eq!(w.svc.loyalty_balance(&w.customer).await.unwrap().balance, 0);

    let delivered = advance(&w, &order, &TO_DELIVERED).await;
    assert_eq!(w.svc.loyalty_balance(&w.customer).await.unwrap().balance, 2);

    assert!(w.svc.accrue_loyalty(&delivered).await.unwrap().is_none());
    assert_eq!(w.svc.loyalty_balance(&w.customer).await.unwrap().balance, 2);

    let history = w.svc.loyalty_history(&w.customer).await.unwrap();
    assert_eq!(history.iter().filter(|t| t.transaction_type == TransactionType::Earned).count(), 1);
    assert_eq!(history[0].order_id, Some(order.id));
}

#[tokio::test]
async fn test_ledger_replays_to_stored_balances() {
    let w = world().await;
    w.grant_tokens(&w.customer, 3).await;
    let a = w.product("A", dec!(150), 10).await;

    let mut request = cart(&[(&a, 1)]);
    request.tokens_to_spend = 2;
    let spent = w.svc.create_order(&w.customer, request).await.unwrap();
    let earned = w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap();
    advance(&w, &earned, &TO_DELIVERED).await;
    w.svc.cancel(&w.customer, spent.id, Some("changed mind")).await.unwrap();

    let history = w.svc.loyalty_history(&w.customer).await.unwrap();
    let kinds: Vec<_> = history.iter().map(|t| t.transaction_type).collect();
    assert_eq!(kinds, vec![TransactionType::AdminAdjustment, TransactionType::Spent, TransactionType::Earned, TransactionType::AdminAdjustment]);
    assert!(ledger_is_consistent(&history));
    assert_eq!(history.last().unwrap().balance_after, 4);
}

#[tokio::test]
async fn test_tracking_updates() {
    let w = world().await;
    let a = w.product("A", dec!(10), 10).await;
    let order = w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap();

    assert!(matches!(w.svc.update_tracking(&w.customer, order.id, "DHL1", None).await, Err(CommerceError::Forbidden(_))));
    let tracked = w.svc.update_tracking(&w.merchant, order.id, "DHL1", Some("https://dhl.example/DHL1")).await.unwrap();
    assert_eq!(tracked.tracking_number.as_deref(), Some("DHL1"));
    let entry = tracked.status_history.last().unwrap();
    assert_eq!((entry.status, entry.notes.as_str()), (OrderStatus::Pending, "Tracking number added: DHL1"));

    w.svc.cancel(&w.customer, order.id, None).await.unwrap();
    assert!(matches!(w.svc.update_tracking(&w.merchant, order.id, "DHL2", None).await, Err(CommerceError::Validation(_))));
}

#[tokio::test]
async fn test_visibility_and_listings() {
    let w = world().await;
    let a = w.product("A", dec!(10), 10).await;
    let b = w.product("B", dec!(30), 10).await;
    let stranger = w.second_customer("bob").await;

    let first = w.svc.create_order(&w.customer, cart(&[(&a, 2), (&b, 1)])).await.unwrap();
    let second = w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap();
    assert_ne!(first.order_number, second.order_number);
    assert!(first.order_number.starts_with("ORD-"));

    assert!(matches!(w.svc.get_order(&stranger, first.id).await, Err(CommerceError::NotFound(_))));
    assert!(matches!(w.svc.get_order(&Actor::merchant(Uuid::now_v7(), "other"), first.id).await, Err(CommerceError::NotFound(_))));
    assert!(w.svc.my_orders(&stranger).await.unwrap().is_empty());
    assert!(matches!(w.svc.my_orders(&w.merchant).await, Err(CommerceError::Forbidden(_))));
    assert!(matches!(w.svc.merchant_orders(&w.customer).await, Err(CommerceError::Forbidden(_))));

    let mine = w.svc.my_orders(&w.customer).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine[0].ordered_at >= mine[1].ordered_at);

    let merchant_view = w.svc.merchant_orders(&w.merchant).await.unwrap();
    let row = merchant_view.iter().find(|m| m.order.id == first.id).unwrap();
    assert_eq!(row.commission_rate, dec!(0.073));
    // 59.50 x 7.3%
    assert_eq!(row.commission_amount.amount(), dec!(4.34));
}

#[tokio::test]
async fn test_premium_commission() {
    let w = world().await;
    let mut shop = w.shop.clone();
    shop.subscription.tier = Tier::Premium;
    w.svc.store().insert_shop(shop).await;
    let a = w.product("A", dec!(100), 10).await;
    w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap();

    let rows = w.svc.merchant_orders(&w.merchant).await.unwrap();
    assert_eq!(rows[0].commission_rate, dec!(0.031));
    // 119.00 x 3.1%
    assert_eq!(rows[0].commission_amount.amount(), dec!(3.69));
}

#[tokio::test]
async fn test_referenced_product_is_protected() {
    let w = world().await;
    let a = w.product("A", dec!(10), 10).await;
    let unsold = w.product("B", dec!(10), 10).await;
    w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap();

    assert!(matches!(w.svc.delete_product(&w.merchant, a.id).await, Err(CommerceError::ProductInUse(_))));
    assert!(matches!(w.svc.delete_product(&w.customer, unsold.id).await, Err(CommerceError::Forbidden(_))));
    w.svc.delete_product(&w.merchant, unsold.id).await.unwrap();
    assert!(w.svc.store().product(unsold.id).await.is_none());
}

#[tokio::test]
async fn test_stale_tracking_does_not_reopen_cancelled_order() {
    let w = world().await;
    let a = w.product("A", dec!(10), 5).await;
    let order = w.svc.create_order(&w.customer, cart(&[(&a, 2)])).await.unwrap();
    let mut stale = w.svc.store().order(order.id).await.unwrap().unwrap();
    w.svc.cancel(&w.customer, order.id, None).await.unwrap();
    assert_eq!(w.stock(&a).await, 5);

    stale.set_tracking("DHL42", None, "mueller", Utc::now()).unwrap();
    assert!(matches!(w.svc.store().commit_tracking(&stale).await, Err(CommerceError::Validation(_))));
    let current = w.svc.get_order(&w.customer, order.id).await.unwrap();
    assert_eq!(current.status, OrderStatus::Cancelled);

    let err = w.svc.cancel(&w.customer, order.id, None).await.unwrap_err();
    assert!(matches!(err, CommerceError::InvalidTransition { from: OrderStatus::Cancelled, .. }));
    assert_eq!(w.stock(&a).await, 5);
}

#[tokio::test]
async fn test_accrual_waits_for_delivery() {
    let w = world().await;
    let a = w.product("A", dec!(100), 10).await;
    let order = w.svc.create_order(&w.customer, cart(&[(&a, 2)])).await.unwrap();

    let err = w.svc.accrue_loyalty(&order).await.unwrap_err();
    assert!(matches!(err, CommerceError::Validation(_)));
    w.svc.cancel(&w.customer, order.id, None).await.unwrap();
    assert_eq!(w.svc.loyalty_balance(&w.customer).await.unwrap().balance, 0);
    assert!(w.svc.loyalty_history(&w.customer).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_spend_is_tied_to_the_order() {
    let w = world().await;
    let bob = w.second_customer("bob").await;
    w.grant_tokens(&w.customer, 5).await;
    w.grant_tokens(&bob, 5).await;
    let a = w.product("A", dec!(20), 5).await;
    let order = w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap();

    let err = w.svc.spend_loyalty(bob.id, 3, &order).await.unwrap_err();
    assert!(matches!(err, CommerceError::Forbidden(_)));
    assert_eq!(w.svc.loyalty_balance(&bob).await.unwrap().balance, 5);

    let row = w.svc.spend_loyalty(w.customer.id, 3, &order).await.unwrap();
    assert_eq!(row.transaction_type, TransactionType::Spent);
    assert_eq!(row.amount, -3);
    assert_eq!(row.balance_after, 2);

    let stored = w.svc.get_order(&w.customer, order.id).await.unwrap();
    assert_eq!(stored.tokens_used, 3);
    assert_eq!(stored.tokens_value.amount(), dec!(3));
    // 28.79 before tokens
    assert_eq!(stored.total.amount(), dec!(25.79));
    assert!(reconciles(&stored));

    w.svc.cancel(&w.customer, order.id, None).await.unwrap();
    assert_eq!(w.svc.loyalty_balance(&w.customer).await.unwrap().balance, 5);
    assert_eq!(w.svc.loyalty_balance(&bob).await.unwrap().balance, 5);
}

#[tokio::test]
async fn test_spend_after_confirmation_is_rejected() {
    let w = world().await;
    w.grant_tokens(&w.customer, 5).await;
    let a = w.product("A", dec!(20), 5).await;
    let order = w.svc.create_order(&w.customer, cart(&[(&a, 1)])).await.unwrap();
    advance(&w, &order, &[OrderStatus::Confirmed]).await;

    let err = w.svc.spend_loyalty(w.customer.id, 2, &order).await.unwrap_err();
    assert!(matches!(err, CommerceError::Validation(_)));
    assert_eq!(w.svc.loyalty_balance(&w.customer).await.unwrap().balance, 5);
}
