mod common;

use axum::{Json, extract::State};
use checkout_core::{
    dto::checkout::RateQuoteRequest,
    entity::{DiscountCodes, Orders, discount_codes::Column as DiscountCol},
    error::AppError,
    models::{Order, OrderEventKind, OrderStatus},
    services::{
        inventory_ledger,
        order_events,
        order_service::{self, CartOwner},
    },
    routes::rates,
};
use common::{guest_order, line, place_order, seed_percent_discount, seed_product, setup};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tokio::task::JoinSet;

#[tokio::test]
async fn california_order_prices_tax_and_shipping() -> anyhow::Result<()> {
    let app = setup().await?;
    let (tee, variants) = seed_product(&app.state, "Tee", 600, &[("M", 5)]).await?;

    let created = place_order(&app.state, vec![line(tee.id, Some("M"), 2)]).await?;
    let order = &created.order;

    assert_eq!(order.status, OrderStatus::Pending.as_str());
    assert_eq!(order.subtotal_cents, 1200);
    assert_eq!(order.tax_cents, 87);
    assert_eq!(order.shipping_cents, 799);
    assert_eq!(order.total_cents, 2086);
    assert!(Order::from(order.clone()).totals_consistent());

    assert_eq!(created.items.len(), 1);
    assert_eq!(created.items[0].unit_price_cents, 600);
    assert_eq!(created.items[0].line_total_cents, 1200);
    assert_eq!(
        inventory_ledger::stock_of(&app.state.orm, variants[0].id).await?,
        Some(3)
    );

    let created_events =
        order_events::count_kind(&app.state.orm, order.id, OrderEventKind::OrderCreated).await?;
    assert_eq!(created_events, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell_last_unit() -> anyhow::Result<()> {
    const SHOPPERS: usize = 6;
    let app = setup().await?;
    let (tee, variants) = seed_product(&app.state, "Tee", 600, &[("S", 1)]).await?;

    // The in-memory pool holds a single connection, so these tasks interleave
    // at await points rather than inside the database. The guard under test is
    // the conditional decrement, which holds either way.
    let mut shoppers = JoinSet::new();
    for _ in 0..SHOPPERS {
        let state = app.state.clone();
        let input = guest_order(vec![line(tee.id, Some("S"), 1)]);
        shoppers.spawn(async move { order_service::create_order(&state, input).await });
    }
    let outcomes = shoppers.join_all().await;

    let placed = outcomes.iter().filter(|r| r.is_ok()).count();
    let rejected = outcomes
        .iter()
        .filter(|r| matches!(r, Err(AppError::OutOfStock { .. })))
        .count();
    assert_eq!(placed, 1);
    assert_eq!(rejected, SHOPPERS - 1);

    assert_eq!(
        inventory_ledger::stock_of(&app.state.orm, variants[0].id).await?,
        Some(0)
    );
    assert_eq!(Orders::find().count(&app.state.orm).await?, 1);
    Ok(())
}

#[tokio::test]
async fn replayed_idempotency_key_returns_original_order() -> anyhow::Result<()> {
    let app = setup().await?;
    let (tee, variants) = seed_product(&app.state, "Tee", 600, &[("M", 5)]).await?;

    let mut input = guest_order(vec![line(tee.id, Some("M"), 1)]);
    input.idempotency_key = Some("cart-42".into());

    let first = order_service::create_order(&app.state, input.clone()).await?;
    let second = order_service::create_order(&app.state, input).await?;

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.order.id, second.order.id);
    assert_eq!(Orders::find().count(&app.state.orm).await?, 1);
    assert_eq!(
        inventory_ledger::stock_of(&app.state.orm, variants[0].id).await?,
        Some(4)
    );
    Ok(())
}

#[tokio::test]
async fn idempotency_keys_are_scoped_to_the_cart_owner() -> anyhow::Result<()> {
    let app = setup().await?;
    let (tee, _) = seed_product(&app.state, "Tee", 600, &[("M", 5)]).await?;

    let mut mine = guest_order(vec![line(tee.id, Some("M"), 1)]);
    mine.idempotency_key = Some("same-key".into());
    let mut theirs = mine.clone();
    theirs.cart.owner = CartOwner::Guest("session-2".into());

    let a = order_service::create_order(&app.state, mine).await?;
    let b = order_service::create_order(&app.state, theirs).await?;
    assert_ne!(a.order.id, b.order.id);
    assert!(!b.replayed);
    Ok(())
}

#[tokio::test]
async fn failed_line_rolls_back_earlier_reservations() -> anyhow::Result<()> {
    let app = setup().await?;
    let (tee, tee_sizes) = seed_product(&app.state, "Tee", 600, &[("M", 5)]).await?;
    let (hoodie, hoodie_sizes) = seed_product(&app.state, "Hoodie", 5500, &[("L", 2)]).await?;

    let result = place_order(
        &app.state,
        vec![line(tee.id, Some("M"), 1), line(hoodie.id, Some("L"), 3)],
    )
    .await;

    let err = result.expect_err("hoodie is short on stock");
    match err.downcast_ref::<AppError>() {
        Some(AppError::OutOfStock {
            product_id,
            requested,
            ..
        }) => {
            assert_eq!(*product_id, hoodie.id);
            assert_eq!(*requested, 3);
        }
        other => panic!("expected OutOfStock, got {other:?}"),
    }

    assert_eq!(
        inventory_ledger::stock_of(&app.state.orm, tee_sizes[0].id).await?,
        Some(5)
    );
    assert_eq!(
        inventory_ledger::stock_of(&app.state.orm, hoodie_sizes[0].id).await?,
        Some(2)
    );
    assert_eq!(Orders::find().count(&app.state.orm).await?, 0);
    Ok(())
}

#[tokio::test]
async fn empty_cart_is_rejected() -> anyhow::Result<()> {
    let app = setup().await?;
    let result = order_service::create_order(&app.state, guest_order(vec![])).await;
    assert!(matches!(result, Err(AppError::EmptyCart)));
    Ok(())
}

#[tokio::test]
async fn inactive_product_cannot_be_ordered() -> anyhow::Result<()> {
    use checkout_core::entity::products::ActiveModel as ProductActive;
    use sea_orm::{ActiveModelTrait, Set};

    let app = setup().await?;
    let (tee, variants) = seed_product(&app.state, "Tee", 600, &[("M", 5)]).await?;
    let mut retired: ProductActive = tee.clone().into();
    retired.active = Set(false);
    retired.update(&app.state.orm).await?;

    let result =
        order_service::create_order(&app.state, guest_order(vec![line(tee.id, Some("M"), 1)]))
            .await;
    assert!(matches!(
        result,
        Err(AppError::ProductUnavailable { product_id, .. }) if product_id == tee.id
    ));
    assert_eq!(
        inventory_ledger::stock_of(&app.state.orm, variants[0].id).await?,
        Some(5)
    );
    Ok(())
}

#[tokio::test]
async fn discount_code_reduces_total_and_is_logged() -> anyhow::Result<()> {
    let app = setup().await?;
    let (tee, _) = seed_product(&app.state, "Tee", 600, &[("M", 5)]).await?;
    seed_percent_discount(&app.state, "SAVE10", 10, None).await?;

    let mut input = guest_order(vec![line(tee.id, Some("M"), 2)]);
    input.discount_code = Some("save10".into());
    let created = order_service::create_order(&app.state, input).await?;
    let order = created.order;

    assert_eq!(order.discount_cents, 120);
    assert_eq!(order.discount_code.as_deref(), Some("SAVE10"));
    assert_eq!(order.total_cents, 1200 - 120 + 87 + 799);
    assert!(Order::from(order.clone()).totals_consistent());

    let timeline = order_events::timeline(&app.state.orm, order.id).await?;
    let kinds: Vec<&str> = timeline.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, vec!["DISCOUNT_APPLIED", "ORDER_CREATED"]);

    let code = DiscountCodes::find()
        .filter(DiscountCol::Code.eq("SAVE10"))
        .one(&app.state.orm)
        .await?
        .expect("discount row");
    assert_eq!(code.used_count, 1);
    Ok(())
}

#[tokio::test]
async fn exhausted_discount_rejects_checkout_without_reserving() -> anyhow::Result<()> {
    let app = setup().await?;
    let (tee, variants) = seed_product(&app.state, "Tee", 600, &[("M", 5)]).await?;
    seed_percent_discount(&app.state, "ONCE", 50, Some(1)).await?;

    let mut first = guest_order(vec![line(tee.id, Some("M"), 1)]);
    first.discount_code = Some("ONCE".into());
    order_service::create_order(&app.state, first.clone()).await?;

    let second = order_service::create_order(&app.state, first).await;
    assert!(matches!(second, Err(AppError::InvalidDiscount(_))));
    assert_eq!(
        inventory_ledger::stock_of(&app.state.orm, variants[0].id).await?,
        Some(4)
    );
    Ok(())
}

#[tokio::test]
async fn save10_takes_ten_percent_off_fifty_dollars() -> anyhow::Result<()> {
    let app = setup().await?;
    let (hoodie, _) = seed_product(&app.state, "Hoodie", 2500, &[("L", 5)]).await?;
    seed_percent_discount(&app.state, "SAVE10", 10, None).await?;

    let mut input = guest_order(vec![line(hoodie.id, Some("L"), 2)]);
    input.discount_code = Some("SAVE10".into());
    let order = order_service::create_order(&app.state, input).await?.order;

    assert_eq!(order.subtotal_cents, 5000);
    assert_eq!(order.discount_cents, 500);
    assert!(Order::from(order.clone()).totals_consistent());

    let applied: Vec<_> = order_events::timeline(&app.state.orm, order.id)
        .await?
        .into_iter()
        .filter(|e| e.kind == OrderEventKind::DiscountApplied.as_str())
        .collect();
    assert_eq!(applied.len(), 1);
    let meta = applied[0].meta.clone().expect("discount meta");
    assert_eq!(meta["code"], "SAVE10");
    assert_eq!(meta["amount_cents"], 500);
    Ok(())
}

#[tokio::test]
async fn quote_matches_what_checkout_charges() -> anyhow::Result<()> {
    let app = setup().await?;
    let (tee, _) = seed_product(&app.state, "Tee", 600, &[("M", 5)]).await?;
    let lines = vec![line(tee.id, Some("M"), 2)];

    let quote = order_service::quote_cart(
        &app.state,
        &lines,
        &order_service::destination_of(&common::california()),
        None,
    )
    .await?;
    let created = place_order(&app.state, lines).await?;

    assert_eq!(quote.subtotal_cents, created.order.subtotal_cents);
    assert_eq!(quote.discount_cents, 0);
    assert_eq!(quote.quote.tax_cents, created.order.tax_cents);
    assert_eq!(quote.quote.shipping_cents, created.order.shipping_cents);
    assert_eq!(quote.total_cents, created.order.total_cents);
    Ok(())
}

#[tokio::test]
async fn quote_with_discount_matches_checkout_without_redeeming() -> anyhow::Result<()> {
    let app = setup().await?;
    let (hoodie, variants) = seed_product(&app.state, "Hoodie", 2500, &[("L", 5)]).await?;
    seed_percent_discount(&app.state, "SAVE10", 10, Some(1)).await?;
    let lines = vec![line(hoodie.id, Some("L"), 2)];

    let quote = order_service::quote_cart(
        &app.state,
        &lines,
        &order_service::destination_of(&common::california()),
        Some("save10"),
    )
    .await?;
    assert_eq!(quote.discount_cents, 500);

    let code = DiscountCodes::find()
        .filter(DiscountCol::Code.eq("SAVE10"))
        .one(&app.state.orm)
        .await?
        .expect("discount row");
    assert_eq!(code.used_count, 0);
    assert_eq!(
        inventory_ledger::stock_of(&app.state.orm, variants[0].id).await?,
        Some(5)
    );

    // A single-use code is still available to the checkout that follows.
    let mut input = guest_order(lines);
    input.discount_code = Some("SAVE10".into());
    let order = order_service::create_order(&app.state, input).await?.order;
    assert_eq!(quote.discount_cents, order.discount_cents);
    assert_eq!(quote.quote.tax_cents, order.tax_cents);
    assert_eq!(quote.total_cents, order.total_cents);
    Ok(())
}

#[tokio::test]
async fn quote_rejects_unknown_discount_code() -> anyhow::Result<()> {
    let app = setup().await?;
    let (tee, _) = seed_product(&app.state, "Tee", 600, &[("M", 5)]).await?;

    let result = order_service::quote_cart(
        &app.state,
        &[line(tee.id, Some("M"), 1)],
        &order_service::destination_of(&common::california()),
        Some("NOPE"),
    )
    .await;
    assert!(matches!(result, Err(AppError::InvalidDiscount(_))));
    Ok(())
}

#[tokio::test]
async fn quote_rejects_non_positive_quantity() -> anyhow::Result<()> {
    let app = setup().await?;
    let (tee, _) = seed_product(&app.state, "Tee", 600, &[("M", 5)]).await?;
    let destination = order_service::destination_of(&common::california());

    for quantity in [0, -3] {
        let result =
            order_service::quote_cart(&app.state, &[line(tee.id, Some("M"), quantity)], &destination, None)
                .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))), "quantity {quantity}");
    }
    Ok(())
}

#[tokio::test]
async fn quote_is_always_priced_in_store_currency() -> anyhow::Result<()> {
    let app = setup().await?;
    let (tee, _) = seed_product(&app.state, "Tee", 600, &[("M", 5)]).await?;

    // A client-supplied currency is not part of the request and cannot
    // switch the quote to tax-inclusive pricing.
    let request: RateQuoteRequest = serde_json::from_value(serde_json::json!({
        "lines": [{ "product_id": tee.id, "size": "M", "quantity": 2 }],
        "destination": { "country": "US", "region": "CA", "postal_code": "94105" },
        "currency": "eur"
    }))?;
    let response = rates::quote(State(app.state.clone()), Json(request)).await?;
    let quote = response.0.data.expect("quote data");

    let created = place_order(&app.state, vec![line(tee.id, Some("M"), 2)]).await?;
    assert_eq!(created.order.currency, "usd");
    assert!(!quote.quote.breakdown.tax_inclusive);
    assert_eq!(quote.quote.tax_cents, created.order.tax_cents);
    assert_eq!(quote.total_cents, created.order.total_cents);
    Ok(())
}
