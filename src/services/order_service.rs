use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::{
        checkout::{CartLine, RateQuoteResponse},
        orders::OrderWithItems,
    },
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        payment_records::{Column as PaymentCol, Entity as PaymentRecords},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        size_variants::{Column as VariantCol, Entity as SizeVariants, Model as VariantModel},
    },
    error::{AppError, AppResult},
    models::{Address, OrderEventKind, OrderStatus},
    services::{
        discount_service::{self, AppliedDiscount},
        inventory_ledger,
        order_events,
        rate_calculator::{self, Destination, RateInput, RateQuote},
    },
    state::AppState,
};

/// Who the cart belongs to. Idempotency keys are scoped to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(Uuid),
    Guest(String),
}

impl CartOwner {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            CartOwner::User(id) => Some(*id),
            CartOwner::Guest(_) => None,
        }
    }

    fn scope(&self) -> String {
        match self {
            CartOwner::User(id) => format!("user:{id}"),
            CartOwner::Guest(session) => format!("guest:{session}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CartSnapshot {
    pub owner: CartOwner,
    pub lines: Vec<CartLine>,
}

#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub cart: CartSnapshot,
    pub email: String,
    pub shipping_address: Address,
    pub discount_code: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
    /// An earlier order with the same idempotency key was returned.
    pub replayed: bool,
}

/// A cart line checked against current catalog state and priced.
struct LockedLine {
    product_id: Uuid,
    variant: Option<VariantModel>,
    size: Option<String>,
    quantity: i32,
    unit_price_cents: i64,
}

impl LockedLine {
    fn line_total(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

pub fn destination_of(address: &Address) -> Destination {
    Destination {
        country: address.country.clone(),
        region: address.region.clone(),
        postal_code: address.postal_code.clone(),
    }
}

/// Turn a cart into a PENDING order: reserve stock, price, apply discount and
/// persist, all in one transaction. Any failure leaves no trace.
pub async fn create_order(state: &AppState, input: CreateOrder) -> AppResult<CreatedOrder> {
    let started = Instant::now();

    let scoped_key = input
        .idempotency_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| format!("{}:{}", input.cart.owner.scope(), k));

    if let Some(key) = &scoped_key {
        if let Some(existing) = find_by_idempotency_key(&state.orm, key).await? {
            tracing::info!(order_id = %existing.order.id, "checkout replayed from idempotency key");
            return Ok(existing);
        }
    }

    match build_order(state, &input, scoped_key.clone()).await {
        Ok(created) => {
            state.telemetry.order_created(started.elapsed());
            tracing::info!(
                order_id = %created.order.id,
                total_cents = created.order.total_cents,
                lines = created.items.len(),
                "order created"
            );
            Ok(created)
        }
        // A concurrent request with the same key committed first.
        Err(AppError::OrmError(err)) if scoped_key.is_some() && is_unique_violation(&err) => {
            let key = scoped_key.as_deref().unwrap_or_default();
            match find_by_idempotency_key(&state.orm, key).await? {
                Some(existing) => Ok(existing),
                None => Err(AppError::OrmError(err)),
            }
        }
        Err(err) => {
            state.telemetry.order_rejected(err.code());
            Err(err)
        }
    }
}

async fn build_order(
    state: &AppState,
    input: &CreateOrder,
    idempotency_key: Option<String>,
) -> AppResult<CreatedOrder> {
    let lines = &input.cart.lines;
    validate_lines(lines)?;

    let txn = state.orm.begin().await?;
    let now = Utc::now();

    let locked = lock_lines(&txn, lines).await?;

    for line in &locked {
        if let Some(variant) = &line.variant {
            if !inventory_ledger::reserve(&txn, variant.id, line.quantity).await? {
                // Dropping `txn` rolls back reservations made for earlier lines.
                return Err(AppError::OutOfStock {
                    product_id: line.product_id,
                    variant_id: Some(variant.id),
                    size: line.size.clone(),
                    requested: line.quantity,
                });
            }
        }
    }

    let subtotal_cents: i64 = locked.iter().map(LockedLine::line_total).sum();

    let discount = match non_blank(input.discount_code.as_deref()) {
        Some(code) => {
            let applied = discount_service::validate(&txn, code, subtotal_cents, now).await?;
            discount_service::redeem(&txn, &applied).await?;
            Some(applied)
        }
        None => None,
    };
    let discount_cents = discount.as_ref().map(|d| d.amount_cents).unwrap_or(0);

    let item_count: i64 = locked.iter().map(|l| i64::from(l.quantity)).sum();
    let destination = destination_of(&input.shipping_address);
    let rates: RateQuote = rate_calculator::quote(
        &state.rates,
        &RateInput {
            subtotal_cents,
            item_count,
            destination: &destination,
            currency: &state.settings.currency,
        },
    );

    let total_cents = subtotal_cents - discount_cents + rates.tax_cents + rates.shipping_cents;
    if total_cents < 0 {
        return Err(AppError::Internal(anyhow::anyhow!(
            "negative order total {total_cents}"
        )));
    }

    let shipping_address = serde_json::to_value(&input.shipping_address)
        .map_err(|e| AppError::Internal(e.into()))?;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(input.cart.owner.user_id()),
        idempotency_key: Set(idempotency_key),
        status: Set(OrderStatus::Pending.as_str().to_string()),
        subtotal_cents: Set(subtotal_cents),
        discount_cents: Set(discount_cents),
        tax_cents: Set(rates.tax_cents),
        shipping_cents: Set(rates.shipping_cents),
        total_cents: Set(total_cents),
        currency: Set(state.settings.currency.clone()),
        email: Set(input.email.trim().to_string()),
        discount_code: Set(discount.as_ref().map(|d| d.code.clone())),
        shipping_address: Set(shipping_address),
        payment_attempts: Set(0),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        paid_at: Set(None),
        cancelled_at: Set(None),
        shipped_at: Set(None),
    }
    .insert(&txn)
    .await?;

    let mut items = Vec::with_capacity(locked.len());
    for line in &locked {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            variant_id: Set(line.variant.as_ref().map(|v| v.id)),
            size: Set(line.size.clone()),
            quantity: Set(line.quantity),
            unit_price_cents: Set(line.unit_price_cents),
            line_total_cents: Set(line.line_total()),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;
        items.push(item);
    }

    if let Some(applied) = &discount {
        record_discount(&txn, order.id, applied).await?;
    }

    order_events::append(
        &txn,
        order.id,
        OrderEventKind::OrderCreated,
        Some("order created from cart"),
        Some(serde_json::json!({
            "subtotal_cents": subtotal_cents,
            "discount_cents": discount_cents,
            "tax_cents": rates.tax_cents,
            "shipping_cents": rates.shipping_cents,
            "total_cents": total_cents,
            "rates": rates.breakdown,
            "lines": items.len(),
        })),
    )
    .await?;

    txn.commit().await?;

    Ok(CreatedOrder {
        order,
        items,
        replayed: false,
    })
}

/// Price a cart the same way checkout will, without reserving stock or
/// redeeming the discount code.
pub async fn quote_cart(
    state: &AppState,
    lines: &[CartLine],
    destination: &Destination,
    discount_code: Option<&str>,
) -> AppResult<RateQuoteResponse> {
    validate_lines(lines)?;
    let locked = lock_lines(&state.orm, lines).await?;
    let subtotal_cents: i64 = locked.iter().map(LockedLine::line_total).sum();
    let item_count: i64 = locked.iter().map(|l| i64::from(l.quantity)).sum();

    let discount_cents = match non_blank(discount_code) {
        Some(code) => {
            discount_service::validate(&state.orm, code, subtotal_cents, Utc::now())
                .await?
                .amount_cents
        }
        None => 0,
    };

    let quote = rate_calculator::quote(
        &state.rates,
        &RateInput {
            subtotal_cents,
            item_count,
            destination,
            currency: &state.settings.currency,
        },
    );
    Ok(RateQuoteResponse {
        subtotal_cents,
        discount_cents,
        total_cents: subtotal_cents - discount_cents + quote.tax_cents + quote.shipping_cents,
        quote,
    })
}

fn validate_lines(lines: &[CartLine]) -> AppResult<()> {
    if lines.is_empty() {
        return Err(AppError::EmptyCart);
    }
    if let Some(line) = lines.iter().find(|l| l.quantity <= 0) {
        return Err(AppError::BadRequest(format!(
            "quantity for product {} must be at least 1",
            line.product_id
        )));
    }
    Ok(())
}

fn non_blank(code: Option<&str>) -> Option<&str> {
    code.filter(|c| !c.trim().is_empty())
}

/// Re-read every product and variant inside the transaction and lock the price.
async fn lock_lines<C: ConnectionTrait>(txn: &C, lines: &[CartLine]) -> AppResult<Vec<LockedLine>> {
    let product_ids: BTreeSet<Uuid> = lines.iter().map(|l| l.product_id).collect();
    let products: HashMap<Uuid, ProductModel> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut locked = Vec::with_capacity(lines.len());
    for line in lines {
        let product = match products.get(&line.product_id) {
            Some(p) if p.is_sellable() => p,
            Some(_) => {
                return Err(AppError::ProductUnavailable {
                    product_id: line.product_id,
                    reason: "no longer sold".into(),
                });
            }
            None => {
                return Err(AppError::ProductUnavailable {
                    product_id: line.product_id,
                    reason: "does not exist".into(),
                });
            }
        };

        let size = line
            .size
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let variant = match &size {
            Some(label) => {
                let variant = SizeVariants::find()
                    .filter(VariantCol::ProductId.eq(product.id))
                    .filter(VariantCol::Label.eq(label.clone()))
                    .one(txn)
                    .await?
                    .ok_or_else(|| AppError::ProductUnavailable {
                        product_id: product.id,
                        reason: format!("size {label} is not offered"),
                    })?;
                Some(variant)
            }
            None => None,
        };

        if let Some(seen) = line.price_cents_snapshot {
            if seen != product.price_cents {
                tracing::info!(
                    product_id = %product.id,
                    seen,
                    current = product.price_cents,
                    "price changed since cart snapshot"
                );
            }
        }

        locked.push(LockedLine {
            product_id: product.id,
            variant,
            size,
            quantity: line.quantity,
            unit_price_cents: product.price_cents,
        });
    }
    Ok(locked)
}

async fn record_discount(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    applied: &AppliedDiscount,
) -> AppResult<()> {
    order_events::append(
        txn,
        order_id,
        OrderEventKind::DiscountApplied,
        Some("discount code applied"),
        Some(serde_json::json!({
            "code": applied.code,
            "kind": applied.kind,
            "amount_cents": applied.amount_cents,
        })),
    )
    .await?;
    Ok(())
}

async fn find_by_idempotency_key(
    conn: &DatabaseConnection,
    key: &str,
) -> AppResult<Option<CreatedOrder>> {
    let Some(order) = Orders::find()
        .filter(OrderCol::IdempotencyKey.eq(key))
        .one(conn)
        .await?
    else {
        return Ok(None);
    };
    let items = items_of(conn, order.id).await?;
    Ok(Some(CreatedOrder {
        order,
        items,
        replayed: true,
    }))
}

async fn items_of(conn: &DatabaseConnection, order_id: Uuid) -> AppResult<Vec<OrderItemModel>> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(conn)
        .await?;
    Ok(items)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

pub async fn get_order(state: &AppState, id: Uuid) -> AppResult<OrderWithItems> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = items_of(&state.orm, order.id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    let payments = PaymentRecords::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .order_by_asc(PaymentCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(OrderWithItems {
        order: order.into(),
        items,
        payments,
    })
}

pub async fn get_timeline(state: &AppState, id: Uuid) -> AppResult<Vec<crate::models::OrderEvent>> {
    if Orders::find_by_id(id).one(&state.orm).await?.is_none() {
        return Err(AppError::NotFound);
    }
    let events = order_events::timeline(&state.orm, id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(events)
}
