use checkout_core::{
    config::AppConfig,
    db::{create_orm_conn, prepare_schema},
    entity::{
        discount_codes::{ActiveModel as DiscountActive, Column as DiscountCol},
        products::{ActiveModel as ProductActive, Column as ProductCol, Model as ProductModel},
        size_variants::ActiveModel as VariantActive,
        DiscountCodes, Products,
    },
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    // Ensure the schema exists.
    prepare_schema(&orm).await?;

    seed_products(&orm).await?;
    ensure_discount(&orm, "SAVE10", "percent", Some(10), None).await?;
    ensure_discount(&orm, "FIVEOFF", "fixed", None, Some(500)).await?;

    println!("Seed completed");
    Ok(())
}

async fn seed_products(orm: &DatabaseConnection) -> anyhow::Result<()> {
    let products = vec![
        ("Ferris Tee", 600, vec![("S", 20), ("M", 30), ("L", 25)]),
        ("Axum Hoodie", 5500, vec![("M", 10), ("L", 10), ("XL", 5)]),
        ("Rust Sticker Pack", 500, vec![]),
    ];

    for (name, price_cents, sizes) in products {
        let existing = Products::find()
            .filter(ProductCol::Name.eq(name))
            .one(orm)
            .await?;
        let product = match existing {
            Some(product) => product,
            None => {
                let product = insert_product(orm, name, price_cents).await?;
                for (label, stock) in sizes {
                    VariantActive {
                        id: Set(Uuid::new_v4()),
                        product_id: Set(product.id),
                        label: Set(label.to_string()),
                        stock: Set(stock),
                        created_at: Set(Utc::now().into()),
                    }
                    .insert(orm)
                    .await?;
                }
                product
            }
        };
        println!("Ensured product {name} ({})", product.id);
    }
    Ok(())
}

async fn insert_product(
    orm: &DatabaseConnection,
    name: &str,
    price_cents: i64,
) -> anyhow::Result<ProductModel> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        price_cents: Set(price_cents),
        active: Set(true),
        deleted_at: Set(None),
        created_at: Set(Utc::now().into()),
    }
    .insert(orm)
    .await?;
    Ok(product)
}

async fn ensure_discount(
    orm: &DatabaseConnection,
    code: &str,
    kind: &str,
    percent: Option<i32>,
    amount_cents: Option<i64>,
) -> anyhow::Result<()> {
    let exists = DiscountCodes::find()
        .filter(DiscountCol::Code.eq(code))
        .one(orm)
        .await?
        .is_some();
    if exists {
        return Ok(());
    }

    DiscountActive {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        kind: Set(kind.to_string()),
        percent: Set(percent),
        amount_cents: Set(amount_cents),
        active: Set(true),
        expires_at: Set(None),
        max_uses: Set(None),
        used_count: Set(0),
        created_at: Set(Utc::now().into()),
    }
    .insert(orm)
    .await?;
    println!("Ensured discount {code}");
    Ok(())
}
