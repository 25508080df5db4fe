pub mod discount_codes;
pub mod order_events;
pub mod order_items;
pub mod orders;
pub mod payment_records;
pub mod processed_webhook_events;
pub mod product_metrics;
pub mod products;
pub mod size_variants;

pub use discount_codes::Entity as DiscountCodes;
pub use order_events::Entity as OrderEvents;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use payment_records::Entity as PaymentRecords;
pub use processed_webhook_events::Entity as ProcessedWebhookEvents;
pub use product_metrics::Entity as ProductMetrics;
pub use products::Entity as Products;
pub use size_variants::Entity as SizeVariants;
