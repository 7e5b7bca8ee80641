//! Demo catalog used to seed an empty store.

use chrono::{DateTime, Duration, Utc};
use ledger::NewProduct;

const DEMO_PRODUCTS: &[(&str, &str, i64, i64)] = &[
    (
        "Flash Sneakers",
        "Limited edition sneakers for flash sale.",
        9999,
        100,
    ),
    (
        "Pro Headphones",
        "High quality noise-cancelling headphones.",
        14999,
        50,
    ),
    (
        "iPhone 15 Pro Max",
        "Latest flagship smartphone with titanium design and A17 Pro chip.",
        119999,
        100,
    ),
    (
        "PlayStation 5 Pro",
        "Next-gen console with 4K gaming, ray tracing and ultra-fast SSD.",
        69999,
        200,
    ),
    (
        "Sony WH-1000XM5 Headphones",
        "Industry-leading noise cancelling wireless headphones.",
        34999,
        50,
    ),
    (
        "MacBook Pro 16\"",
        "Powerful laptop with M-series chip, perfect for pros.",
        249999,
        30,
    ),
];

/// Demo products whose sale opened five minutes before `now` and runs for
/// four more days.
pub fn demo_products(now: DateTime<Utc>) -> Vec<NewProduct> {
    let sale_starts_at = now - Duration::minutes(5);
    let sale_ends_at = now + Duration::days(4);

    DEMO_PRODUCTS
        .iter()
        .map(|&(name, description, price_cents, initial_stock)| NewProduct {
            name: name.to_string(),
            description: Some(description.to_string()),
            price_cents,
            initial_stock,
            sale_starts_at,
            sale_ends_at,
        })
        .collect()
}
