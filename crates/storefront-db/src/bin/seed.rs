//! # Seed Data Generator
//!
//! Populates the database with test variants, stock and discounts for
//! development.
//!
//! ## Usage
//! ```bash
//! # Generate 500 variants (default)
//! cargo run -p storefront-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p storefront-db --bin seed -- --count 2000
//!
//! # Specify database path
//! cargo run -p storefront-db --bin seed -- --db ./data/storefront.db
//! ```
//!
//! ## Generated Data
//! - Variants across apparel/home/outdoor categories with unique SKUs
//!   (`{CATEGORY}-{INDEX}`), prices $4.99 - $99.99, weights in grams
//! - An inventory level at the default location per variant (0 - 50 units)
//! - A handful of discounts: SAVE10 (10% off order), TENOFF ($10 flat),
//!   FREESHIP (100% off shipping), and an expired code for testing

use std::env;
use storefront_core::{DiscountApplication, DiscountMethod, DiscountStatus, DEFAULT_LOCATION_ID};
use storefront_db::{Database, DbConfig};

/// Variant categories for realistic test data
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "APP",
        &[
            "Classic Tee",
            "Long Sleeve Tee",
            "Pocket Tee",
            "Hoodie",
            "Zip Hoodie",
            "Crewneck Sweatshirt",
            "Denim Jacket",
            "Rain Shell",
            "Beanie",
            "Trucker Cap",
            "Crew Socks",
            "Ankle Socks",
            "Canvas Belt",
            "Flannel Shirt",
            "Henley",
        ],
    ),
    (
        "HOM",
        &[
            "Ceramic Mug",
            "Enamel Mug",
            "Pint Glass",
            "Water Bottle",
            "Tumbler",
            "Throw Blanket",
            "Throw Pillow",
            "Scented Candle",
            "Coaster Set",
            "Cutting Board",
            "Tea Towel",
            "Apron",
            "Desk Mat",
            "Wall Print",
            "Notebook",
        ],
    ),
    (
        "OUT",
        &[
            "Daypack",
            "Duffel Bag",
            "Tote Bag",
            "Dry Sack",
            "Camp Chair",
            "Camp Mug",
            "Headlamp",
            "Carabiner Set",
            "Pocket Knife",
            "First Aid Kit",
            "Trekking Poles",
            "Sleeping Pad",
            "Cooler Sling",
            "Fire Starter",
            "Paracord Bracelet",
        ],
    ),
];

/// Size variants with price and weight addons
const SIZES: &[(&str, i64, i64)] = &[
    ("S", 0, 0),
    ("M", 0, 50),
    ("L", 200, 100),
    ("XL", 400, 150),
    ("One Size", 0, 0),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 500;
    let mut db_path = String::from("./storefront_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(500);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Storefront Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of variants to generate (default: 500)");
                println!("  -d, --db <PATH>    Database file path (default: ./storefront_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Storefront Seed Data Generator");
    println!("=================================");
    println!("Database: {}", db_path);
    println!("Variants: {}", count);
    println!();

    // Connect to database
    let config = DbConfig::new(&db_path);
    let db = Database::new(config).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Check existing variants
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM variants")
        .fetch_one(db.pool())
        .await?;
    if existing > 0 {
        println!("⚠ Database already has {} variants", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Generate variants with stock
    println!();
    println!("Generating variants...");

    let mut generated = 0;
    let start = std::time::Instant::now();

    'outer: for (category_idx, (category_code, titles)) in CATEGORIES.iter().enumerate() {
        for (title_idx, title) in titles.iter().enumerate() {
            for (size_idx, (size, price_addon, weight_addon)) in SIZES.iter().enumerate() {
                if generated >= count {
                    break 'outer;
                }

                let seed = category_idx * 1000 + title_idx * 10 + size_idx;
                let sku = format!("{}-{:04}", category_code, seed);
                let full_title = format!("{} ({})", title, size);

                // Price $4.99 - $99.99, weight 100g - 2kg
                let price_cents = 499 + ((seed * 131) % 9500) as i64 + price_addon;
                let grams = 100 + ((seed * 37) % 1800) as i64 + weight_addon;

                let variant = db
                    .catalog()
                    .insert(&full_title, &sku, price_cents, grams)
                    .await?;

                // Stock 0-50 at the default location
                let stock = ((seed * 7) % 51) as i64;
                db.inventory()
                    .set_level(&variant.id, DEFAULT_LOCATION_ID, stock)
                    .await?;

                generated += 1;

                if generated % 100 == 0 {
                    println!("  Generated {} variants...", generated);
                }
            }
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} variants in {:?}", generated, elapsed);

    // Discounts
    println!();
    println!("Creating discounts...");

    db.discounts()
        .insert(
            "SAVE10",
            DiscountApplication::Order,
            DiscountMethod::PercentOff,
            1000, // 10% in basis points
            DiscountStatus::Active,
            None,
            None,
        )
        .await?;
    println!("  SAVE10   10% off order");

    db.discounts()
        .insert(
            "TENOFF",
            DiscountApplication::Order,
            DiscountMethod::FlatRate,
            1000, // $10.00 in cents
            DiscountStatus::Active,
            None,
            None,
        )
        .await?;
    println!("  TENOFF   $10.00 off order");

    db.discounts()
        .insert(
            "FREESHIP",
            DiscountApplication::Shipping,
            DiscountMethod::PercentOff,
            10000, // 100%
            DiscountStatus::Active,
            None,
            None,
        )
        .await?;
    println!("  FREESHIP free shipping");

    db.discounts()
        .insert(
            "BYGONE",
            DiscountApplication::Order,
            DiscountMethod::PercentOff,
            2000,
            DiscountStatus::Expired,
            None,
            None,
        )
        .await?;
    println!("  BYGONE   expired (for testing rejection)");

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
