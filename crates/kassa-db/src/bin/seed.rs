//! # Seed Data Generator
//!
//! Populates a database with a demo shop for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p kassa-db --bin seed
//!
//! # Specify database path
//! cargo run -p kassa-db --bin seed -- --db ./data/kassa.db
//!
//! # Configure the tax rate of the demo business
//! cargo run -p kassa-db --bin seed -- --tax-rate 18 --no-tax
//! ```
//!
//! ## Generated Data
//! - One business and one cashier
//! - A tax configuration (18% unless told otherwise)
//! - A small catalog, taxable and non-taxable, with opening stock
//!
//! The generated ids are printed so they can be fed to `sell`.

use chrono::Utc;
use kassa_core::{Business, Money, Product, User};
use kassa_db::{Database, DbConfig};
use rust_decimal::Decimal;
use std::env;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Demo catalog: (reference, name, TTC price, taxable, opening stock)
const CATALOG: &[(&str, &str, &str, bool, i64)] = &[
    ("RIZ-25", "Riz brisé 25kg", "17700", true, 40),
    ("HUI-1L", "Huile végétale 1L", "1180", true, 120),
    ("SUC-1K", "Sucre en poudre 1kg", "850", true, 200),
    ("PAIN", "Pain", "150", false, 300),
    ("LAIT-CAI", "Lait caillé 500g", "500", false, 60),
    ("SAV-200", "Savon de Marseille 200g", "354", true, 0),
    ("CAFE-TBA", "Café Touba 250g", "1475.50", true, 35),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./kassa_dev.db");
    let mut tax_rate: Decimal = Decimal::new(18, 0);
    let mut tax_enabled = true;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--tax-rate" | "-t" => {
                if i + 1 < args.len() {
                    tax_rate = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--no-tax" => tax_enabled = false,
            "--help" | "-h" => {
                println!("Kassa Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file path (default: ./kassa_dev.db)");
                println!("  -t, --tax-rate <PCT>   Tax rate percentage (default: 18)");
                println!("      --no-tax           Store the tax configuration as disabled");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            other => {
                eprintln!("Ignoring unknown argument '{}'", other);
            }
        }
        i += 1;
    }

    println!("Kassa Seed Data Generator");
    println!("=========================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database, migrations applied");

    let now = Utc::now();

    let business = Business {
        id: Uuid::new_v4().to_string(),
        name: "Boutique Keur Kassa".to_string(),
        created_at: now,
        deleted_at: None,
    };
    db.businesses().insert(&business).await?;

    let cashier = User {
        id: Uuid::new_v4().to_string(),
        business_id: business.id.clone(),
        name: "Caissier principal".to_string(),
        email: Some("caisse@kassa.example".to_string()),
        created_at: now,
        deleted_at: None,
    };
    db.users().insert(&cashier).await?;

    db.tax_configs()
        .upsert(&business.id, tax_enabled, tax_rate)
        .await?;

    println!("✓ Business  {}", business.id);
    println!("✓ Cashier   {}", cashier.id);
    println!(
        "✓ Tax       {}% ({})",
        tax_rate,
        if tax_enabled { "enabled" } else { "disabled" }
    );
    println!();
    println!("Products:");

    for (reference, name, price, taxable, opening) in CATALOG {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            business_id: business.id.clone(),
            name: name.to_string(),
            reference: reference.to_string(),
            unit_price: price.parse::<Money>()?,
            taxable: *taxable,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        db.products().insert(&product).await?;
        db.ledger().open_stock(&product.id, *opening).await?;

        println!(
            "  {}  {:<10} {:>9} {:<4} stock {:>4}  {}",
            product.id,
            reference,
            price,
            if *taxable { "TTC" } else { "" },
            opening,
            name
        );
    }

    println!();
    println!("✓ Seed complete!");
    println!();
    println!(
        "Try: cargo run -p kassa-sales --bin sell -- --business {} --cashier {} <product-id>:<qty>",
        business.id, cashier.id
    );

    db.close().await;
    Ok(())
}
