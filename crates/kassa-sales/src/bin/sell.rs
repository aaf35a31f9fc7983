//! # One-shot Sale
//!
//! Records a single sale from the command line and issues its receipt.
//!
//! ## Usage
//! ```bash
//! cargo run -p kassa-sales --bin sell -- \
//!     --business <BUSINESS_ID> --cashier <USER_ID> \
//!     <PRODUCT_ID>:2 <PRODUCT_ID>:1
//!
//! # Pay by mobile money, send the receipt to a customer
//! cargo run -p kassa-sales --bin sell -- --method mobile-money \
//!     --email client@shop.sn --business … --cashier … <PRODUCT_ID>:1
//! ```
//!
//! The committed sale is printed as JSON on stdout. Refusals are printed as
//! `{"code": …, "message": …}` and exit with status 1.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use kassa_core::{CartLine, PaymentMethod};
use kassa_db::Database;
use kassa_sales::telemetry::init_tracing;
use kassa_sales::{
    CreateSaleRequest, Notifier, ReceiptIssuer, ReceiptWorker, SaleService, SalesConfig,
    TracingNotifier,
};

fn print_help() {
    println!("Kassa One-shot Sale");
    println!();
    println!("Usage: sell [OPTIONS] --business <ID> --cashier <ID> <PRODUCT_ID:QTY>...");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>    Config file (default: platform config dir/kassa.toml)");
    println!("  -d, --db <PATH>        Database file, overrides the config");
    println!("  -b, --business <ID>    Business selling");
    println!("  -u, --cashier <ID>     Cashier recording the sale");
    println!("  -m, --method <METHOD>  cash | card | mobile-money | bank-transfer | cheque");
    println!("      --email <EMAIL>    Customer email");
    println!("      --phone <PHONE>    Customer phone");
    println!("  -h, --help             Show this help message");
}

fn parse_line(arg: &str) -> Result<CartLine, String> {
    let (product_id, qty) = arg
        .rsplit_once(':')
        .ok_or_else(|| format!("expected <product-id>:<qty>, got '{}'", arg))?;
    let quantity = qty
        .parse::<i64>()
        .map_err(|e| format!("bad quantity in '{}': {}", arg, e))?;
    Ok(CartLine::new(product_id, quantity))
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;
    let mut request = CreateSaleRequest::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--config" | "-c" => {
                config_path = value.map(PathBuf::from);
                i += 1;
            }
            "--db" | "-d" => {
                db_path = value.map(PathBuf::from);
                i += 1;
            }
            "--business" | "-b" => {
                request.business_id = value.unwrap_or_default();
                i += 1;
            }
            "--cashier" | "-u" => {
                request.cashier_id = value.unwrap_or_default();
                i += 1;
            }
            "--method" | "-m" => {
                let raw = value.unwrap_or_default();
                request.payment_method = Some(raw.parse::<PaymentMethod>()?);
                i += 1;
            }
            "--email" => {
                request.customer_email = value;
                i += 1;
            }
            "--phone" => {
                request.customer_phone = value;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(ExitCode::SUCCESS);
            }
            other => request.lines.push(parse_line(other)?),
        }
        i += 1;
    }

    let mut config = SalesConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    let db = Database::new(config.db_config()).await?;

    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let issuer = Arc::new(ReceiptIssuer::local(
        db.clone(),
        &config.receipts.storage_dir,
        config.receipts.base_url.clone(),
    ));
    let (mut worker, queue) = ReceiptWorker::new(
        issuer,
        db.receipt_jobs(),
        notifier.clone(),
        config.receipts.clone(),
    );

    let service = SaleService::new(db.clone(), config.sale_policy()?)
        .with_receipts(queue)
        .with_notifier(notifier);

    let completed = match service.create_sale(request).await {
        Ok(completed) => completed,
        Err(e) => {
            let body = serde_json::json!({
                "code": e.code(),
                "message": e.public_message(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            db.close().await;
            return Ok(ExitCode::FAILURE);
        }
    };

    let summary = worker.drain().await;
    if summary.failed > 0 {
        eprintln!("Receipt not issued yet; it will be retried by the receipt worker.");
    }

    // Re-read so the output carries the receipt URL when it was attached.
    let sale = service.get_sale(&completed.sale.id).await?;
    println!("{}", serde_json::to_string_pretty(&sale)?);

    db.close().await;
    Ok(ExitCode::SUCCESS)
}
