//! End-to-end tests of the sale engine against a real SQLite database.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tempfile::TempDir;
use uuid::Uuid;

use kassa_core::{
    Business, CartLine, DeliveryChannel, Money, MovementType, PaymentMethod, Product, TaxPolicy,
    User, ValidationError, ZeroRatePolicy,
};
use kassa_db::{Database, DbConfig, DbError};
use kassa_sales::receipt::ReceiptResult;
use kassa_sales::{
    CreateSaleRequest, DocumentStorage, ErrorCode, JobOutcome, Notifier, ReceiptError,
    ReceiptIssuer, ReceiptSettings, ReceiptWorker, SaleError, SaleEvent, SalePolicy, SaleService,
    TextReceiptRenderer,
};

// =============================================================================
// Fixtures
// =============================================================================

struct Shop {
    db: Database,
    business: Business,
    cashier: User,
    _dir: Option<TempDir>,
}

fn m(s: &str) -> Money {
    s.parse().unwrap()
}

async fn open_shop(db: Database, dir: Option<TempDir>) -> Shop {
    let now = Utc::now();
    let business = Business {
        id: Uuid::new_v4().to_string(),
        name: "Boutique Test".to_string(),
        created_at: now,
        deleted_at: None,
    };
    db.businesses().insert(&business).await.unwrap();

    let cashier = User {
        id: Uuid::new_v4().to_string(),
        business_id: business.id.clone(),
        name: "Awa".to_string(),
        email: None,
        created_at: now,
        deleted_at: None,
    };
    db.users().insert(&cashier).await.unwrap();

    Shop {
        db,
        business,
        cashier,
        _dir: dir,
    }
}

async fn memory_shop() -> Shop {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    open_shop(db, None).await
}

/// File-backed shop so concurrent sales get their own connections.
async fn file_shop() -> Shop {
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig::new(dir.path().join("kassa.db"))
        .max_connections(8)
        .busy_timeout(Duration::from_secs(10));
    let db = Database::new(config).await.unwrap();
    open_shop(db, Some(dir)).await
}

impl Shop {
    async fn product(&self, name: &str, price: &str, taxable: bool, stock: Option<i64>) -> Product {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let product = Product {
            reference: format!("REF-{}", &id[..8]),
            id,
            business_id: self.business.id.clone(),
            name: name.to_string(),
            unit_price: m(price),
            taxable,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.db.products().insert(&product).await.unwrap();

        if let Some(quantity) = stock {
            self.db.ledger().open_stock(&product.id, quantity).await.unwrap();
        }
        product
    }

    async fn set_tax(&self, enabled: bool, pct: i64) {
        self.db
            .tax_configs()
            .upsert(&self.business.id, enabled, Decimal::new(pct, 0))
            .await
            .unwrap();
    }

    async fn stock_of(&self, product: &Product) -> i64 {
        self.db
            .ledger()
            .get(&product.id)
            .await
            .unwrap()
            .unwrap()
            .quantity
    }

    async fn movement_count(&self, product: &Product) -> usize {
        self.db.ledger().movements(&product.id).await.unwrap().len()
    }

    async fn sale_count(&self) -> i64 {
        self.db.sales().count_for_business(&self.business.id).await.unwrap()
    }

    fn service(&self) -> SaleService {
        SaleService::new(self.db.clone(), SalePolicy::default())
    }

    fn request(&self, lines: &[(&Product, i64)]) -> CreateSaleRequest {
        CreateSaleRequest {
            business_id: self.business.id.clone(),
            cashier_id: self.cashier.id.clone(),
            lines: lines
                .iter()
                .map(|(product, qty)| CartLine::new(product.id.clone(), *qty))
                .collect(),
            ..Default::default()
        }
    }

    fn issuer(&self, storage: Arc<dyn DocumentStorage>) -> Arc<ReceiptIssuer> {
        Arc::new(ReceiptIssuer::new(
            self.db.clone(),
            Arc::new(TextReceiptRenderer),
            storage,
        ))
    }
}

/// Storage whose backend is down.
struct UnreachableStorage;

#[async_trait]
impl DocumentStorage for UnreachableStorage {
    async fn store(&self, _bytes: Vec<u8>, _path: &str) -> ReceiptResult<String> {
        Err(ReceiptError::Storage("bucket unreachable".to_string()))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<SaleEvent>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: SaleEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn settings(max_attempts: u32) -> ReceiptSettings {
    ReceiptSettings {
        poll_interval_secs: 3600,
        max_attempts,
        ..ReceiptSettings::default()
    }
}

// =============================================================================
// Pricing and persistence
// =============================================================================

#[tokio::test]
async fn test_taxable_and_exempt_lines_in_one_sale() {
    let shop = memory_shop().await;
    shop.set_tax(true, 18).await;
    let oil = shop.product("Huile 1L", "1180", true, Some(10)).await;
    let bread = shop.product("Pain", "500", false, Some(10)).await;

    let done = shop
        .service()
        .create_sale(shop.request(&[(&oil, 2), (&bread, 3)]))
        .await
        .unwrap();

    // 1180 x 2 at 18%
    let first = &done.items[0];
    assert_eq!(first.line_no, 1);
    assert_eq!(first.line_total, m("2360"));
    assert_eq!(first.tax_exclusive, m("2000"));
    assert_eq!(first.tax_amount, m("360"));

    // 500 x 3, not taxable
    let second = &done.items[1];
    assert_eq!(second.line_no, 2);
    assert_eq!(second.line_total, m("1500"));
    assert_eq!(second.tax_exclusive, m("1500"));
    assert!(second.tax_amount.is_zero());

    assert_eq!(done.sale.total_amount, m("3860"));
    assert_eq!(done.sale.tax_amount, m("360"));
    assert_eq!(done.payment.amount, done.sale.total_amount);
    assert_eq!(done.payment.method, PaymentMethod::Cash);
    assert!(done.invoice.invoice_number.starts_with("INV-"));
    assert!(done.invoice.receipt_url.is_none());

    assert_eq!(shop.stock_of(&oil).await, 8);
    assert_eq!(shop.stock_of(&bread).await, 7);

    let movements = shop
        .db
        .ledger()
        .movements_by_reference(&done.sale.id)
        .await
        .unwrap();
    assert_eq!(movements.len(), 2);
    assert!(movements.iter().all(|mv| mv.movement_type == MovementType::Sale));
    assert_eq!(movements.iter().map(|mv| mv.delta).sum::<i64>(), -5);
}

#[tokio::test]
async fn test_committed_sale_reads_back() {
    let shop = memory_shop().await;
    let soap = shop.product("Savon", "354", true, Some(3)).await;

    let done = shop
        .service()
        .create_sale(shop.request(&[(&soap, 1)]))
        .await
        .unwrap();
    let read = shop.service().get_sale(&done.sale.id).await.unwrap();

    assert_eq!(read.sale.total_amount, m("354"));
    assert_eq!(read.items.len(), 1);
    assert_eq!(read.payment.id, done.payment.id);
    assert_eq!(read.invoice.invoice_number, done.invoice.invoice_number);

    let job = shop
        .db
        .receipt_jobs()
        .get_by_sale_id(&done.sale.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.attempts, 0);
    assert!(!job.is_completed());
}

#[tokio::test]
async fn test_unknown_sale_is_not_found() {
    let shop = memory_shop().await;
    let err = shop
        .service()
        .get_sale(&Uuid::new_v4().to_string())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn test_missing_tax_config_uses_default_rate() {
    let shop = memory_shop().await;
    let oil = shop.product("Huile 1L", "1180", true, Some(1)).await;

    let done = shop
        .service()
        .create_sale(shop.request(&[(&oil, 1)]))
        .await
        .unwrap();

    assert_eq!(done.sale.tax_amount, m("180"));
}

#[tokio::test]
async fn test_zero_rate_follows_policy() {
    let shop = memory_shop().await;
    shop.set_tax(true, 0).await;
    let oil = shop.product("Huile 1L", "1180", true, Some(5)).await;

    let fallback = shop
        .service()
        .create_sale(shop.request(&[(&oil, 1)]))
        .await
        .unwrap();
    assert_eq!(fallback.sale.tax_amount, m("180"));

    let exempt = SaleService::new(
        shop.db.clone(),
        SalePolicy {
            tax: TaxPolicy {
                zero_rate: ZeroRatePolicy::Exempt,
                ..TaxPolicy::default()
            },
            ..SalePolicy::default()
        },
    );
    let done = exempt.create_sale(shop.request(&[(&oil, 1)])).await.unwrap();
    assert!(done.sale.tax_amount.is_zero());
    assert_eq!(done.items[0].tax_exclusive, m("1180"));
}

#[tokio::test]
async fn test_payment_method_defaults_and_override() {
    let shop = memory_shop().await;
    let bread = shop.product("Pain", "150", false, Some(10)).await;

    let service = SaleService::new(
        shop.db.clone(),
        SalePolicy {
            default_payment_method: PaymentMethod::MobileMoney,
            ..SalePolicy::default()
        },
    );

    let done = service.create_sale(shop.request(&[(&bread, 1)])).await.unwrap();
    assert_eq!(done.payment.method, PaymentMethod::MobileMoney);

    let mut request = shop.request(&[(&bread, 1)]);
    request.payment_method = Some(PaymentMethod::Card);
    let done = service.create_sale(request).await.unwrap();

    let stored = shop.db.sales().get_payment(&done.sale.id).await.unwrap().unwrap();
    assert_eq!(stored.method, PaymentMethod::Card);
}

#[tokio::test]
async fn test_customer_contacts_are_kept_on_the_invoice() {
    let shop = memory_shop().await;
    let bread = shop.product("Pain", "150", false, Some(10)).await;

    let mut request = shop.request(&[(&bread, 1)]);
    request.customer_email = Some(" client@shop.sn ".into());
    request.customer_phone = Some("   ".into());

    let done = shop.service().create_sale(request).await.unwrap();
    assert_eq!(done.invoice.customer_email.as_deref(), Some("client@shop.sn"));
    assert_eq!(done.invoice.customer_phone, None);
}

// =============================================================================
// Stock
// =============================================================================

#[tokio::test]
async fn test_insufficient_stock_changes_nothing() {
    let shop = memory_shop().await;
    let rice = shop.product("Riz 25kg", "17700", true, Some(5)).await;

    let err = shop
        .service()
        .create_sale(shop.request(&[(&rice, 6)]))
        .await
        .unwrap_err();

    match &err {
        SaleError::InsufficientStock {
            product_id,
            product_name,
            available,
            requested,
        } => {
            assert_eq!(product_id, &rice.id);
            assert_eq!(product_name, "Riz 25kg");
            assert_eq!(*available, 5);
            assert_eq!(*requested, 6);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert!(err.is_client_error());

    assert_eq!(shop.stock_of(&rice).await, 5);
    assert_eq!(shop.movement_count(&rice).await, 1); // opening IN only
    assert_eq!(shop.sale_count().await, 0);
}

#[tokio::test]
async fn test_failing_line_rolls_back_earlier_lines() {
    let shop = memory_shop().await;
    let oil = shop.product("Huile 1L", "1180", true, Some(10)).await;
    let sugar = shop.product("Sucre 1kg", "850", true, Some(1)).await;

    let err = shop
        .service()
        .create_sale(shop.request(&[(&oil, 4), (&sugar, 2)]))
        .await
        .unwrap_err();

    assert!(matches!(err, SaleError::InsufficientStock { .. }));
    assert_eq!(shop.stock_of(&oil).await, 10);
    assert_eq!(shop.stock_of(&sugar).await, 1);
    assert_eq!(shop.movement_count(&oil).await, 1);
    assert_eq!(shop.sale_count().await, 0);
}

#[tokio::test]
async fn test_duplicate_lines_share_the_stock_row() {
    let shop = memory_shop().await;
    let soap = shop.product("Savon", "354", true, Some(5)).await;

    let err = shop
        .service()
        .create_sale(shop.request(&[(&soap, 3), (&soap, 3)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SaleError::InsufficientStock {
            available: 5,
            requested: 6,
            ..
        }
    ));
    assert_eq!(shop.stock_of(&soap).await, 5);
    assert_eq!(shop.movement_count(&soap).await, 1);

    let done = shop
        .service()
        .create_sale(shop.request(&[(&soap, 2), (&soap, 3)]))
        .await
        .unwrap();
    assert_eq!(done.items.len(), 2);
    assert_eq!(done.items[1].line_no, 2);
    assert_eq!(shop.stock_of(&soap).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_concurrent_sales_for_the_last_units() {
    let shop = file_shop().await;
    let rice = shop.product("Riz 25kg", "17700", true, Some(5)).await;
    let service = shop.service();

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let service = service.clone();
            let request = shop.request(&[(&rice, 3)]);
            tokio::spawn(async move { service.create_sale(request).await })
        })
        .collect();

    let mut sold = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => sold += 1,
            Err(SaleError::InsufficientStock { available, .. }) => {
                assert_eq!(available, 2);
                refused += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!((sold, refused), (1, 1));
    assert_eq!(shop.stock_of(&rice).await, 2);
    assert_eq!(shop.sale_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_sales_never_oversell() {
    let shop = file_shop().await;
    let sugar = shop.product("Sucre 1kg", "850", true, Some(10)).await;
    let bread = shop.product("Pain", "150", false, Some(1000)).await;
    let service = shop.service();

    // Half the carts list the products in the other order.
    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let service = service.clone();
            let request = if n % 2 == 0 {
                shop.request(&[(&sugar, 3), (&bread, 1)])
            } else {
                shop.request(&[(&bread, 1), (&sugar, 3)])
            };
            tokio::spawn(async move { service.create_sale(request).await })
        })
        .collect();

    let mut sold = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => sold += 1,
            Err(SaleError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(sold, 3);
    assert_eq!(shop.stock_of(&sugar).await, 1);
    assert_eq!(shop.stock_of(&bread).await, 997);
    assert_eq!(shop.movement_count(&sugar).await, 1 + 3);
    assert_eq!(shop.sale_count().await, 3);
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_any_write() {
    let shop = memory_shop().await;
    let soap = shop.product("Savon", "354", true, Some(5)).await;
    let service = shop.service();

    let empty = shop.request(&[]);
    let zero_qty = shop.request(&[(&soap, 0)]);
    let negative_qty = shop.request(&[(&soap, -2)]);
    let mut bad_email = shop.request(&[(&soap, 1)]);
    bad_email.customer_email = Some("not-an-email".into());
    let mut bad_phone = shop.request(&[(&soap, 1)]);
    bad_phone.customer_phone = Some("12".into());
    let mut bad_id = shop.request(&[(&soap, 1)]);
    bad_id.business_id = "shop-1".into();

    for request in [empty, zero_qty, negative_qty, bad_email, bad_phone, bad_id] {
        let err = service.create_sale(request).await.unwrap_err();
        assert!(matches!(err, SaleError::Validation(_)), "got {err:?}");
        assert!(err.is_client_error());
    }

    assert_eq!(shop.stock_of(&soap).await, 5);
    assert_eq!(shop.movement_count(&soap).await, 1);
    assert_eq!(shop.sale_count().await, 0);
}

#[tokio::test]
async fn test_unknown_entities_are_not_found() {
    let shop = memory_shop().await;
    let soap = shop.product("Savon", "354", true, Some(5)).await;
    let service = shop.service();

    let unknown_id = Uuid::new_v4().to_string();

    let mut unknown_business = shop.request(&[(&soap, 1)]);
    unknown_business.business_id = unknown_id.clone();
    let mut unknown_cashier = shop.request(&[(&soap, 1)]);
    unknown_cashier.cashier_id = unknown_id.clone();
    let mut unknown_product = shop.request(&[]);
    unknown_product.lines = vec![CartLine::new(unknown_id.clone(), 1)];

    for request in [unknown_business, unknown_cashier, unknown_product] {
        let err = service.create_sale(request).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound, "got {err:?}");
    }
    assert_eq!(shop.sale_count().await, 0);
}

#[tokio::test]
async fn test_soft_deleted_product_is_not_sellable() {
    let shop = memory_shop().await;
    let soap = shop.product("Savon", "354", true, Some(5)).await;
    shop.db.products().soft_delete(&soap.id).await.unwrap();

    let err = shop
        .service()
        .create_sale(shop.request(&[(&soap, 1)]))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::NotFound);
    assert_eq!(shop.stock_of(&soap).await, 5);
}

#[tokio::test]
async fn test_product_without_stock_row_is_rejected() {
    let shop = memory_shop().await;
    let ghost = shop.product("Fantôme", "100", true, None).await;

    let err = shop
        .service()
        .create_sale(shop.request(&[(&ghost, 1)]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SaleError::Validation(ValidationError::NotFound { ref entity, .. }) if entity == "Stock"
    ));
}

#[tokio::test]
async fn test_foreign_product_and_cashier_are_rejected() {
    let shop = memory_shop().await;
    let other = open_shop(shop.db.clone(), None).await;
    let theirs = other.product("Lait", "500", false, Some(5)).await;
    let ours = shop.product("Savon", "354", true, Some(5)).await;
    let service = shop.service();

    let err = service
        .create_sale(shop.request(&[(&ours, 1), (&theirs, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SaleError::Validation(ValidationError::ForeignOwnership { .. })
    ));

    let mut foreign_cashier = shop.request(&[(&ours, 1)]);
    foreign_cashier.cashier_id = other.cashier.id.clone();
    let err = service.create_sale(foreign_cashier).await.unwrap_err();
    assert!(matches!(
        err,
        SaleError::Validation(ValidationError::ForeignOwnership { .. })
    ));

    assert_eq!(shop.stock_of(&ours).await, 5);
    assert_eq!(other.stock_of(&theirs).await, 5);
}

#[tokio::test]
async fn test_cart_over_the_line_limit_is_rejected() {
    let shop = memory_shop().await;
    let bread = shop.product("Pain", "150", false, Some(100)).await;

    let service = SaleService::new(
        shop.db.clone(),
        SalePolicy {
            max_cart_lines: 2,
            ..SalePolicy::default()
        },
    );

    let err = service
        .create_sale(shop.request(&[(&bread, 1), (&bread, 1), (&bread, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, SaleError::Validation(_)));
    assert_eq!(shop.stock_of(&bread).await, 100);
}

// =============================================================================
// Persistence failure
// =============================================================================

#[tokio::test]
async fn test_write_failure_rolls_back_the_whole_sale() {
    let shop = memory_shop().await;
    let oil = shop.product("Huile 1L", "1180", true, Some(10)).await;

    sqlx::query(
        "CREATE TRIGGER payments_offline BEFORE INSERT ON payments \
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    )
    .execute(shop.db.pool())
    .await
    .unwrap();

    let events = Arc::new(RecordingNotifier::default());
    let service = shop.service().with_notifier(events.clone());

    let err = service
        .create_sale(shop.request(&[(&oil, 2)]))
        .await
        .unwrap_err();

    assert!(matches!(err, SaleError::Persistence(_)), "got {err:?}");
    assert_eq!(err.code(), ErrorCode::PersistenceFailed);
    assert!(!err.is_client_error());
    assert!(!err.public_message().contains("disk full"));

    assert_eq!(shop.stock_of(&oil).await, 10);
    assert_eq!(shop.movement_count(&oil).await, 1);
    assert_eq!(shop.sale_count().await, 0);
    assert_eq!(shop.db.receipt_jobs().count_pending().await.unwrap(), 0);
    assert!(events.events.lock().unwrap().is_empty());

    // Locks were released: the next sale goes through once payments work again.
    sqlx::query("DROP TRIGGER payments_offline")
        .execute(shop.db.pool())
        .await
        .unwrap();
    service.create_sale(shop.request(&[(&oil, 2)])).await.unwrap();
    assert_eq!(shop.stock_of(&oil).await, 8);
}

#[tokio::test]
async fn test_invoice_number_collision_fails_the_sale() {
    let shop = memory_shop().await;
    let oil = shop.product("Huile 1L", "1180", true, Some(10)).await;
    let service = shop.service();

    let first = service.create_sale(shop.request(&[(&oil, 1)])).await.unwrap();
    assert_eq!(shop.stock_of(&oil).await, 9);

    // Hands every new invoice number to the existing invoice first.
    sqlx::query(
        "CREATE TRIGGER invoice_number_taken BEFORE INSERT ON invoices \
         BEGIN UPDATE invoices SET invoice_number = NEW.invoice_number \
         WHERE id = (SELECT id FROM invoices LIMIT 1); END;",
    )
    .execute(shop.db.pool())
    .await
    .unwrap();

    let err = service
        .create_sale(shop.request(&[(&oil, 4)]))
        .await
        .unwrap_err();

    match &err {
        SaleError::Persistence(DbError::UniqueViolation { field, .. }) => {
            assert_eq!(field, "invoices.invoice_number");
        }
        other => panic!("expected a unique violation, got {other:?}"),
    }
    assert_eq!(err.code(), ErrorCode::PersistenceFailed);

    assert_eq!(shop.stock_of(&oil).await, 9);
    assert_eq!(shop.movement_count(&oil).await, 2);
    assert_eq!(shop.sale_count().await, 1);
    assert_eq!(shop.db.receipt_jobs().count_pending().await.unwrap(), 1);

    let kept = shop.service().get_sale(&first.sale.id).await.unwrap();
    assert_eq!(kept.invoice.invoice_number, first.invoice.invoice_number);
}

#[tokio::test]
async fn test_lookup_failure_before_reservation_writes_nothing() {
    let shop = memory_shop().await;
    let oil = shop.product("Huile 1L", "1180", true, Some(10)).await;

    sqlx::query("DROP TABLE tax_configurations")
        .execute(shop.db.pool())
        .await
        .unwrap();

    let err = shop
        .service()
        .create_sale(shop.request(&[(&oil, 2)]))
        .await
        .unwrap_err();

    assert!(matches!(err, SaleError::Persistence(_)), "got {err:?}");
    assert!(!err.is_client_error());
    assert_eq!(shop.stock_of(&oil).await, 10);
    assert_eq!(shop.movement_count(&oil).await, 1);
    assert_eq!(shop.sale_count().await, 0);
}

// =============================================================================
// Receipts
// =============================================================================

#[tokio::test]
async fn test_storage_failure_does_not_fail_the_sale() {
    let shop = memory_shop().await;
    let oil = shop.product("Huile 1L", "1180", true, Some(10)).await;

    let (mut worker, queue) = ReceiptWorker::new(
        shop.issuer(Arc::new(UnreachableStorage)),
        shop.db.receipt_jobs(),
        Arc::new(RecordingNotifier::default()),
        settings(5),
    );
    let service = shop.service().with_receipts(queue);

    let done = service.create_sale(shop.request(&[(&oil, 1)])).await.unwrap();
    let summary = worker.drain().await;
    assert_eq!(summary.failed, 1);

    let read = service.get_sale(&done.sale.id).await.unwrap();
    assert!(read.invoice.receipt_url.is_none());
    assert_eq!(read.sale.total_amount, m("1180"));
    assert_eq!(shop.stock_of(&oil).await, 9);

    let job = shop
        .db
        .receipt_jobs()
        .get_by_sale_id(&done.sale.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.unwrap().contains("bucket unreachable"));
}

#[tokio::test]
async fn test_failed_receipt_is_retried_by_the_poller() {
    let shop = memory_shop().await;
    let oil = shop.product("Huile 1L", "1180", true, Some(10)).await;
    let dir = tempfile::tempdir().unwrap();

    let (mut failing, queue) = ReceiptWorker::new(
        shop.issuer(Arc::new(UnreachableStorage)),
        shop.db.receipt_jobs(),
        Arc::new(RecordingNotifier::default()),
        settings(5),
    );
    let done = shop
        .service()
        .with_receipts(queue)
        .create_sale(shop.request(&[(&oil, 1)]))
        .await
        .unwrap();
    failing.drain().await;

    // Storage is back.
    let events = Arc::new(RecordingNotifier::default());
    let (worker, _queue) = ReceiptWorker::new(
        Arc::new(ReceiptIssuer::local(shop.db.clone(), dir.path(), None)),
        shop.db.receipt_jobs(),
        events.clone(),
        settings(5),
    );
    let summary = worker.process_pending().await;
    assert_eq!(summary.issued, 1);

    let invoice = shop
        .db
        .invoices()
        .get_by_sale_id(&done.sale.id)
        .await
        .unwrap()
        .unwrap();
    let url = invoice.receipt_url.unwrap();
    assert!(url.ends_with(&format!("{}.txt", invoice.invoice_number)));

    let job = shop
        .db
        .receipt_jobs()
        .get_by_sale_id(&done.sale.id)
        .await
        .unwrap()
        .unwrap();
    assert!(job.is_completed());
    assert_eq!(job.attempts, 2);

    let events = events.events.lock().unwrap();
    assert!(matches!(events.as_slice(), [SaleEvent::ReceiptIssued { .. }]));
}

#[tokio::test]
async fn test_exhausted_receipt_jobs_are_skipped() {
    let shop = memory_shop().await;
    let oil = shop.product("Huile 1L", "1180", true, Some(10)).await;

    let (mut worker, queue) = ReceiptWorker::new(
        shop.issuer(Arc::new(UnreachableStorage)),
        shop.db.receipt_jobs(),
        Arc::new(RecordingNotifier::default()),
        settings(1),
    );
    let done = shop
        .service()
        .with_receipts(queue)
        .create_sale(shop.request(&[(&oil, 1)]))
        .await
        .unwrap();

    assert_eq!(worker.drain().await.failed, 1);
    assert_eq!(worker.process_sale(&done.sale.id).await, JobOutcome::Skipped);
    assert_eq!(worker.process_pending().await.total(), 0);
    assert_eq!(shop.db.receipt_jobs().count_exhausted(1).await.unwrap(), 1);
}

#[tokio::test]
async fn test_receipt_issuing_is_idempotent() {
    let shop = memory_shop().await;
    let oil = shop.product("Huile 1L", "1180", true, Some(10)).await;
    let dir = tempfile::tempdir().unwrap();

    let done = shop
        .service()
        .create_sale(shop.request(&[(&oil, 2)]))
        .await
        .unwrap();
    let issuer = ReceiptIssuer::local(shop.db.clone(), dir.path(), None);

    let first = issuer.issue_receipt(&done.sale.id).await.unwrap();
    let second = issuer.issue_receipt(&done.sale.id).await.unwrap();

    assert!(first.newly_issued);
    assert!(!second.newly_issued);
    assert_eq!(first.url, second.url);

    let path = dir.path().join(format!("{}.txt", done.invoice.invoice_number));
    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.contains("Boutique Test"));
    assert!(text.contains("Huile 1L"));
    assert!(text.contains(&done.invoice.invoice_number));
}

#[tokio::test]
async fn test_receipt_for_unknown_sale() {
    let shop = memory_shop().await;
    let dir = tempfile::tempdir().unwrap();
    let issuer = ReceiptIssuer::local(shop.db.clone(), dir.path(), None);

    assert!(matches!(
        issuer.issue_receipt("missing").await,
        Err(ReceiptError::InvoiceNotFound { .. })
    ));
}

#[tokio::test]
async fn test_mark_delivered_sets_the_channel_flag() {
    let shop = memory_shop().await;
    let oil = shop.product("Huile 1L", "1180", true, Some(10)).await;
    let dir = tempfile::tempdir().unwrap();

    let done = shop
        .service()
        .create_sale(shop.request(&[(&oil, 1)]))
        .await
        .unwrap();
    let issuer = ReceiptIssuer::local(shop.db.clone(), dir.path(), None);

    issuer
        .mark_delivered(&done.invoice.id, DeliveryChannel::Email)
        .await
        .unwrap();

    let invoice = shop
        .db
        .invoices()
        .get_by_id(&done.invoice.id)
        .await
        .unwrap()
        .unwrap();
    assert!(invoice.sent_by_email);
    assert!(!invoice.sent_by_whatsapp);
}

#[tokio::test]
async fn test_running_worker_issues_dispatched_receipts() {
    let shop = file_shop().await;
    let oil = shop.product("Huile 1L", "1180", true, Some(10)).await;
    let dir = tempfile::tempdir().unwrap();

    let events = Arc::new(RecordingNotifier::default());
    let (worker, queue) = ReceiptWorker::new(
        Arc::new(ReceiptIssuer::local(shop.db.clone(), dir.path(), None)),
        shop.db.receipt_jobs(),
        events.clone(),
        settings(5),
    );
    let handle = tokio::spawn(worker.run());

    let service = shop
        .service()
        .with_receipts(queue.clone())
        .with_notifier(events.clone());
    let done = service.create_sale(shop.request(&[(&oil, 1)])).await.unwrap();

    let invoices = shop.db.invoices();
    let url = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let invoice = invoices.get_by_sale_id(&done.sale.id).await.unwrap().unwrap();
            if let Some(url) = invoice.receipt_url {
                return url;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("receipt was not issued in time");
    assert!(url.starts_with("file://"));

    queue.shutdown().await.unwrap();
    handle.await.unwrap();

    let events = events.events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, SaleEvent::SaleCompleted { sale_id, .. } if sale_id == &done.sale.id)));
    assert!(events
        .iter()
        .any(|e| matches!(e, SaleEvent::ReceiptIssued { sale_id, .. } if sale_id == &done.sale.id)));
}
