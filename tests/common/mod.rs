//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use db_wrapper::{ColumnType, DbWrapper, Entity, IdentifiedEntity, SqlDialect};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use uuid::Uuid;

pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE "Product" (
    "ProductID" INTEGER PRIMARY KEY AUTOINCREMENT,
    "Name" TEXT NOT NULL UNIQUE,
    "ProductNumber" TEXT NOT NULL UNIQUE,
    "Color" TEXT NULL,
    "ListPrice" NUMERIC NOT NULL,
    "Size" TEXT NULL,
    "Weight" REAL NULL,
    "SellStartDate" TIMESTAMP NOT NULL,
    "rowguid" TEXT NULL,
    "ThumbNailPhoto" BLOB NULL
);
CREATE TABLE "Setting" (
    "Key" TEXT PRIMARY KEY,
    "Value" TEXT NOT NULL
);
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Product {
    #[serde(rename = "ProductID")]
    pub product_id: i64,
    pub name: String,
    pub product_number: String,
    pub color: Option<String>,
    pub list_price: Decimal,
    pub size: Option<String>,
    pub weight: Option<f64>,
    pub sell_start_date: NaiveDateTime,
    #[serde(rename = "rowguid")]
    pub rowguid: Option<Uuid>,
    pub thumb_nail_photo: Option<Vec<u8>>,
}

impl Entity for Product {
    const TABLE: &'static str = "Product";
    const KEY_COLUMN: &'static str = "ProductID";
    const GENERATED_KEY: bool = true;
    const NAME_COLUMN: Option<&'static str> = Some("Name");
    const COLUMN_TYPES: &'static [(&'static str, ColumnType)] = &[
        ("ListPrice", ColumnType::Decimal),
        ("SellStartDate", ColumnType::Timestamp),
        ("rowguid", ColumnType::Uuid),
        ("ThumbNailPhoto", ColumnType::Bytes),
    ];

    fn set_generated_key(&mut self, key: i64) {
        self.product_id = key;
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl IdentifiedEntity for Product {
    fn id(&self) -> i64 {
        self.product_id
    }
}

/// Keyed by a caller-assigned string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Setting {
    pub key: String,
    pub value: String,
}

impl Entity for Setting {
    const TABLE: &'static str = "Setting";
    const KEY_COLUMN: &'static str = "Key";
}

static NEXT_PRODUCT: AtomicU64 = AtomicU64::new(1);

/// A product with a unique name and number and random attributes.
pub fn random_product() -> Product {
    let mut rng = rand::thread_rng();
    let serial = NEXT_PRODUCT.fetch_add(1, Ordering::Relaxed);
    let suffix: u32 = rng.gen_range(1000..9999);

    Product {
        product_id: 0,
        name: format!("Product {serial}-{suffix}"),
        product_number: format!("PN-{serial}-{suffix}"),
        color: ["Red", "Black", "Silver"]
            .choose(&mut rng)
            .map(|c| c.to_string()),
        list_price: Decimal::new(rng.gen_range(100..50_000), 2),
        size: None,
        weight: rng.gen_bool(0.5).then(|| f64::from(rng.gen_range(1..40u32))),
        sell_start_date: sell_start(rng.gen_range(1..=12), rng.gen_range(1..=28)),
        rowguid: Some(Uuid::new_v4()),
        thumb_nail_photo: rng
            .gen_bool(0.5)
            .then(|| (0..16).map(|_| rng.r#gen::<u8>()).collect()),
    }
}

/// Midday on a 2024 date, whole seconds so every engine stores it exactly.
pub fn sell_start(month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, month, day)
        .and_then(|date| date.and_hms_opt(12, 30, 15))
        .unwrap()
}

pub fn random_products(count: usize) -> Vec<Product> {
    (0..count).map(|_| random_product()).collect()
}

/// A wrapper over a fresh SQLite database with the test schema.
///
/// The returned directory owns the database file; keep it alive for the test.
pub async fn sqlite_wrapper() -> (DbWrapper, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = sqlite_url(&dir);
    let mut wrapper = DbWrapper::connect(&url, SqlDialect::Sqlite).await.unwrap();
    wrapper.execute(SQLITE_SCHEMA).await.unwrap();
    (wrapper, dir)
}

pub fn sqlite_url(dir: &TempDir) -> String {
    format!("sqlite:{}", dir.path().join("wrapper.db").display())
}

// -----------------------------------------------------------------------------
// Log capture
// -----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CapturedEvents(Arc<Mutex<Vec<CapturedEvent>>>);

impl CapturedEvents {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().unwrap().clone()
    }

    /// Events whose `function` field equals `function`.
    pub fn for_function(&self, function: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.field("function") == Some(function))
            .collect()
    }
}

struct CaptureLayer(CapturedEvents);

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.0.0.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            fields: visitor.0,
        });
    }
}

#[derive(Default)]
struct FieldVisitor(HashMap<String, String>);

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

/// Capture every event on the current thread until the guard drops.
///
/// Use with the default current-thread `#[tokio::test]` runtime.
pub fn capture_logs() -> (CapturedEvents, tracing::subscriber::DefaultGuard) {
    let events = CapturedEvents::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer(events.clone()));
    let guard = tracing::subscriber::set_default(subscriber);
    (events, guard)
}
