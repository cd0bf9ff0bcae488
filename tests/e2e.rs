//! End-to-end tests for promo-catalog.
//!
//! Fixtures are written into a fresh temp directory per test: CSV by hand,
//! XLSX with `rust_xlsxwriter`. Image fetching, link shortening and document
//! capture go through in-process fakes, so nothing here touches the network.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use async_trait::async_trait;
use promo_catalog::pipeline::schema::Field;
use promo_catalog::resolver::{AccessMode, LoadRequest, LoadedImage, COVER_KEY, HEADER_LOGO_KEY};
use promo_catalog::share::{ShareForm, ShareLink};
use promo_catalog::{
    build_catalog, build_catalog_sync, build_catalog_to_file, build_share_link, export_document, inspect,
    parse_share_link, resolve_output_images, Catalog, CatalogConfig, CatalogError, CatalogOutput, CatalogSession,
    CaptureError, DocumentCapture, FailureReport, ImageError, ImageLoader, ImageResolver, LinkShortener,
    ProductCard, ProductStatus, PromoBadge, ResolutionProgressCallback, SchemaError, SchemaMapper, ShortenError,
    Strategy,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

const DRIVE_ID: &str = "1AbCdEfGhIjKlMnOpQrStUvWxYz012345";

fn write_csv(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).expect("write csv fixture");
    path
}

/// Workbook with a banner row, a logo directive and a numeric month.
fn write_offers_xlsx(dir: &TempDir) -> PathBuf {
    use rust_xlsxwriter::Workbook;

    let path = dir.path().join("offers.xlsx");
    let mut workbook = Workbook::new();

    let notes = workbook.add_worksheet();
    notes.set_name("Notes").unwrap();
    notes.write_string(0, 0, "Read me first").unwrap();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Offers").unwrap();
    sheet.write_string(0, 0, "Summer Campaign - Internal").unwrap();
    let headers = [
        "Article No",
        "Product Name",
        "Arabic Name",
        "Regular Price",
        "Promo",
        "Image URL",
        "Brand Logo",
        "Campaign Month",
    ];
    for (col, h) in headers.iter().enumerate() {
        sheet.write_string(2, col as u16, *h).unwrap();
    }

    sheet.write_string(3, 0, "logo").unwrap();
    sheet
        .write_string(3, 5, "https://cdn.example.com/brand/header.png\nhttps://cdn.example.com/other.png")
        .unwrap();

    let rows: [(&str, &str, &str, f64, &str, String, &str); 4] = [
        (
            "1001",
            "Vitamin C Serum",
            "سيروم فيتامين سي",
            115.0,
            "20% OFF",
            format!("https://drive.google.com/file/d/{DRIVE_ID}/view?usp=sharing"),
            "https://cdn.example.com/brands/glow.png",
        ),
        ("1002", "Hand Cream", "", 50.0, "Buy 1 Get 1", String::new(), ""),
        ("1003", "Sunscreen SPF50", "", 89.5, "Buy 2 Get 1 Free on all packs", String::new(), ""),
        ("1004", "Premium Perfume", "", 420.0, "NOW 399", String::new(), ""),
    ];
    for (i, (sku, name, name_ar, price, promo, image, logo)) in rows.iter().enumerate() {
        let r = 4 + i as u32;
        sheet.write_string(r, 0, *sku).unwrap();
        sheet.write_string(r, 1, *name).unwrap();
        if !name_ar.is_empty() {
            sheet.write_string(r, 2, *name_ar).unwrap();
        }
        sheet.write_number(r, 3, *price).unwrap();
        sheet.write_string(r, 4, *promo).unwrap();
        if !image.is_empty() {
            sheet.write_string(r, 5, image.as_str()).unwrap();
        }
        if !logo.is_empty() {
            sheet.write_string(r, 6, *logo).unwrap();
        }
    }
    sheet.write_number(4, 7, 5.0).unwrap();
    // Spacer row with a name but no SKU.
    sheet.write_string(8, 1, "end of list").unwrap();

    workbook.save(&path).unwrap();
    path
}

fn offers_config() -> CatalogConfig {
    CatalogConfig::builder().sheet("Offers").build().expect("valid config")
}

/// Loader that only succeeds for URLs containing `needle` in `mode`.
struct SelectiveLoader {
    needle: &'static str,
    mode: AccessMode,
    calls: Mutex<Vec<(String, AccessMode)>>,
}

impl SelectiveLoader {
    fn new(needle: &'static str, mode: AccessMode) -> Arc<Self> {
        Arc::new(Self {
            needle,
            mode,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ImageLoader for SelectiveLoader {
    async fn load(&self, request: &LoadRequest) -> Result<LoadedImage, ImageError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.url.clone(), request.mode));
        if request.url.contains(self.needle) && request.mode == self.mode {
            Ok(LoadedImage {
                bytes: vec![0x89, b'P', b'N', b'G'],
                mime_type: "image/png".into(),
            })
        } else {
            Err(ImageError::Status {
                url: request.url.clone(),
                status: 403,
            })
        }
    }
}

#[derive(Default)]
struct RecordingCallback {
    failures: Mutex<Vec<(String, FailureReport)>>,
    loaded: Mutex<Vec<(String, Strategy)>>,
}

impl ResolutionProgressCallback for RecordingCallback {
    fn on_image_loaded(&self, key: &str, strategy: Strategy) {
        self.loaded.lock().unwrap().push((key.to_string(), strategy));
    }

    fn on_image_failed(&self, key: &str, report: &FailureReport) {
        self.failures
            .lock()
            .unwrap()
            .push((key.to_string(), report.clone()));
    }
}

fn product<'a>(output: &'a CatalogOutput, sku: &str) -> &'a promo_catalog::ProcessedProduct {
    output
        .catalog
        .products()
        .find(|p| p.sku == sku)
        .unwrap_or_else(|| panic!("product {sku} missing"))
}

fn path_str(p: &Path) -> &str {
    p.to_str().expect("utf-8 temp path")
}

// ── Spreadsheet → catalog ────────────────────────────────────────────────────

#[tokio::test]
async fn test_csv_with_synonym_headers() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        &dir,
        "offers.csv",
        "Weekly offers,,\n,,\nItem Code,Description,Regular Price\nX1,Widget,10\n,Orphan,5\nX2,,7\n",
    );

    let output = build_catalog(path_str(&path), &CatalogConfig::default())
        .await
        .expect("build should succeed");

    assert_eq!(output.stats.header_row, 2);
    assert_eq!(output.columns.get(Field::Sku), Some(0));
    assert_eq!(output.columns.get(Field::Name), Some(1));
    assert_eq!(output.columns.get(Field::Price), Some(2));
    assert_eq!(output.stats.products, 1);
    assert_eq!(output.stats.skipped_rows, 2);

    let x1 = product(&output, "X1");
    assert_eq!(x1.name, "Widget");
    assert_eq!(x1.final_price, 10.0);
    assert_eq!(x1.discount_label, "SPECIAL OFFER");
    assert_eq!(output.catalog.title, "Consumer Offer Plan");
}

#[tokio::test]
async fn test_xlsx_full_pipeline() {
    let dir = TempDir::new().unwrap();
    let path = write_offers_xlsx(&dir);

    let output = build_catalog(path_str(&path), &offers_config())
        .await
        .expect("build should succeed");

    assert_eq!(output.stats.header_row, 2);
    assert_eq!(output.stats.products, 4);
    assert_eq!(output.stats.directive_rows, 1);
    assert_eq!(output.stats.skipped_rows, 1);
    assert_eq!(output.catalog.title, "Consumer Offer Plan May (COP-5)");
    assert_eq!(output.catalog.header_logo, "https://cdn.example.com/brand/header.png");

    let serum = product(&output, "1001");
    assert!((serum.final_price - 92.0).abs() < 1e-9, "got {}", serum.final_price);
    assert_eq!(serum.discount_label, "20% OFF");
    assert_eq!(serum.name_ar.as_deref(), Some("سيروم فيتامين سي"));
    assert_eq!(serum.image_url, format!("https://lh3.googleusercontent.com/d/{DRIVE_ID}"));
    assert_eq!(serum.logo_url.as_deref(), Some("https://cdn.example.com/brands/glow.png"));

    let cream = product(&output, "1002");
    assert_eq!(cream.discount_label, "1+1 FREE");
    assert_eq!(cream.discount_label_ar.as_deref(), Some("١+١ مجاناً"));
    assert_eq!(ProductCard::from(cream).badge, PromoBadge::BuyOneGetOne);

    let sunscreen = product(&output, "1003");
    assert_eq!(sunscreen.discount_label, "2+1 FREE");
    assert_eq!(ProductCard::from(sunscreen).badge, PromoBadge::BundleOffer);

    let perfume = product(&output, "1004");
    assert_eq!(perfume.final_price, 399.0);
    assert_eq!(perfume.discount_label, "NOW 399");
    let card = ProductCard::from(perfume);
    assert_eq!(card.badge, PromoBadge::PremiumPick);
    assert_eq!(card.savings.as_ref().map(|s| s.amount), Some(21));
}

#[tokio::test]
async fn test_pagination_and_manual_month() {
    let dir = TempDir::new().unwrap();
    let mut body = String::from("SKU,Name,Price,Month\n");
    for i in 0..14 {
        body.push_str(&format!("S{i},Item {i},{},March\n", 10 + i));
    }
    let path = write_csv(&dir, "many.csv", &body);

    let config = CatalogConfig::builder().manual_month("oct").build().unwrap();
    let output = build_catalog(path_str(&path), &config).await.unwrap();

    let sizes: Vec<_> = output.catalog.pages.iter().map(|p| p.products.len()).collect();
    assert_eq!(sizes, vec![6, 6, 2]);
    let skus: Vec<_> = output.catalog.products().map(|p| p.sku.clone()).collect();
    let expected: Vec<_> = (0..14).map(|i| format!("S{i}")).collect();
    assert_eq!(skus, expected);
    assert_eq!(output.catalog.title, "Consumer Offer Plan October (COP-10)");
}

#[tokio::test]
async fn test_missing_columns_rejects_upload() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(&dir, "bad.csv", "SKU,Colour\nA,Red\n");

    let err = build_catalog(path_str(&path), &CatalogConfig::default())
        .await
        .unwrap_err();
    match err {
        CatalogError::Schema(SchemaError::MissingColumns { missing }) => {
            assert_eq!(missing, vec!["Name", "Price"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_only_directives_is_no_valid_rows() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(&dir, "logo.csv", "SKU,Name,Price,Image\nlogo,,,https://a.co/x.png\n");

    let err = build_catalog(path_str(&path), &CatalogConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Schema(SchemaError::NoValidRows)));
}

#[tokio::test]
async fn test_input_errors() {
    let missing = build_catalog("/definitely/not/here.xlsx", &CatalogConfig::default()).await;
    assert!(matches!(missing, Err(CatalogError::FileNotFound { .. })));

    let dir = TempDir::new().unwrap();
    let txt = write_csv(&dir, "notes.txt", "SKU,Name,Price\n");
    let unsupported = build_catalog(path_str(&txt), &CatalogConfig::default()).await;
    assert!(matches!(unsupported, Err(CatalogError::UnsupportedFormat { .. })));

    let empty = write_csv(&dir, "empty.csv", "\n,,\n");
    let empty = build_catalog(path_str(&empty), &CatalogConfig::default()).await;
    assert!(matches!(empty, Err(CatalogError::EmptySpreadsheet { .. })));
}

#[tokio::test]
async fn test_inspect_reports_mapping_only() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        &dir,
        "inspect.csv",
        "Code,Title,RRP,Offer Ar,Picture,Product Page\nA,B,1,x,y,z\n",
    );

    let report = inspect(path_str(&path)).await.unwrap();
    assert_eq!(report.header_row, 0);
    assert!(report.missing.is_empty());
    assert_eq!(report.columns.get(Field::MechanicsAr), Some(3));
    assert_eq!(report.columns.get(Field::Image), Some(4));
    assert_eq!(report.columns.get(Field::ProductPage), Some(5));
    assert_eq!(report.data_rows, 1);
}

#[tokio::test]
async fn test_build_to_file_is_valid_json() {
    let dir = TempDir::new().unwrap();
    let input = write_offers_xlsx(&dir);
    let out = dir.path().join("out/catalog.json");

    let stats = build_catalog_to_file(path_str(&input), &out, &offers_config())
        .await
        .unwrap();
    assert_eq!(stats.products, 4);

    let json = std::fs::read_to_string(&out).unwrap();
    let parsed: CatalogOutput = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.catalog.product_count(), 4);
    assert!(json.contains("\"finalPrice\""));
    assert!(!out.with_extension("json.tmp").exists());
}

#[test]
fn test_build_sync_wrapper() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(&dir, "sync.csv", "SKU,Name,Price,Mechanics\nA,Soap,50,2nd item 30%\n");
    let output = build_catalog_sync(path_str(&path), &CatalogConfig::default()).unwrap();
    let soap = product(&output, "A");
    assert_eq!(soap.discount_label, "30% OFF ON 2ND ITEM");
    assert_eq!(soap.final_price, 50.0);
}

// ── Image resolution ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_images_fall_back_and_report_failures() {
    let dir = TempDir::new().unwrap();
    let path = write_offers_xlsx(&dir);
    let mut output = build_catalog(path_str(&path), &offers_config()).await.unwrap();

    // Add a product image with no recoverable identifier and a cover.
    output.catalog.cover = Some("https://cdn.example.com/cover.jpg".into());
    output.catalog.pages[0].products[1].image_url = "https://shop.example.com/img/broken.png".into();

    let recorder = Arc::new(RecordingCallback::default());
    let config = CatalogConfig::builder()
        .progress_callback(recorder.clone() as Arc<dyn ResolutionProgressCallback>)
        .build()
        .unwrap();
    let loader = SelectiveLoader::new("thumbnail", AccessMode::Anonymous);
    let resolver = ImageResolver::new(loader.clone(), &config);

    resolve_output_images(&mut output, &resolver, 4).await;

    // header logo, cover, serum image + brand logo, broken cream image
    assert_eq!(output.stats.images_total, 5);
    assert_eq!(output.stats.images_loaded, 1);

    let serum = product(&output, "1001");
    assert!(serum.image_url.starts_with(&format!("https://drive.google.com/thumbnail?id={DRIVE_ID}")));
    assert_eq!(serum.logo_url, None);
    assert_eq!(output.catalog.header_logo, "");
    assert_eq!(output.catalog.cover, None);
    assert_eq!(product(&output, "1002").image_url, "");

    let outcome = output
        .images
        .iter()
        .find(|o| o.key.ends_with(":image") && o.is_loaded())
        .unwrap();
    assert_eq!(outcome.strategy, Some(Strategy::Thumbnail));
    assert_eq!(outcome.attempts, 4);
    assert!(!outcome.capture_safe);

    // Only non-logo images report, each exactly once.
    let failures = recorder.failures.lock().unwrap();
    let keys: Vec<_> = failures.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(failures.len(), 2, "got {keys:?}");
    assert!(keys.contains(&COVER_KEY));
    assert!(!keys.contains(&HEADER_LOGO_KEY));
    let broken = failures
        .iter()
        .find(|(_, r)| r.original_reference.contains("broken.png"))
        .unwrap();
    assert_eq!(broken.1.extracted_id, None);

    assert_eq!(recorder.loaded.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_inline_images_are_capture_safe() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        &dir,
        "one.csv",
        "SKU,Name,Price,Image\nA,Soap,5,https://cdn.example.com/soap.png\n",
    );
    let config = CatalogConfig::builder()
        .inline_images(true)
        .default_logo("")
        .build()
        .unwrap();
    let mut output = build_catalog(path_str(&path), &config).await.unwrap();

    let loader = SelectiveLoader::new("soap.png", AccessMode::Cors);
    let resolver = ImageResolver::new(loader, &config);
    resolve_output_images(&mut output, &resolver, 2).await;

    let soap = product(&output, "A");
    assert!(soap.image_url.starts_with("data:image/png;base64,"), "got {}", soap.image_url);
    assert!(output.images.iter().all(|o| o.capture_safe));
}

// ── Sharing ──────────────────────────────────────────────────────────────────

struct FakeShortener(Result<String, ShortenError>);

#[async_trait]
impl LinkShortener for FakeShortener {
    async fn shorten(&self, _long_url: &str) -> Result<String, ShortenError> {
        self.0.clone()
    }
}

async fn loaded_session(config: &CatalogConfig) -> CatalogSession {
    let dir = TempDir::new().unwrap();
    let path = write_offers_xlsx(&dir);
    let rows = promo_catalog::pipeline::input::read_sheet(&path, Some("Offers")).await.unwrap();
    let extraction = SchemaMapper::default().map(&rows).unwrap();

    let mut session = CatalogSession::new(config);
    session.load(&extraction, None);
    session
}

#[tokio::test]
async fn test_share_round_trip_full_form() {
    let config = CatalogConfig::builder()
        .share_base_url("https://catalog.example.com/view")
        .build()
        .unwrap();
    let sender = loaded_session(&config).await;
    let link = build_share_link(&sender.share_payload(), &config, None).await.unwrap();
    assert_eq!(link.form, ShareForm::Full);
    assert!(link.url.starts_with("https://catalog.example.com/view?data="));

    let mut viewer = CatalogSession::new(&config);
    viewer.restore(&parse_share_link(&link.url).unwrap()).unwrap();
    assert!(viewer.is_viewer_mode());
    assert_eq!(viewer.title(), sender.title());
    assert_eq!(viewer.products().len(), sender.products().len());
    for (a, b) in sender.products().iter().zip(viewer.products()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.discount_label, b.discount_label);
        assert!((a.final_price - b.final_price).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_share_round_trip_minified_form() {
    let sender = loaded_session(&CatalogConfig::default()).await;
    let payload = sender.share_payload();
    let full: ShareLink = build_share_link(&payload, &CatalogConfig::default(), None)
        .await
        .unwrap();

    let config = CatalogConfig::builder()
        .max_share_url_len(full.url.len() - 1)
        .build()
        .unwrap();
    let link = build_share_link(&payload, &config, None).await.unwrap();
    assert_eq!(link.form, ShareForm::Minified);
    assert!(link.url.len() < full.url.len());

    let mut viewer = CatalogSession::new(&config);
    viewer.restore(&parse_share_link(&link.url).unwrap()).unwrap();
    assert_eq!(viewer.products().len(), 4);
    for (a, b) in sender.products().iter().zip(viewer.products()) {
        assert_eq!(a.sku, b.sku);
        assert_eq!(a.image_url, b.image_url);
        assert_eq!(a.logo_url, b.logo_url);
        assert_eq!(a.discount_label_ar, b.discount_label_ar);
        assert_eq!(a.discount_label, b.discount_label);
        assert!((a.final_price - b.final_price).abs() < 1e-9);
        assert_eq!(b.status, ProductStatus::Completed);
    }
    assert_eq!(viewer.header_logo(), sender.header_logo());
}

#[tokio::test]
async fn test_shortener_failure_keeps_long_link() {
    let config = CatalogConfig::default();
    let payload = loaded_session(&config).await.share_payload();

    let failing = FakeShortener(Err(ShortenError("service down".into())));
    let link = build_share_link(&payload, &config, Some(&failing)).await.unwrap();
    assert!(!link.shortened);
    assert_eq!(link.url, link.long_url);

    let working = FakeShortener(Ok("https://is.gd/xyz".into()));
    let link = build_share_link(&payload, &config, Some(&working)).await.unwrap();
    assert!(link.shortened);
    assert_eq!(link.url, "https://is.gd/xyz");
}

// ── Export ───────────────────────────────────────────────────────────────────

struct PdfCapture {
    seen: Mutex<Option<(String, usize)>>,
}

#[async_trait]
impl DocumentCapture for PdfCapture {
    async fn capture(&self, region_id: &str, catalog: &Catalog) -> Result<Vec<u8>, CaptureError> {
        *self.seen.lock().unwrap() = Some((region_id.to_string(), catalog.product_count()));
        Ok(b"%PDF-1.7\n%%EOF\n".to_vec())
    }
}

#[tokio::test]
async fn test_export_document() {
    let dir = TempDir::new().unwrap();
    let path = write_offers_xlsx(&dir);
    let output = build_catalog(path_str(&path), &offers_config()).await.unwrap();

    let capture = PdfCapture { seen: Mutex::new(None) };
    let out_dir = dir.path().join("exports");
    let written = export_document(&output.catalog, &capture, &out_dir).await.unwrap();

    assert_eq!(written, out_dir.join("Promo Magazine COP-5.pdf"));
    assert!(std::fs::read(&written).unwrap().starts_with(b"%PDF"));
    assert_eq!(
        *capture.seen.lock().unwrap(),
        Some(("magazine-content".to_string(), 4))
    );
}
