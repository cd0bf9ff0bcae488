//! CLI binary for promo-catalog.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `CatalogConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use promo_catalog::pipeline::schema::Field;
use promo_catalog::{
    apply_resolutions, build_catalog, build_share_link, inspect_with, parse_share_link, resolve_stream,
    write_output, CatalogConfig, CatalogOutput, CatalogSession, CatalogStats, FailureReport, HttpShortener,
    ImageResolver, LinkShortener, ProductCard, ProgressCallback, ResolutionProgressCallback, SharePayload,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI progress reporting using indicatif ───────────────────────────────────

/// Progress bar advanced once per settled image; exhausted product images
/// are logged above the bar.
struct CliProgressCallback {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Images");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        })
    }
}

impl ResolutionProgressCallback for CliProgressCallback {
    fn on_resolution_start(&self, total_images: usize) {
        self.bar.set_length(total_images as u64);
    }

    fn on_image_failed(&self, key: &str, report: &FailureReport) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        let reference: String = report.original_reference.chars().take(70).collect();
        self.bar.println(format!(
            "  {} {}  {}  {}",
            red("✗"),
            key,
            dim(&reference),
            dim(&format!("id: {}", report.extracted_id.as_deref().unwrap_or("-"))),
        ));
    }

    fn on_resolution_complete(&self, total_images: usize, loaded: usize) {
        self.bar.finish_and_clear();
        let failed = total_images.saturating_sub(loaded);
        if failed == 0 {
            eprintln!("{} {} images resolved", green("✔"), bold(&loaded.to_string()));
        } else {
            eprintln!(
                "{} {}/{} images resolved  ({} placeholders)",
                yellow("⚠"),
                bold(&loaded.to_string()),
                total_images,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Summary of a spreadsheet
  promo-catalog offers.xlsx

  # Catalog JSON for the renderer
  promo-catalog offers.xlsx -o catalog.json

  # Force the campaign month and use a named worksheet
  promo-catalog --month July --sheet "Week 2" offers.xlsx -o catalog.json

  # Resolve every image, inlining them for capture
  promo-catalog --resolve-images --inline-images offers.xlsx -o catalog.json

  # Check header detection and column mapping only
  promo-catalog --inspect-only offers.csv

  # Produce a share link, shortened if possible
  promo-catalog --share --shortener "https://is.gd/create.php?format=simple&url=" offers.xlsx

  # Open a share link again
  promo-catalog --restore --json "https://catalog.example.com/?data=..."

RECOGNISED COLUMNS (case-insensitive, any order):
  SKU          SKU, Item Code, Code, Article No            (required)
  Name         Name, Product Name, Description, Title      (required)
  Price        Price, Original Price, Regular Price, RRP   (required)
  Final Price  Final Price, Sale Price, New Price
  Mechanics    Mechanics, Promo, Offer, Promotion, Details
  Image, Logo, Arabic Name, Arabic Mechanics, Month, Product Page

DIRECTIVE ROWS:
  SKU "logo"   Image cell replaces the header logo
  SKU "cover"  Image cell becomes the cover art
"#;

/// Build print-ready promotion catalogs from product spreadsheets.
#[derive(Parser, Debug)]
#[command(
    name = "promo-catalog",
    version,
    about = "Build print-ready promotion catalogs from product spreadsheets",
    long_about = "Map a loosely structured product spreadsheet (xlsx, xls, ods, csv) onto a \
catalog schema, derive discount labels and final prices from promotion mechanics, resolve \
product images through a chain of fallback endpoints, and emit catalog JSON or share links.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Spreadsheet path or HTTP/HTTPS URL (a share link or token with --restore).
    input: String,

    /// Write catalog JSON to this file instead of printing a summary.
    #[arg(short, long, env = "PROMO_CATALOG_OUTPUT")]
    output: Option<PathBuf>,

    /// Campaign month; overrides any Month column.
    #[arg(long, env = "PROMO_CATALOG_MONTH")]
    month: Option<String>,

    /// Worksheet name (first sheet if omitted).
    #[arg(long, env = "PROMO_CATALOG_SHEET")]
    sheet: Option<String>,

    /// Products per page.
    #[arg(long, env = "PROMO_CATALOG_PAGE_SIZE", default_value_t = 6)]
    page_size: usize,

    /// VAT rate included in sheet prices.
    #[arg(long, env = "PROMO_CATALOG_VAT_RATE", default_value_t = promo_catalog::DEFAULT_VAT_RATE)]
    vat_rate: f64,

    /// Fetch every image and rewrite the catalog to working URLs.
    #[arg(long, env = "PROMO_CATALOG_RESOLVE_IMAGES")]
    resolve_images: bool,

    /// Embed fetched images as data: URIs (implies --resolve-images).
    #[arg(long, env = "PROMO_CATALOG_INLINE_IMAGES")]
    inline_images: bool,

    /// Image-rewriting proxy tried after the first direct attempt.
    #[arg(long, env = "PROMO_CATALOG_PROXY")]
    proxy: Option<String>,

    /// Number of images resolved concurrently.
    #[arg(short, long, env = "PROMO_CATALOG_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Per-attempt image fetch timeout in seconds.
    #[arg(long, env = "PROMO_CATALOG_IMAGE_TIMEOUT", default_value_t = 30)]
    image_timeout: u64,

    /// Origin sent on cross-origin image fetches.
    #[arg(long, env = "PROMO_CATALOG_CORS_ORIGIN")]
    cors_origin: Option<String>,

    /// Print a share link for the catalog.
    #[arg(long, env = "PROMO_CATALOG_SHARE")]
    share: bool,

    /// Viewer URL the share token is appended to.
    #[arg(long, env = "PROMO_CATALOG_SHARE_BASE")]
    share_base: Option<String>,

    /// Link shortener endpoint; the encoded long link is appended.
    #[arg(long, env = "PROMO_CATALOG_SHORTENER")]
    shortener: Option<String>,

    /// Treat INPUT as a share link or token and open it in viewer mode.
    #[arg(long)]
    restore: bool,

    /// Print header detection and column mapping only.
    #[arg(long)]
    inspect_only: bool,

    /// Output structured JSON (CatalogOutput) instead of a summary.
    #[arg(long, env = "PROMO_CATALOG_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PROMO_CATALOG_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PROMO_CATALOG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PROMO_CATALOG_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PROMO_CATALOG_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let resolve_images = cli.resolve_images || cli.inline_images;

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs while images resolve.
    let show_progress = resolve_images && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(&cli, progress.clone().map(|cb| cb as ProgressCallback))?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let report = inspect_with(&cli.input, &config)
            .await
            .context("Failed to inspect spreadsheet")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        } else {
            println!("File:         {}", cli.input);
            println!("Header row:   {}", report.header_row + 1);
            println!("Data rows:    {}", report.data_rows);
            for field in Field::ALL {
                let column = report
                    .columns
                    .get(field)
                    .and_then(|i| report.headers.get(i).map(|h| format!("col {} \"{}\"", i + 1, h)))
                    .unwrap_or_else(|| dim("-"));
                println!("  {:<13} {}", field.label(), column);
            }
            if !report.missing.is_empty() {
                println!("{} missing required: {}", red("✘"), report.missing.join(", "));
            }
        }
        return Ok(());
    }

    // ── Build or restore ─────────────────────────────────────────────────
    let mut output = if cli.restore {
        let payload = parse_share_link(&cli.input).context("Failed to read share link")?;
        restore_output(&payload, &config)?
    } else {
        build_catalog(&cli.input, &config)
            .await
            .context("Failed to build catalog")?
    };

    // Share before image resolution: inlined images would bloat the token.
    let share_link = if cli.share {
        let catalog = &output.catalog;
        let payload = SharePayload::new(
            &catalog.title,
            &catalog.header_logo,
            catalog.cover.as_deref(),
            catalog.products().cloned().collect(),
        );
        let shortener = match &config.shortener_endpoint {
            Some(endpoint) => Some(HttpShortener::new(endpoint, 15).context("Failed to set up shortener")?),
            None => None,
        };
        let link = build_share_link(&payload, &config, shortener.as_ref().map(|s| s as &dyn LinkShortener))
            .await
            .context("Failed to build share link")?;
        Some(link)
    } else {
        None
    };

    if resolve_images {
        let resolver = ImageResolver::from_config(&config).context("Failed to set up image resolver")?;
        let total = promo_catalog::resolver::collect_image_jobs(&output.catalog).len();
        if let Some(cb) = &progress {
            cb.on_resolution_start(total);
        }

        let mut images = Vec::with_capacity(total);
        let mut stream = resolve_stream(&output.catalog, &resolver, config.image_concurrency);
        while let Some(outcome) = stream.next().await {
            if let Some(cb) = &progress {
                cb.bar.inc(1);
            }
            images.push(outcome);
        }

        apply_resolutions(&mut output.catalog, &images);
        output.stats.images_total = images.len();
        output.stats.images_loaded = images.iter().filter(|o| o.is_loaded()).count();
        if let Some(cb) = &progress {
            cb.on_resolution_complete(output.stats.images_total, output.stats.images_loaded);
        }
        output.images = images;
    }

    // ── Emit ─────────────────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        write_output(&output, output_path)
            .await
            .context("Failed to write catalog")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} products  {} pages  {}ms  →  {}",
                green("✔"),
                output.stats.products,
                output.stats.pages,
                output.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output);
    }

    if let Some(link) = share_link {
        println!("{}", link.url);
        if !cli.quiet && link.shortened {
            eprintln!("   {}", dim(&format!("long link: {} chars", link.long_url.len())));
        }
    }

    Ok(())
}

/// Map CLI args to `CatalogConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<CatalogConfig> {
    let mut builder = CatalogConfig::builder()
        .page_size(cli.page_size)
        .vat_rate(cli.vat_rate)
        .image_concurrency(cli.concurrency)
        .image_timeout_secs(cli.image_timeout)
        .inline_images(cli.inline_images)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref month) = cli.month {
        builder = builder.manual_month(month.clone());
    }
    if let Some(ref sheet) = cli.sheet {
        builder = builder.sheet(sheet.clone());
    }
    if let Some(ref proxy) = cli.proxy {
        builder = builder.proxy_base(proxy.clone());
    }
    if let Some(ref origin) = cli.cors_origin {
        builder = builder.cors_origin(origin.clone());
    }
    if let Some(ref base) = cli.share_base {
        builder = builder.share_base_url(base.clone());
    }
    if let Some(ref endpoint) = cli.shortener {
        builder = builder.shortener_endpoint(endpoint.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Catalog output for a restored share link.
fn restore_output(payload: &SharePayload, config: &CatalogConfig) -> Result<CatalogOutput> {
    let mut session = CatalogSession::new(config);
    session.restore(payload).context("Failed to restore shared catalog")?;
    let catalog = session.catalog();
    let stats = CatalogStats {
        products: catalog.product_count(),
        pages: catalog.pages.len(),
        ..CatalogStats::default()
    };
    Ok(CatalogOutput {
        catalog,
        columns: Default::default(),
        stats,
        images: Vec::new(),
    })
}

fn print_summary(output: &CatalogOutput) {
    let catalog = &output.catalog;
    println!("{}", bold(&catalog.title));
    if catalog.viewer_mode {
        println!("{}", dim("(shared catalog, viewer mode)"));
    }
    for page in &catalog.pages {
        println!("{}", dim(&format!("── Page {} ──", page.number)));
        for product in &page.products {
            let card = ProductCard::from(product);
            let label = card.label.as_deref().unwrap_or(card.badge_text);
            let was = card
                .savings
                .as_ref()
                .map(|s| dim(&format!(" (was {}, save {})", s.was, s.amount)))
                .unwrap_or_default();
            let status = match &product.error {
                Some(e) => format!("  {}", red(e)),
                None => String::new(),
            };
            println!(
                "  {:<12} {:<32} {:<18} {}.{}{}{}",
                card.sku_line.trim_start_matches("SKU: "),
                product.name.chars().take(32).collect::<String>(),
                yellow(label),
                card.price.whole,
                card.price.fraction,
                was,
                status,
            );
        }
    }

    let s = &output.stats;
    eprintln!(
        "{} products on {} pages  {}",
        s.products,
        s.pages,
        dim(&format!(
            "({} skipped, {} directive rows, {} price fallbacks)",
            s.skipped_rows, s.directive_rows, s.price_fallbacks
        )),
    );
}
