//! Input resolution: normalise a user-supplied path or URL to a local
//! spreadsheet and read its first (or named) sheet into rows of [`Cell`]s.
//!
//! Workbooks (`.xlsx`, `.xls`, `.xlsb`, `.ods`) are read with calamine; plain
//! `.csv` / `.tsv` exports with the csv crate. Both readers are blocking, so
//! [`read_sheet`] runs them on tokio's blocking pool.

use crate::error::CatalogError;
use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// One heterogeneous spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// Stringify the way a spreadsheet would display the raw value.
    ///
    /// Integral numbers print without a fractional part (`10`, not `10.0`)
    /// so SKUs and month numbers survive the round trip through text.
    pub fn to_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                    format!("{:.0}", n)
                } else {
                    n.to_string()
                }
            }
            Cell::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }

    /// True for empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<&Data> for Cell {
    fn from(d: &Data) -> Self {
        match d {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Bool(*b),
            // Keep the serial number: month derivation understands serials.
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        }
    }
}

/// A sheet as rows of cells; rows may have different lengths.
pub type SheetRows = Vec<Vec<Cell>>;

/// A local spreadsheet path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the spreadsheet was downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until reading completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the spreadsheet regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local spreadsheet path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, CatalogError> {
    if input.trim().is_empty() {
        return Err(CatalogError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, CatalogError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(CatalogError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(CatalogError::PermissionDenied { path });
        }
        Err(_) => return Err(CatalogError::FileNotFound { path }),
    }

    SheetFormat::from_path(&path)?;
    debug!("Resolved local spreadsheet: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, CatalogError> {
    info!("Downloading spreadsheet from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CatalogError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            CatalogError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            CatalogError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(CatalogError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let filename = extract_filename(url, &content_type);

    let temp_dir = TempDir::new().map_err(|e| CatalogError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| CatalogError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| CatalogError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Pick a filename whose extension selects the right reader.
fn extract_filename(url: &str, content_type: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && SheetFormat::from_path(Path::new(last)).is_ok() {
                    return last.to_string();
                }
            }
        }
    }

    if content_type.starts_with("text/csv") {
        "downloaded.csv".to_string()
    } else {
        "downloaded.xlsx".to_string()
    }
}

/// Reader selected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Workbook,
    Delimited(u8),
}

impl SheetFormat {
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "xla" | "xlam" | "ods" => Ok(SheetFormat::Workbook),
            "csv" => Ok(SheetFormat::Delimited(b',')),
            "tsv" => Ok(SheetFormat::Delimited(b'\t')),
            _ => Err(CatalogError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Read a sheet into rows of cells on the blocking pool.
pub async fn read_sheet(path: &Path, sheet: Option<&str>) -> Result<SheetRows, CatalogError> {
    let path = path.to_path_buf();
    let sheet = sheet.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || read_sheet_blocking(&path, sheet.as_deref()))
        .await
        .map_err(|e| CatalogError::Internal(format!("Sheet reader task panicked: {}", e)))?
}

/// Blocking implementation of [`read_sheet`].
pub fn read_sheet_blocking(path: &Path, sheet: Option<&str>) -> Result<SheetRows, CatalogError> {
    let rows = match SheetFormat::from_path(path)? {
        SheetFormat::Workbook => read_workbook(path, sheet)?,
        SheetFormat::Delimited(delimiter) => read_delimited(path, delimiter)?,
    };

    if rows.is_empty() || rows.iter().all(|r| r.iter().all(Cell::is_blank)) {
        return Err(CatalogError::EmptySpreadsheet {
            path: path.to_path_buf(),
        });
    }

    info!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<SheetRows, CatalogError> {
    let unreadable = |detail: String| CatalogError::SpreadsheetUnreadable {
        path: path.to_path_buf(),
        detail,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| unreadable(e.to_string()))?;

    let range = match sheet {
        Some(name) => workbook
            .worksheet_range(name)
            .map_err(|e| unreadable(format!("sheet '{name}': {e}")))?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| unreadable("workbook has no sheets".to_string()))?
            .map_err(|e| unreadable(e.to_string()))?,
    };

    debug!(
        "Workbook range: {} rows × {} columns",
        range.height(),
        range.width()
    );

    Ok(range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect())
        .collect())
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<SheetRows, CatalogError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| CatalogError::SpreadsheetUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| CatalogError::SpreadsheetUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        rows.push(record.iter().map(Cell::from).collect());
    }
    Ok(rows)
}
