use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::{OrderRecord, ValidationWarning};
use crate::error::AppError;
use crate::normalize::timestamps::canonicalize_timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderImportSummary {
    pub records: Vec<OrderRecord>,
    /// 1-based line numbers that did not make it into `records`, for a single input.
    pub skipped_lines: Vec<usize>,
    /// Skipped line numbers per file path, for directory loads.
    #[serde(default)]
    pub skipped_by_file: BTreeMap<String, Vec<usize>>,
    pub warnings: Vec<ValidationWarning>,
    /// sha256 over the raw input, hex encoded.
    pub source_sha256: String,
}

impl OrderImportSummary {
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            skipped_lines: Vec::new(),
            skipped_by_file: BTreeMap::new(),
            warnings: Vec::new(),
            source_sha256: hex::encode(Sha256::digest(b"")),
        }
    }

    fn extend(&mut self, other: OrderImportSummary, seen: &mut BTreeSet<String>) {
        for rec in other.records {
            if seen.insert(rec.order_id.clone()) {
                self.records.push(rec);
            } else {
                self.warnings.push(
                    ValidationWarning::new(
                        "INGEST_DUPLICATE_ORDER_ID",
                        "Duplicate order_id across files; keeping first occurrence",
                    )
                    .with_details(format!("order_id={}", rec.order_id)),
                );
            }
        }
        self.warnings.extend(other.warnings);
    }
}

/// Parse newline-delimited order records.
///
/// Records are expected to be validated and masked upstream. Lines that still fail to
/// deserialize are skipped with an `INGEST_LINE_MALFORMED` warning so they never reach
/// document building. The first occurrence of an `order_id` wins.
pub fn parse_orders_ndjson(text: &str) -> OrderImportSummary {
    let mut out = OrderImportSummary::empty();
    out.source_sha256 = hex::encode(Sha256::digest(text.as_bytes()));

    let mut seen: BTreeSet<String> = BTreeSet::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let mut rec: OrderRecord = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping malformed order line");
                out.skipped_lines.push(line_no);
                out.warnings.push(
                    ValidationWarning::new("INGEST_LINE_MALFORMED", "Order line could not be parsed")
                        .with_details(format!("line={line_no}; err={e}")),
                );
                continue;
            }
        };

        let field = format!("created_at (line {line_no})");
        match canonicalize_timestamp(&field, &rec.created_at, &mut out.warnings) {
            Some(canon) => rec.created_at = canon,
            None => {
                out.skipped_lines.push(line_no);
                continue;
            }
        }

        if !seen.insert(rec.order_id.clone()) {
            out.skipped_lines.push(line_no);
            out.warnings.push(
                ValidationWarning::new(
                    "INGEST_DUPLICATE_ORDER_ID",
                    "Duplicate order_id; keeping first occurrence",
                )
                .with_details(format!("line={line_no}; order_id={}", rec.order_id)),
            );
            continue;
        }

        out.records.push(rec);
    }

    debug!(
        records = out.records.len(),
        skipped = out.skipped_lines.len(),
        "parsed order ndjson"
    );
    out
}

pub fn load_orders_ndjson(path: &Path) -> Result<OrderImportSummary, AppError> {
    let text = fs::read_to_string(path).map_err(|e| {
        AppError::new("INGEST_READ_FAILED", "Failed to read order file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    let summary = parse_orders_ndjson(&text);
    info!(
        path = %path.display(),
        records = summary.records.len(),
        skipped = summary.skipped_lines.len(),
        "loaded orders"
    );
    Ok(summary)
}

/// `*.ndjson` files under `root`, sorted by path. Symlinks are not followed, so a link
/// cycle cannot revisit a directory. Unreadable entries below the root become warnings.
fn collect_ndjson_files(
    root: &Path,
) -> Result<(Vec<PathBuf>, Vec<ValidationWarning>), AppError> {
    let mut files = Vec::new();
    let mut warnings = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => {
                return Err(AppError::new("INGEST_READ_FAILED", "Failed to list order directory")
                    .with_details(format!("path={}; err={}", root.display(), e)));
            }
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                warn!(path = %path, error = %e, "skipping unreadable directory entry");
                warnings.push(
                    ValidationWarning::new("INGEST_READ_FAILED", "Directory entry could not be read")
                        .with_details(format!("path={path}; err={e}")),
                );
                continue;
            }
        };
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("ndjson")
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok((files, warnings))
}

/// Load every `*.ndjson` file under `root` (recursively, sorted by path).
///
/// `skipped_lines` stays empty here: line numbers are only meaningful per file, so they are
/// reported in `skipped_by_file` keyed by path. Warnings carry the path as well.
pub fn load_orders_dir(root: &Path) -> Result<OrderImportSummary, AppError> {
    let (files, walk_warnings) = collect_ndjson_files(root)?;
    let mut out = OrderImportSummary::empty();
    out.warnings = walk_warnings;
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut hasher = Sha256::new();

    for path in files.iter() {
        let mut one = load_orders_ndjson(path)?;
        hasher.update(one.source_sha256.as_bytes());
        for w in one.warnings.iter_mut() {
            let d = w.details.take().unwrap_or_default();
            w.details = Some(format!("path={}; {d}", path.display()));
        }
        let lines = std::mem::take(&mut one.skipped_lines);
        if !lines.is_empty() {
            out.skipped_by_file.insert(path.display().to_string(), lines);
        }
        out.extend(one, &mut seen);
    }

    if files.is_empty() {
        warn!(path = %root.display(), "no ndjson files found");
    }
    out.source_sha256 = hex::encode(hasher.finalize());
    Ok(out)
}
