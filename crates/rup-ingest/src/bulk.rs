//! Bulk CSV import parser.
//!
//! Input is a text blob whose header row declares the column names.  The
//! header is matched against a small alias table, case- and
//! punctuation-insensitively, so `"Merchant Name"`, `merchant_name`, and
//! `Payee` all bind the merchant column.
//!
//! ## Column contract
//!
//! | Field       | Required | Accepted aliases (normalized)                  |
//! |-------------|----------|------------------------------------------------|
//! | date        | yes      | date, transactiondate, posteddate, txndate     |
//! | merchant    | yes      | merchant, merchantname, payee, vendor, store   |
//! | amount      | yes      | amount, amt, total, price, value, debit        |
//! | category    | no       | category, cat, type                            |
//! | confidence  | no       | confidence, conf                               |
//! | notes       | no       | notes, note, memo, description, desc           |
//!
//! A missing required column is structural: the whole batch aborts before
//! any row is processed.  Everything else is a per-row error carrying the
//! 1-based source line number (header = line 1) — the batch continues.

use std::fmt;

use chrono::NaiveDate;

use rup_schemas::{Cents, TxSource};

use crate::row::PurchaseRow;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Structural errors that abort a bulk batch before any row is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkError {
    /// The blob could not be read as CSV at all.
    Malformed(String),
    /// The header row lacks a required column.
    MissingColumn(&'static str),
}

impl fmt::Display for BulkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkError::Malformed(msg) => write!(f, "bulk csv is malformed: {msg}"),
            BulkError::MissingColumn(col) => {
                write!(f, "bulk csv header is missing required column '{col}'")
            }
        }
    }
}

impl std::error::Error for BulkError {}

/// One rejected row: 1-based source line plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A parsed bulk row with its source line, for dedup/summary reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRow {
    pub line: usize,
    pub row: PurchaseRow,
    /// Optional confidence column value, validated to `[0, 1]` when present.
    pub confidence_hint: Option<f64>,
}

/// Everything a bulk parse produces: accepted rows in input order plus
/// per-row rejections.
#[derive(Debug, Clone, Default)]
pub struct BulkRows {
    pub rows: Vec<BulkRow>,
    pub errors: Vec<RowError>,
}

// ---------------------------------------------------------------------------
// Header alias table
// ---------------------------------------------------------------------------

const DATE_ALIASES: &[&str] = &["date", "transactiondate", "posteddate", "txndate"];
const MERCHANT_ALIASES: &[&str] = &["merchant", "merchantname", "payee", "vendor", "store"];
const AMOUNT_ALIASES: &[&str] = &["amount", "amt", "total", "price", "value", "debit"];
const CATEGORY_ALIASES: &[&str] = &["category", "cat", "type"];
const CONFIDENCE_ALIASES: &[&str] = &["confidence", "conf"];
const NOTES_ALIASES: &[&str] = &["notes", "note", "memo", "description", "desc"];

/// Lowercase and drop everything that is not a letter or digit, so
/// `"Merchant Name"` and `merchant_name` normalize identically.
fn normalize_header(cell: &str) -> String {
    cell.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

#[derive(Debug)]
struct ColumnMap {
    date: usize,
    merchant: usize,
    amount: usize,
    category: Option<usize>,
    confidence: Option<usize>,
    notes: Option<usize>,
}

fn build_column_map(header: &csv::StringRecord) -> Result<ColumnMap, BulkError> {
    let normalized: Vec<String> = header.iter().map(normalize_header).collect();

    let find = |aliases: &[&str]| -> Option<usize> {
        normalized
            .iter()
            .position(|cell| aliases.contains(&cell.as_str()))
    };

    Ok(ColumnMap {
        date: find(DATE_ALIASES).ok_or(BulkError::MissingColumn("date"))?,
        merchant: find(MERCHANT_ALIASES).ok_or(BulkError::MissingColumn("merchant"))?,
        amount: find(AMOUNT_ALIASES).ok_or(BulkError::MissingColumn("amount"))?,
        category: find(CATEGORY_ALIASES),
        confidence: find(CONFIDENCE_ALIASES),
        notes: find(NOTES_ALIASES),
    })
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Accepted row dates: ISO or US.
pub fn parse_row_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}

/// Parse a bulk CSV blob.
///
/// Returns `Err` only for structural problems (unreadable CSV, missing
/// required columns).  Row-level failures land in [`BulkRows::errors`] and
/// never stop the batch.
pub fn parse_bulk_csv(src: &str) -> Result<BulkRows, BulkError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(src.as_bytes());

    let header = reader
        .headers()
        .map_err(|e| BulkError::Malformed(e.to_string()))?
        .clone();
    if header.is_empty() || (header.len() == 1 && header[0].is_empty()) {
        return Err(BulkError::MissingColumn("date"));
    }
    let cols = build_column_map(&header)?;

    let mut out = BulkRows::default();

    // Header occupies line 1; the first record is line 2.
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                out.errors.push(RowError {
                    line,
                    message: format!("unreadable row: {e}"),
                });
                continue;
            }
        };

        // A fully blank line is skipped silently, not an error.
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        match parse_record(&record, &cols) {
            Ok((row, confidence_hint)) => out.rows.push(BulkRow {
                line,
                row,
                confidence_hint,
            }),
            Err(message) => out.errors.push(RowError { line, message }),
        }
    }

    Ok(out)
}

fn parse_record(
    record: &csv::StringRecord,
    cols: &ColumnMap,
) -> Result<(PurchaseRow, Option<f64>), String> {
    let cell = |i: usize| record.get(i).unwrap_or("").trim();

    let merchant = cell(cols.merchant);
    if merchant.is_empty() {
        return Err("merchant is empty".to_string());
    }

    let date_raw = cell(cols.date);
    let date = parse_row_date(date_raw)
        .ok_or_else(|| format!("invalid date '{date_raw}' (expected YYYY-MM-DD or MM/DD/YYYY)"))?;

    let amount_raw = cell(cols.amount);
    let amount = Cents::from_str_decimal(amount_raw)
        .map_err(|_| format!("invalid amount '{amount_raw}'"))?;
    if amount <= Cents::ZERO {
        return Err(format!("amount must be positive, got '{amount_raw}'"));
    }

    let category = cols
        .category
        .map(|i| cell(i).to_string())
        .filter(|s| !s.is_empty());
    let description = cols
        .notes
        .map(|i| cell(i).to_string())
        .filter(|s| !s.is_empty());

    let confidence_hint = match cols.confidence.map(|i| cell(i)).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let v: f64 = raw
                .parse()
                .map_err(|_| format!("invalid confidence '{raw}'"))?;
            if !(0.0..=1.0).contains(&v) {
                return Err(format!("confidence '{raw}' outside [0, 1]"));
            }
            Some(v)
        }
        None => None,
    };

    Ok((
        PurchaseRow {
            merchant: merchant.to_string(),
            date,
            amount,
            category,
            description,
            source: TxSource::Bulk,
        },
        confidence_hint,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_aliases_match_fuzzily() {
        let src = "Posted Date,Merchant Name,Total,Memo\n2024-03-14,Starbucks,4.35,latte\n";
        let parsed = parse_bulk_csv(src).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert!(parsed.errors.is_empty());
        let r = &parsed.rows[0];
        assert_eq!(r.row.merchant, "Starbucks");
        assert_eq!(r.row.amount, Cents::new(435));
        assert_eq!(r.row.description.as_deref(), Some("latte"));
        assert_eq!(r.line, 2);
    }

    #[test]
    fn missing_required_column_is_structural() {
        let err = parse_bulk_csv("date,category\n2024-01-01,coffee\n").unwrap_err();
        assert_eq!(err, BulkError::MissingColumn("merchant"));
    }

    #[test]
    fn both_date_formats_accepted() {
        let src = "date,merchant,amount\n2024-03-14,A,1.10\n03/14/2024,B,2.20\n";
        let parsed = parse_bulk_csv(src).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].row.date, parsed.rows[1].row.date);
    }

    #[test]
    fn bad_amount_is_a_row_error_citing_the_file_line() {
        // Three data rows; the second has an unparsable amount.  With the
        // header on line 1, that row is file line 3.
        let src = "date,merchant,amount\n\
                   2024-03-14,Alpha,4.35\n\
                   2024-03-14,Beta,not-a-number\n\
                   2024-03-14,Gamma,7.00\n";
        let parsed = parse_bulk_csv(src).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].line, 3);
        assert!(parsed.errors[0].message.contains("not-a-number"));
    }

    #[test]
    fn bad_date_and_negative_amount_are_row_errors() {
        let src = "date,merchant,amount\n\
                   14-03-2024,Alpha,4.35\n\
                   2024-03-14,Beta,-2.00\n";
        let parsed = parse_bulk_csv(src).unwrap();
        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.errors.len(), 2);
        assert_eq!(parsed.errors[0].line, 2);
        assert_eq!(parsed.errors[1].line, 3);
    }

    #[test]
    fn quoted_merchant_with_comma_survives() {
        let src = "date,merchant,amount\n2024-03-14,\"Smith, Jones & Co\",12.01\n";
        let parsed = parse_bulk_csv(src).unwrap();
        assert_eq!(parsed.rows[0].row.merchant, "Smith, Jones & Co");
    }

    #[test]
    fn confidence_column_is_validated_when_present() {
        let src = "date,merchant,amount,confidence\n\
                   2024-03-14,Alpha,4.35,0.92\n\
                   2024-03-14,Beta,4.35,1.7\n";
        let parsed = parse_bulk_csv(src).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].confidence_hint, Some(0.92));
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].line, 3);
    }

    #[test]
    fn blank_lines_are_skipped_silently() {
        let src = "date,merchant,amount\n2024-03-14,Alpha,4.35\n,,\n";
        let parsed = parse_bulk_csv(src).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert!(parsed.errors.is_empty());
    }
}
