//! # Receipt extraction
//!
//! Works on the word level output of `tesseract <image> - tsv`. Words are grouped
//! into visual rows by their `top` coordinate, then each row is searched for the
//! reference, amount, charge and payment time. The first row that yields a value
//! wins for that field.
//!
//! Receipt times are printed in Nepal time (UTC+05:45) and returned as UTC.
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ReceiptError;

/// Words whose `top` is within this many pixels share a row.
pub const ROW_TOLERANCE: i32 = 10;

const KATHMANDU_OFFSET_SECONDS: i32 = 5 * 3600 + 45 * 60;

const LOCAL_FORMATS: [&str; 10] = [
    "%d %b %Y, %I:%M %p",
    "%d %b %Y,%I:%M %p",
    "%d %b %Y, %H:%M",
    "%d %b %Y,%H:%M",
    "%d-%b-%Y %I:%M %p",
    "%d-%b-%Y,%I:%M %p",
    "%d-%b-%Y %H:%M",
    "%d-%b-%Y,%H:%M",
    "%d %b %Y %I:%M %p",
    "%d %b %Y %H:%M",
];

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Reference Code|Transaction Number|Transaction ID|TXN ID)\s*[:\-]?\s*([A-Za-z0-9\-_/]+)")
        .expect("reference pattern")
});

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Transaction Amount|Txn Amount|Total Amount|Amount|NPR)\s*(?:\([A-Z]{3}\))?\s*([\d,]+(?:\.\d{2})?)")
        .expect("amount pattern")
});

static CHARGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Charge|Change)\s*(?:\([A-Z]{3}\))?\s*([\d,]+(?:\.\d{2})?)")
        .expect("charge pattern")
});

static LABELLED_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Payment Time|Date\s*/?\s*Time|Transaction Date)\s*[:\-]?\s*([0-9]{1,2}[-\s][A-Za-z]{3}[-\s][0-9]{4},?\s*[0-9]{1,2}:[0-9]{2}\s*(?:AM|PM)?)")
        .expect("labelled date pattern")
});

static BARE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([0-9]{1,2}[-/\.\s]?[A-Za-z]{3}[-/\.\s]?[0-9]{4},?\s*[0-9]{1,2}:[0-9]{2}\s*(?:AM|PM)?)\b")
        .expect("date pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrWord {
    pub text: String,
    pub top: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptDetails {
    pub amount: Option<Decimal>,
    pub charge: Option<Decimal>,
    pub date: Option<DateTime<Utc>>,
    pub reference: Option<String>,
}

impl ReceiptDetails {
    fn merge(&mut self, row: ReceiptDetails) {
        self.amount = self.amount.or(row.amount);
        self.charge = self.charge.or(row.charge);
        self.date = self.date.or(row.date);
        if self.reference.is_none() {
            self.reference = row.reference;
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &ReceiptDetails::default()
    }
}

pub fn parse_tesseract_tsv(tsv: &str) -> Result<Vec<OcrWord>, ReceiptError> {
    let mut lines = tsv.lines().enumerate().filter(|(_, line)| !line.trim().is_empty());

    let (_, header) = lines.next().ok_or(ReceiptError::MissingColumn("top"))?;
    let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
    let column = |name: &'static str| {
        columns
            .iter()
            .position(|column| *column == name)
            .ok_or(ReceiptError::MissingColumn(name))
    };
    let top_index = column("top")?;
    let text_index = column("text")?;

    let mut words = Vec::new();
    for (index, line) in lines {
        let fields: Vec<&str> = line.split('\t').collect();

        let top = fields
            .get(top_index)
            .and_then(|top| top.trim().parse::<i32>().ok())
            .ok_or(ReceiptError::MalformedLine { line: index + 1 })?;
        let text = fields.get(text_index).copied().unwrap_or_default();

        words.push(OcrWord {
            text: text.to_string(),
            top,
        });
    }

    Ok(words)
}

/// Joins words into visual rows, top to bottom in reading order.
pub fn group_rows(words: &[OcrWord]) -> Vec<String> {
    let mut rows: Vec<(i32, Vec<&str>)> = Vec::new();

    for word in words {
        if word.text.trim().is_empty() {
            continue;
        }

        match rows
            .iter_mut()
            .find(|(y, _)| (y - word.top).abs() <= ROW_TOLERANCE)
        {
            Some((_, texts)) => texts.push(word.text.as_str()),
            None => rows.push((word.top, vec![word.text.as_str()])),
        }
    }

    rows.into_iter()
        .map(|(_, texts)| normalize_row(&texts.join(" ")))
        .collect()
}

fn normalize_row(text: &str) -> String {
    text.replace('|', " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn capture<'a>(pattern: &Regex, text: &'a str) -> Option<&'a str> {
    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str())
}

/// Zero amounts count as missing.
fn parse_amount(text: &str) -> Option<Decimal> {
    text.replace(',', "")
        .parse::<Decimal>()
        .ok()
        .filter(|amount| !amount.is_zero())
}

pub fn extract_row(row: &str) -> ReceiptDetails {
    let text = normalize_row(row);

    let date = capture(&LABELLED_DATE, &text)
        .or_else(|| capture(&BARE_DATE, &text))
        .and_then(parse_local_datetime);

    ReceiptDetails {
        amount: capture(&AMOUNT, &text).and_then(parse_amount),
        charge: capture(&CHARGE, &text).and_then(parse_amount),
        date,
        reference: capture(&REFERENCE, &text).map(str::to_string),
    }
}

pub fn extract_details(rows: &[String]) -> ReceiptDetails {
    let mut details = ReceiptDetails::default();

    for row in rows {
        details.merge(extract_row(row));
    }

    details
}

pub fn extract_from_tsv(tsv: &str) -> Result<ReceiptDetails, ReceiptError> {
    let words = parse_tesseract_tsv(tsv)?;

    Ok(extract_details(&group_rows(&words)))
}

/// Parses a receipt timestamp printed in Nepal time.
pub fn parse_local_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    let offset = FixedOffset::east_opt(KATHMANDU_OFFSET_SECONDS)?;

    let parsed = LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok());

    match parsed {
        Some(local) => offset
            .from_local_datetime(&local)
            .single()
            .map(|at| at.with_timezone(&Utc)),
        None => {
            warn!("Unrecognized receipt date format: {text}");
            None
        }
    }
}
