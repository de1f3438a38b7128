//! Row validation and sanitization
//!
//! Turns one raw CSV row into either a clean [`ActivityRecord`] or a
//! [`SkipReason`]. Validation never fails the import: structural problems with
//! identity fields skip the row, cosmetic problems are repaired and counted as
//! warnings.
//!
//! # Rules, in order
//! 1. Column names are trimmed, lower-cased and stripped of a UTF-8 BOM
//! 2. `event_id`, `merchant_id`, `product`, `event_type`, `status` are required
//! 3. `event_id` must be a hyphenated UUID (any case)
//! 4. `product` and `status` must be members of their enumerations
//! 5. A `merchant_id` outside `MRC-######` is accepted with a warning
//! 6. Unknown `channel` / `merchant_tier` values are stored as null
//! 7. `amount` drops thousands separators; unparsable is 0, negative clamps to 0
//! 8. `event_timestamp` is ISO-8601; unparsable is null, off-year is flagged

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::models::{round_cents, ActivityRecord, Channel, MerchantTier, Product, Status};

const BOM: char = '\u{feff}';

/// Why a row was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("missing required field")]
    MissingFields,
    #[error("event_id is not a UUID")]
    InvalidUuid,
    #[error("unknown product")]
    InvalidProduct,
    #[error("unknown status")]
    InvalidStatus,
}

/// Problems that were repaired while accepting a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationWarning {
    InvalidMerchantIdFormat,
    InvalidChannel,
    InvalidTier,
    NegativeAmountClamped,
    SuspiciousTimestamp,
}

/// Process-lifetime validation counters
///
/// Shared by every file worker; each counter is an independent atomic.
#[derive(Debug, Default)]
pub struct ValidationStats {
    total: AtomicU64,
    missing_fields: AtomicU64,
    invalid_uuid: AtomicU64,
    invalid_merchant_id: AtomicU64,
    invalid_product: AtomicU64,
    invalid_status: AtomicU64,
    invalid_channel: AtomicU64,
    invalid_tier: AtomicU64,
    negative_amount: AtomicU64,
    suspicious_date: AtomicU64,
}

/// Point-in-time copy of [`ValidationStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSnapshot {
    pub total: u64,
    pub missing_fields: u64,
    pub invalid_uuid: u64,
    pub invalid_merchant_id: u64,
    pub invalid_product: u64,
    pub invalid_status: u64,
    pub invalid_channel: u64,
    pub invalid_tier: u64,
    pub negative_amount: u64,
    pub suspicious_date: u64,
}

impl ValidationSnapshot {
    pub fn skipped(&self) -> u64 {
        self.missing_fields + self.invalid_uuid + self.invalid_product + self.invalid_status
    }
}

impl ValidationStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_skip(&self, reason: SkipReason) {
        let counter = match reason {
            SkipReason::MissingFields => &self.missing_fields,
            SkipReason::InvalidUuid => &self.invalid_uuid,
            SkipReason::InvalidProduct => &self.invalid_product,
            SkipReason::InvalidStatus => &self.invalid_status,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_warning(&self, warning: ValidationWarning) {
        let counter = match warning {
            ValidationWarning::InvalidMerchantIdFormat => &self.invalid_merchant_id,
            ValidationWarning::InvalidChannel => &self.invalid_channel,
            ValidationWarning::InvalidTier => &self.invalid_tier,
            ValidationWarning::NegativeAmountClamped => &self.negative_amount,
            ValidationWarning::SuspiciousTimestamp => &self.suspicious_date,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ValidationSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        ValidationSnapshot {
            total: load(&self.total),
            missing_fields: load(&self.missing_fields),
            invalid_uuid: load(&self.invalid_uuid),
            invalid_merchant_id: load(&self.invalid_merchant_id),
            invalid_product: load(&self.invalid_product),
            invalid_status: load(&self.invalid_status),
            invalid_channel: load(&self.invalid_channel),
            invalid_tier: load(&self.invalid_tier),
            negative_amount: load(&self.negative_amount),
            suspicious_date: load(&self.suspicious_date),
        }
    }
}

/// One row's values, looked up by column
#[derive(Debug, Default)]
struct RawRow<'a> {
    event_id: &'a str,
    merchant_id: &'a str,
    event_timestamp: &'a str,
    product: &'a str,
    event_type: &'a str,
    amount: &'a str,
    status: &'a str,
    channel: &'a str,
    region: &'a str,
    merchant_tier: &'a str,
}

impl<'a> RawRow<'a> {
    /// Column names are matched ignoring case, surrounding whitespace and a
    /// leading BOM, so raw and pre-normalized headers both work.
    fn from_pairs<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, &'a str)>,
        K: AsRef<str>,
    {
        let mut row = RawRow::default();
        for (key, value) in fields {
            let column = key.as_ref().trim_start_matches(BOM).trim();
            if let Some(slot) = row.slot(column) {
                *slot = value.trim();
            }
        }
        row
    }

    fn slot(&mut self, column: &str) -> Option<&mut &'a str> {
        let slots = [
            ("event_id", &mut self.event_id),
            ("merchant_id", &mut self.merchant_id),
            ("event_timestamp", &mut self.event_timestamp),
            ("product", &mut self.product),
            ("event_type", &mut self.event_type),
            ("amount", &mut self.amount),
            ("status", &mut self.status),
            ("channel", &mut self.channel),
            ("region", &mut self.region),
            ("merchant_tier", &mut self.merchant_tier),
        ];
        slots
            .into_iter()
            .find(|(name, _)| column.eq_ignore_ascii_case(name))
            .map(|(_, slot)| slot)
    }
}

/// Normalize a CSV header name: trim, lower-case, drop a byte-order mark
pub fn normalize_column(name: &str) -> String {
    name.trim_start_matches(BOM).trim().to_lowercase()
}

/// Validates rows and keeps the shared counters up to date
#[derive(Debug, Clone)]
pub struct RowValidator {
    stats: Arc<ValidationStats>,
    expected_year: i32,
}

impl RowValidator {
    pub fn new(stats: Arc<ValidationStats>, expected_year: i32) -> Self {
        Self {
            stats,
            expected_year,
        }
    }

    pub fn stats(&self) -> &Arc<ValidationStats> {
        &self.stats
    }

    /// Validate one row given as `(column, value)` pairs
    ///
    /// `row_index` is only used for diagnostics.
    pub fn validate<'a, I, K>(&self, fields: I, row_index: u64) -> Result<ActivityRecord, SkipReason>
    where
        I: IntoIterator<Item = (K, &'a str)>,
        K: AsRef<str>,
    {
        self.stats.total.fetch_add(1, Ordering::Relaxed);

        let row = RawRow::from_pairs(fields);
        match self.build(&row, row_index) {
            Ok(record) => Ok(record),
            Err(reason) => {
                self.stats.record_skip(reason);
                debug!(row = row_index, event_id = row.event_id, %reason, "Skipping row");
                Err(reason)
            },
        }
    }

    fn build(&self, row: &RawRow<'_>, row_index: u64) -> Result<ActivityRecord, SkipReason> {
        let required = [
            row.event_id,
            row.merchant_id,
            row.product,
            row.event_type,
            row.status,
        ];
        if required.iter().any(|v| v.is_empty()) {
            return Err(SkipReason::MissingFields);
        }

        let event_id = parse_hyphenated_uuid(row.event_id).ok_or(SkipReason::InvalidUuid)?;
        let product = Product::from_str(row.product).map_err(|_| SkipReason::InvalidProduct)?;
        let status = Status::from_str(row.status).map_err(|_| SkipReason::InvalidStatus)?;

        if !is_merchant_id(row.merchant_id) {
            self.warn(ValidationWarning::InvalidMerchantIdFormat, row_index, row.merchant_id);
        }

        let channel = optional_enum::<Channel>(row.channel).unwrap_or_else(|| {
            self.warn(ValidationWarning::InvalidChannel, row_index, row.channel);
            None
        });
        let merchant_tier = optional_enum::<MerchantTier>(row.merchant_tier).unwrap_or_else(|| {
            self.warn(ValidationWarning::InvalidTier, row_index, row.merchant_tier);
            None
        });

        let amount = match parse_amount(row.amount) {
            Amount::Valid(value) => value,
            Amount::Negative => {
                self.warn(ValidationWarning::NegativeAmountClamped, row_index, row.amount);
                Decimal::ZERO
            },
        };

        let event_timestamp = if row.event_timestamp.is_empty() {
            None
        } else {
            let parsed = parse_timestamp(row.event_timestamp);
            match parsed {
                Some(ts) if ts.year() != self.expected_year => {
                    self.warn(ValidationWarning::SuspiciousTimestamp, row_index, row.event_timestamp);
                },
                None => {
                    trace!(row = row_index, value = row.event_timestamp, "Unparsable timestamp stored as null");
                },
                _ => {},
            }
            parsed
        };

        Ok(ActivityRecord {
            event_id,
            merchant_id: row.merchant_id.to_string(),
            event_timestamp,
            product,
            event_type: row.event_type.to_string(),
            amount,
            status,
            channel,
            region: (!row.region.is_empty()).then(|| row.region.to_string()),
            merchant_tier,
        })
    }

    fn warn(&self, warning: ValidationWarning, row_index: u64, value: &str) {
        self.stats.record_warning(warning);
        trace!(row = row_index, ?warning, value, "Row accepted with warning");
    }
}

/// `Some(None)` for an empty value, `Some(Some(v))` for a member, `None` for junk
fn optional_enum<T: FromStr>(value: &str) -> Option<Option<T>> {
    if value.is_empty() {
        return Some(None);
    }
    value.parse().ok().map(Some)
}

/// Accepts only the 8-4-4-4-12 hyphenated form
fn parse_hyphenated_uuid(value: &str) -> Option<Uuid> {
    let bytes = value.as_bytes();
    if bytes.len() != 36 {
        return None;
    }
    let well_formed = bytes.iter().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => *b == b'-',
        _ => b.is_ascii_hexdigit(),
    });
    if !well_formed {
        return None;
    }
    Uuid::parse_str(value).ok()
}

fn is_merchant_id(value: &str) -> bool {
    value
        .strip_prefix("MRC-")
        .is_some_and(|digits| digits.len() == 6 && digits.bytes().all(|b| b.is_ascii_digit()))
}

enum Amount {
    Valid(Decimal),
    Negative,
}

/// Anything `Decimal` can hold fits the unbounded `NUMERIC` column; values past
/// its range fail to parse and fall back to zero.
fn parse_amount(value: &str) -> Amount {
    let cleaned: String = value.chars().filter(|c| *c != ',').collect();
    let parsed = Decimal::from_str(cleaned.trim()).unwrap_or(Decimal::ZERO);

    if parsed.is_sign_negative() && !parsed.is_zero() {
        Amount::Negative
    } else if parsed.is_zero() {
        Amount::Valid(Decimal::ZERO)
    } else {
        Amount::Valid(round_cents(parsed))
    }
}

/// Parse an ISO-8601 timestamp; values without an offset are taken as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
