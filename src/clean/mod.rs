//! Cleaner: coerces a raw batch into the canonical typed shape.
//!
//! The output is an Arrow [`RecordBatch`] with one nullable column per raw
//! column, in the same order and with the same row order. The type of each
//! column is decided by its name alone:
//!
//! | column                                   | type    | coercion           |
//! |------------------------------------------|---------|--------------------|
//! | `price`                                  | Float64 | strip `$` and `,`  |
//! | `last_review`                            | Date32  | lenient date parse |
//! | `id`, `host_id`, integer counters        | Int64   | integer parse      |
//! | `reviews_per_month`, `latitude`, `longitude` | Float64 | float parse    |
//! | everything else                          | Utf8    | passed through     |
//!
//! A failed coercion always yields null. Zero is never substituted, so
//! "unknown" stays distinguishable from "none". Columns missing from the raw
//! header are missing from the output.

pub mod coerce;

use arrow::array::{ArrayRef, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{Datelike, NaiveDate};
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::emit;
use crate::error::{AssembleBatchSnafu, CleanError};
use crate::metrics::events::{CoercionFailed, RecordsCleaned};
use crate::source::RawBatch;

use coerce::{parse_date, parse_float, parse_integer, parse_price};

/// Integer-valued columns.
pub const INTEGER_COLUMNS: &[&str] = &[
    "id",
    "host_id",
    "minimum_nights",
    "number_of_reviews",
    "availability_365",
    "number_of_reviews_ltm",
    "calculated_host_listings_count",
];

/// Float-valued columns other than price.
pub const FLOAT_COLUMNS: &[&str] = &["reviews_per_month", "latitude", "longitude"];

/// How a column is typed by the cleaner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Price,
    Date,
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    /// Kind of the column with the given raw name.
    pub fn for_column(name: &str) -> Self {
        match name {
            "price" => ColumnKind::Price,
            "last_review" => ColumnKind::Date,
            n if INTEGER_COLUMNS.contains(&n) => ColumnKind::Integer,
            n if FLOAT_COLUMNS.contains(&n) => ColumnKind::Float,
            _ => ColumnKind::Text,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnKind::Price | ColumnKind::Float => DataType::Float64,
            ColumnKind::Date => DataType::Date32,
            ColumnKind::Integer => DataType::Int64,
            ColumnKind::Text => DataType::Utf8,
        }
    }

    /// Warehouse column type matching [`ColumnKind::data_type`].
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Price | ColumnKind::Float => "DOUBLE",
            ColumnKind::Date => "DATE",
            ColumnKind::Integer => "BIGINT",
            ColumnKind::Text => "VARCHAR",
        }
    }
}

/// Output of the cleaner.
#[derive(Debug, Clone)]
pub struct CleanedBatch {
    /// Typed rows, same length and order as the raw batch.
    pub batch: RecordBatch,
    /// Present values that failed coercion, per column. Columns without
    /// failures are absent.
    pub coercion_failures: BTreeMap<String, u64>,
}

impl CleanedBatch {
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn total_coercion_failures(&self) -> u64 {
        self.coercion_failures.values().sum()
    }
}

/// Clean one raw batch.
pub fn clean(raw: &RawBatch) -> Result<CleanedBatch, CleanError> {
    let mut fields = Vec::with_capacity(raw.columns().len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(raw.columns().len());
    let mut coercion_failures = BTreeMap::new();

    for (index, name) in raw.columns().iter().enumerate() {
        let kind = ColumnKind::for_column(name);
        let (array, failures) = clean_column(raw, index, kind);
        if failures > 0 {
            coercion_failures.insert(name.clone(), failures);
        }
        fields.push(Field::new(name, kind.data_type(), true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    let options = RecordBatchOptions::new().with_row_count(Some(raw.num_rows()));
    let batch =
        RecordBatch::try_new_with_options(schema, arrays, &options).context(AssembleBatchSnafu)?;

    for (column, count) in &coercion_failures {
        warn!(
            "{} value(s) in column '{}' could not be coerced and were set to null",
            count, column
        );
        emit!(CoercionFailed {
            column: column.clone(),
            count: *count,
        });
    }
    emit!(RecordsCleaned {
        count: batch.num_rows() as u64
    });
    info!(
        "Cleaned {} records ({} coercion failures)",
        batch.num_rows(),
        coercion_failures.values().sum::<u64>()
    );

    Ok(CleanedBatch {
        batch,
        coercion_failures,
    })
}

/// Coerce one column, returning the array and the number of present values
/// that became null.
fn clean_column(raw: &RawBatch, index: usize, kind: ColumnKind) -> (ArrayRef, u64) {
    let values = raw.column_values(index);
    match kind {
        ColumnKind::Price => coerce_column(values, parse_price, |v| {
            Arc::new(Float64Array::from(v)) as ArrayRef
        }),
        ColumnKind::Float => coerce_column(values, parse_float, |v| {
            Arc::new(Float64Array::from(v)) as ArrayRef
        }),
        ColumnKind::Integer => coerce_column(values, parse_integer, |v| {
            Arc::new(Int64Array::from(v)) as ArrayRef
        }),
        ColumnKind::Date => coerce_column(
            values,
            |raw| parse_date(raw).map(days_since_epoch),
            |v| Arc::new(Date32Array::from(v)) as ArrayRef,
        ),
        ColumnKind::Text => {
            let array = StringArray::from_iter(values);
            (Arc::new(array) as ArrayRef, 0)
        }
    }
}

fn coerce_column<'a, T>(
    values: impl Iterator<Item = Option<&'a str>>,
    parse: impl Fn(Option<&'a str>) -> Option<T>,
    build: impl FnOnce(Vec<Option<T>>) -> ArrayRef,
) -> (ArrayRef, u64) {
    let mut failures = 0;
    let parsed: Vec<Option<T>> = values
        .map(|raw| {
            let value = parse(raw);
            if raw.is_some() && value.is_none() {
                failures += 1;
            }
            value
        })
        .collect();
    (build(parsed), failures)
}

/// Days between 0001-01-01 and 1970-01-01 in the proleptic Gregorian calendar.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}
