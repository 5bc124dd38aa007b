//! Attribute kinds and the behaviors they share.
//!
//! Kinds are a tagged enum. Behavior is split into small traits so that kinds
//! sharing partial behavior (numeric comparison, order-of-magnitude
//! clustering, range filtering) reuse the same helpers instead of borrowing
//! each other's methods.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// A bucket assignment produced by clustering a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Grouping key, sorted with the attribute kind's comparator.
    pub key: Value,
    /// Human readable bucket label.
    pub label: String,
}

impl Cluster {
    pub fn new(key: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// Granularity used when clustering dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateGranularity {
    #[default]
    Year,
    Month,
    Day,
}

/// The type of a metamodel attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Kind {
    String,
    Number,
    Date {
        #[serde(default, rename = "clusterBy")]
        cluster_by: DateGranularity,
    },
    Range,
    Decimal {
        #[serde(default = "default_precision")]
        precision: u32,
    },
    DecimalRange {
        #[serde(default = "default_precision")]
        precision: u32,
    },
    LogarithmRange {
        #[serde(default = "default_precision")]
        precision: u32,
    },
    Boolean,
    Category,
    StringArray,
}

fn default_precision() -> u32 {
    2
}

/// Kinds with a dedicated ordering. `None` means "use native ordering".
pub trait Comparable {
    fn compare(&self, a: &Value, b: &Value) -> Option<Ordering>;
}

/// Kinds that can group values into buckets.
pub trait Clusterable {
    fn cluster(&self, value: &Value) -> Cluster;
}

/// Kinds that can decide whether a value survives a filter.
pub trait Filterable {
    fn survives_filter(&self, filter: &Value, value: &Value) -> bool;
}

/// Conversion between model values and the integer scale range filters use.
pub trait ScaleConvertible {
    fn to_model_scale(&self, filter_value: f64) -> f64;
    fn to_filter_scale(&self, model_value: f64) -> f64;
}

/// Scale used by the range kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeScale {
    Linear,
    Decimal { precision: u32 },
    Logarithm { precision: u32 },
}

impl ScaleConvertible for RangeScale {
    fn to_model_scale(&self, filter_value: f64) -> f64 {
        match *self {
            RangeScale::Linear => filter_value,
            RangeScale::Decimal { precision } => {
                round_to(filter_value / scale_factor(precision), precision)
            }
            RangeScale::Logarithm { precision } => round_to(
                10f64.powf(filter_value / scale_factor(precision)),
                precision,
            ),
        }
    }

    fn to_filter_scale(&self, model_value: f64) -> f64 {
        match *self {
            RangeScale::Linear => model_value,
            RangeScale::Decimal { precision } => (model_value * scale_factor(precision)).trunc(),
            RangeScale::Logarithm { precision } => {
                (model_value.log10() * scale_factor(precision)).trunc()
            }
        }
    }
}

impl Kind {
    /// Whether values of this kind are numbers (usable as treemap areas or
    /// colors).
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Kind::Number
                | Kind::Range
                | Kind::Decimal { .. }
                | Kind::DecimalRange { .. }
                | Kind::LogarithmRange { .. }
        )
    }

    /// The filter scale, for range kinds.
    pub fn range_scale(&self) -> Option<RangeScale> {
        match *self {
            Kind::Range => Some(RangeScale::Linear),
            Kind::DecimalRange { precision } => Some(RangeScale::Decimal { precision }),
            Kind::LogarithmRange { precision } => Some(RangeScale::Logarithm { precision }),
            _ => None,
        }
    }
}

impl Comparable for Kind {
    fn compare(&self, a: &Value, b: &Value) -> Option<Ordering> {
        match self {
            Kind::Number | Kind::Range => Some(cmp_f64(as_int(a), as_int(b))),
            Kind::Decimal { .. } | Kind::DecimalRange { .. } | Kind::LogarithmRange { .. } => {
                Some(cmp_f64(as_number(a), as_number(b)))
            }
            // true sorts before false
            Kind::Boolean => Some(as_bool(b).cmp(&as_bool(a))),
            Kind::Category => Some(category_len(a).cmp(&category_len(b))),
            Kind::String | Kind::Date { .. } | Kind::StringArray => None,
        }
    }
}

impl Clusterable for Kind {
    fn cluster(&self, value: &Value) -> Cluster {
        match self {
            Kind::String => {
                let initial = as_string(value)
                    .chars()
                    .next()
                    .map(|c| c.to_uppercase().collect::<String>())
                    .unwrap_or_default();
                Cluster::new(initial.clone(), initial)
            }
            Kind::Number | Kind::Range => cluster_by_magnitude(as_number(value)),
            Kind::Decimal { precision }
            | Kind::DecimalRange { precision }
            | Kind::LogarithmRange { precision } => {
                cluster_decimal(as_number(value), *precision)
            }
            Kind::Date { cluster_by } => cluster_date(value, *cluster_by),
            Kind::Boolean => {
                let b = as_bool(value);
                Cluster::new(b, if b { "Yes" } else { "No" })
            }
            Kind::Category => {
                let label = category_label(value);
                Cluster::new(label.clone(), label)
            }
            Kind::StringArray => {
                Cluster::new("undefined", "Clustering unsupported for this datatype.")
            }
        }
    }
}

impl Filterable for Kind {
    fn survives_filter(&self, filter: &Value, value: &Value) -> bool {
        match self {
            Kind::String => {
                let needle = as_string(filter).to_lowercase();
                !needle.is_empty() && as_string(value).to_lowercase().contains(&needle)
            }
            Kind::StringArray => {
                let needle = as_string(filter).to_lowercase();
                !needle.is_empty()
                    && as_array(value)
                        .iter()
                        .any(|v| as_string(v).to_lowercase().contains(&needle))
            }
            Kind::Number => match as_int(filter) {
                f if f.is_nan() => true,
                f => f == as_number(value),
            },
            Kind::Decimal { precision } => match as_number(filter) {
                f if f.is_nan() => true,
                f => round_to(f, *precision) == round_to(as_number(value), *precision),
            },
            Kind::Range | Kind::DecimalRange { .. } | Kind::LogarithmRange { .. } => {
                let Some(scale) = self.range_scale() else {
                    return true;
                };
                let min = scale.to_model_scale(as_number(&filter["min"]));
                let max = scale.to_model_scale(as_number(&filter["max"]));
                let v = as_number(value);
                v >= min && v <= max
            }
            Kind::Boolean => {
                let wanted = match filter {
                    Value::Bool(b) => *b,
                    other => as_string(other) == "true",
                };
                wanted == as_bool(value)
            }
            Kind::Category => {
                // OR filter: any selected category matches
                let selected = as_array(filter);
                match value {
                    Value::Array(items) => selected.iter().any(|c| items.contains(c)),
                    other => {
                        let haystack = as_string(other);
                        selected.iter().any(|c| haystack.contains(&as_string(c)))
                    }
                }
            }
            Kind::Date { .. } => survives_date_filter(filter, value),
        }
    }
}

// =============================================================================
// Value helpers
// =============================================================================

pub(crate) fn as_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => f64::NAN,
    }
}

fn as_int(value: &Value) -> f64 {
    as_number(value).trunc()
}

fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

pub(crate) fn as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn as_array(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn category_len(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::String(s) => s.chars().count(),
        _ => 0,
    }
}

fn category_label(value: &Value) -> String {
    let label = match value {
        Value::Array(items) => items.iter().map(as_string).collect::<Vec<_>>().join(", "),
        other => as_string(other),
    };
    if label.is_empty() {
        "Nothing".to_owned()
    } else {
        label
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn scale_factor(precision: u32) -> f64 {
    10f64.powi(precision as i32)
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = scale_factor(precision);
    (value * factor).round() / factor
}

/// Order of magnitude of a non-zero number (100K..1M yields 5).
pub fn order_of_magnitude(value: f64) -> Option<i32> {
    if value == 0.0 || !value.is_finite() {
        return None;
    }
    // The round trip through hundredths absorbs log10 rounding errors.
    Some(((value.abs().log10() * 100.0).round() / 100.0).floor() as i32)
}

/// Formats a number with SI suffixes, e.g. 1500 becomes `1.50K`.
pub fn to_human_label(value: f64) -> String {
    const SUFFIXES: [&str; 9] = ["", "K", "M", "G", "T", "P", "E", "Z", "Y"];
    let Some(order) = order_of_magnitude(value) else {
        return format_number(value);
    };
    if order < 0 {
        return format!("{:.*}", (-order) as usize, value);
    }
    let si = (order / 3) as usize;
    let suffix = SUFFIXES.get(si).copied().unwrap_or("");
    let scaled = value / 10f64.powi(si as i32 * 3);
    let decimals = (2 - order_of_magnitude(scaled).unwrap_or(0)).max(0) as usize;
    format!("{:.*}{}", decimals, scaled, suffix)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn cluster_by_magnitude(value: f64) -> Cluster {
    if value.is_nan() {
        return Cluster::new(Value::Null, "");
    }
    let int = value.trunc();
    if value <= 10.0 {
        return Cluster::new(int as i64, format_number(int));
    }
    // cluster at one order of magnitude below the value's scale
    let mut digits = 0;
    let mut rest = int;
    while rest >= 10.0 {
        rest = (rest / 10.0).trunc();
        digits += 1;
    }
    let magnitude = 10f64.powi(digits);
    let low = (value / magnitude).trunc() * magnitude;
    let high = (value / magnitude + 1.0).trunc() * magnitude;
    Cluster::new(
        low as i64,
        format!("{} - {}", format_number(low), format_number(high)),
    )
}

fn cluster_decimal(value: f64, precision: u32) -> Cluster {
    match order_of_magnitude(round_to(value, precision)) {
        None => Cluster::new(0, format!("{:.*}", precision as usize, 0.0)),
        Some(order) => {
            let low = 10f64.powi(order);
            let high = 10f64.powi(order + 1);
            Cluster::new(
                serde_json::Number::from_f64(low).map_or(Value::Null, Value::Number),
                format!("{} - {}", to_human_label(low), to_human_label(high)),
            )
        }
    }
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Parses the `YYYY-MM-DD` prefix of a date string. Months are 1-based.
fn parse_date(value: &Value) -> Option<(i32, u32, u32)> {
    let text = as_string(value);
    let mut parts = text.get(..10).unwrap_or(&text).splitn(3, '-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    ((1..=12).contains(&month) && (1..=31).contains(&day)).then_some((year, month, day))
}

fn cluster_date(value: &Value, granularity: DateGranularity) -> Cluster {
    let Some((year, month, day)) = parse_date(value) else {
        return Cluster::new("", "");
    };
    let month_name = MONTHS[(month - 1) as usize];
    match granularity {
        DateGranularity::Year => Cluster::new(format!("{year:04}-01-01"), year.to_string()),
        DateGranularity::Month => Cluster::new(
            format!("{year:04}-{month:02}-01"),
            format!("{year}-{month_name}"),
        ),
        DateGranularity::Day => Cluster::new(
            format!("{year:04}-{month:02}-{day:02}"),
            format!("{year}-{month_name}-{day}"),
        ),
    }
}

/// Date filters are `[year, month, day]` triples; unparseable parts match
/// anything.
fn survives_date_filter(filter: &Value, value: &Value) -> bool {
    let Some((year, month, day)) = parse_date(value) else {
        return false;
    };
    let part = |i: usize| {
        let n = as_int(filter.get(i).unwrap_or(&Value::Null));
        (!n.is_nan()).then_some(n as i64)
    };
    part(0).is_none_or(|y| y == i64::from(year))
        && part(1).is_none_or(|m| m == i64::from(month))
        && part(2).is_none_or(|d| d == i64::from(day))
}
