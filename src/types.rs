use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Cookie name → value, as produced by a portal login.
pub type SessionCookies = BTreeMap<String, String>;

/// Whether a listing is a single dwelling or a group of similar dwellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    Unit,
    Cluster,
}

/// A listing attribute: one value for units, a `min..=max` range for clusters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Span<T> {
    Exact(T),
    Range { min: T, max: T },
}

impl<T: PartialOrd + Copy> Span<T> {
    /// Build a span from two bounds, collapsing to `Exact` when they match.
    ///
    /// Reversed bounds are swapped so `min <= max` always holds.
    pub fn between(a: T, b: T) -> Self {
        let (min, max) = if b < a { (b, a) } else { (a, b) };
        if min == max {
            Span::Exact(min)
        } else {
            Span::Range { min, max }
        }
    }

    pub fn min(&self) -> T {
        match *self {
            Span::Exact(v) => v,
            Span::Range { min, .. } => min,
        }
    }

    pub fn max(&self) -> T {
        match *self {
            Span::Exact(v) => v,
            Span::Range { max, .. } => max,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Span::Range { .. })
    }
}

/// Rendering of a single span bound.
pub trait SpanValue {
    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl SpanValue for f64 {
    // Always keeps a decimal point: 800 renders as "800.0".
    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl SpanValue for u32 {
    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl<T: SpanValue> fmt::Display for Span<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Span::Exact(v) => v.render(f),
            Span::Range { min, max } => {
                min.render(f)?;
                f.write_str("-")?;
                max.render(f)
            }
        }
    }
}

/// Canonical listing, normalized from either upstream record shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    /// Cluster publication id, or the unit's entity id.
    pub id: String,
    pub kind: ListingKind,
    pub address: String,
    pub photo: Option<String>,
    /// Net monthly rent in euros.
    pub price: Span<f64>,
    /// Living area in m².
    pub area: Span<f64>,
    pub rooms: Span<u32>,
    pub detail_url: String,
    /// Upstream record, untouched.
    pub raw: Value,
}

/// Outcome counters for one poll cycle, emitted as a JSON line.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub timestamp: String,
    pub fetched: usize,
    pub eligible: usize,
    pub skipped: usize,
    pub already_responded: usize,
    pub notified: usize,
    pub responded: usize,
    pub failed: usize,
    pub notified_total: usize,
    pub responded_total: usize,
}

/// Totals printed once when the bot stops.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExitSummary {
    pub timestamp: String,
    pub cycles: usize,
    pub failed_cycles: usize,
    pub notified: usize,
    pub responded: usize,
    pub notified_total: usize,
    pub responded_total: usize,
}
