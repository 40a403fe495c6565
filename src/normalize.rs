use anyhow::{Context, Result};
use serde_json::{Map, Value};
use url::Url;

use crate::types::{Listing, ListingKind, Span};

/// Builds listing detail page links: `<page>?<param>=<id>`.
#[derive(Debug, Clone)]
pub struct DetailLinks {
    page: Url,
    param: String,
}

impl DetailLinks {
    pub fn new(page_url: &str, param: &str) -> Result<Self> {
        let page = Url::parse(page_url)
            .with_context(|| format!("invalid detail page url `{page_url}`"))?;
        Ok(Self {
            page,
            param: param.to_string(),
        })
    }

    pub fn for_id(&self, id: &str) -> String {
        let mut url = self.page.clone();
        url.query_pairs_mut().append_pair(&self.param, id);
        url.to_string()
    }
}

/// Normalize one upstream feed record into a [`Listing`].
///
/// A record with a non-zero `Cluster.PublicatieId` becomes a cluster listing
/// with ranged price/area/rooms; anything else is read as a single unit.
/// Returns `None` when no usable identifier can be derived.
pub fn normalize(record: &Map<String, Value>, links: &DetailLinks) -> Option<Listing> {
    let photo = text(record.get("Foto_Locatie")).filter(|p| !p.is_empty());
    let cluster = record.get("Cluster").and_then(Value::as_object);

    if let Some(cluster) = cluster {
        if let Some(id) = identifier(cluster.get("PublicatieId")) {
            return Some(Listing {
                detail_url: links.for_id(&id),
                id,
                kind: ListingKind::Cluster,
                address: text(cluster.get("Naam")).unwrap_or_default(),
                photo,
                price: Span::between(
                    number(cluster.get("PrijsMin")),
                    number(cluster.get("PrijsMax")),
                ),
                area: Span::between(
                    number(cluster.get("WoonVertrekkenTotOppMin")),
                    number(cluster.get("WoonVertrekkenTotOppMax")),
                ),
                rooms: Span::between(
                    count(cluster.get("AantalKamersMin")),
                    count(cluster.get("AantalKamersMax")),
                ),
                raw: Value::Object(record.clone()),
            });
        }
    }

    let empty = Map::new();
    let unit = record
        .get("Eenheid")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let address = record
        .get("Adres")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let id = identifier(unit.get("EntiteitId")).or_else(|| identifier(record.get("Id")))?;
    let street = text(address.get("Straatnaam")).unwrap_or_default();
    let number_part = text(address.get("Huisnummer")).unwrap_or_default();

    Some(Listing {
        detail_url: links.for_id(&id),
        id,
        kind: ListingKind::Unit,
        address: format!("{} {}", street.trim(), number_part).trim().to_string(),
        photo,
        price: Span::Exact(number(unit.get("NettoHuur"))),
        area: Span::Exact(number(unit.get("WoonVertrekkenTotOpp"))),
        rooms: Span::Exact(count(unit.get("AantalKamers"))),
        raw: Value::Object(record.clone()),
    })
}

/// String or number field rendered as text.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Identifier field; null, empty and zero mean "absent".
fn identifier(value: Option<&Value>) -> Option<String> {
    let id = text(value)?;
    let trimmed = id.trim();
    if trimmed.is_empty() || trimmed == "0" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Numeric field that may arrive as a number or a numeric string; 0 when unusable.
fn number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn count(value: Option<&Value>) -> u32 {
    let n = number(value);
    if n.is_finite() && n > 0.0 { n as u32 } else { 0 }
}
