//! Learning-schedule calendar document.

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

use folio_common::{Error, Result};
use folio_library::{CalendarCustom, CatalogSource};

/// Descriptions shown for each calendar, keyed by calendar title.
static DESCRIPTIONS: &str = include_str!("../resources/calendars.json");

static CUSTOM_SHORTHAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s\(([A-Z\x{05d0}-\x{05ea}]+)\)$").expect("custom shorthand pattern")
});

#[derive(Debug, Deserialize)]
struct CalendarDescription {
    en: Option<String>,
    he: Option<String>,
    #[serde(rename = "enSubtitle")]
    en_subtitle: Option<String>,
    #[serde(rename = "heSubtitle")]
    he_subtitle: Option<String>,
}

fn localized(en: Option<String>, he: Option<String>) -> Value {
    let mut map = Map::new();
    if let Some(en) = en {
        map.insert("en".to_string(), Value::String(en));
    }
    if let Some(he) = he {
        map.insert("he".to_string(), Value::String(he));
    }
    Value::Object(map)
}

/// Description and subtitle of every known calendar.
pub fn calendar_metadata() -> Result<Map<String, Value>> {
    let descriptions: BTreeMap<String, CalendarDescription> = serde_json::from_str(DESCRIPTIONS)
        .map_err(|e| Error::Serialization(format!("calendar descriptions: {}", e)))?;

    Ok(descriptions
        .into_iter()
        .map(|(name, d)| {
            let entry = json!({
                "description": localized(d.en, d.he),
                "subtitle": localized(d.en_subtitle, d.he_subtitle),
            });
            (name, entry)
        })
        .collect())
}

/// Split a trailing "(X)" custom shorthand off Haftarah titles.
fn pull_out_custom_shorthand(entry: &mut Map<String, Value>) {
    let Some(Value::Object(title)) = entry.get_mut("title") else {
        return;
    };
    let is_haftarah = title
        .get("en")
        .and_then(Value::as_str)
        .is_some_and(|en| en.starts_with("Haftarah "));
    if !is_haftarah {
        return;
    }

    let mut shorthand = Map::new();
    for lang in ["en", "he"] {
        let text = title.get(lang).and_then(Value::as_str).unwrap_or_default().to_string();
        let custom = CUSTOM_SHORTHAND
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        match custom {
            Some(custom) => {
                let stripped = CUSTOM_SHORTHAND.replace(&text, "").into_owned();
                title.insert(lang.to_string(), Value::String(stripped));
                shorthand.insert(lang.to_string(), Value::String(custom));
            }
            None => {
                shorthand.insert(lang.to_string(), Value::Null);
            }
        }
    }
    entry.insert("custom_shorthand".to_string(), Value::Object(shorthand));
}

fn push_to_array(entry: &mut Map<String, Value>, key: &str, value: Value) {
    match entry.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        _ => {
            entry.insert(key.to_string(), Value::Array(vec![value]));
        }
    }
}

struct Variant {
    diaspora: bool,
    custom: CalendarCustom,
    item: Map<String, Value>,
}

/// Variants of one schedule order, grouped by their first ref (or url).
type Possibilities = Vec<(i64, Vec<(String, Vec<Variant>)>)>;

async fn day_calendar<L>(library: &L, date: NaiveDate) -> Result<Map<String, Value>>
where
    L: CatalogSource + ?Sized,
{
    let mut possibilities: Possibilities = Vec::new();

    for diaspora in [true, false] {
        for custom in CalendarCustom::ALL {
            let items = library.calendar_items(date, diaspora, custom).await?;

            let mut aggregated: Vec<(i64, bool, Map<String, Value>)> = Vec::new();
            for item in items {
                let tref = item.tref.clone().filter(|r| !r.is_empty());
                let display_value = serde_json::to_value(&item.display_value)?;

                if let Some((_, _, existing)) =
                    aggregated.iter_mut().find(|(order, ..)| *order == item.order)
                {
                    if let Some(tref) = tref {
                        push_to_array(existing, "refs", Value::String(tref));
                    }
                    push_to_array(existing, "subs", display_value);
                    continue;
                }

                let order = item.order;
                let mut entry = match serde_json::to_value(&item)? {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                entry.remove("displayValue");
                let has_ref = tref.is_some();
                if let Some(tref) = tref {
                    entry.remove("ref");
                    entry.remove("url");
                    entry.insert("refs".to_string(), json!([tref]));
                }
                entry.insert("subs".to_string(), json!([display_value]));
                aggregated.push((order, has_ref, entry));
            }

            for (order, has_ref, mut entry) in aggregated {
                pull_out_custom_shorthand(&mut entry);
                let id_value = if has_ref {
                    entry.get("refs").and_then(|r| r.get(0))
                } else {
                    entry.get("url")
                };
                let id = id_value.and_then(Value::as_str).unwrap_or_default().to_string();

                let slot = match possibilities.iter().position(|(o, _)| *o == order) {
                    Some(i) => i,
                    None => {
                        possibilities.push((order, Vec::new()));
                        possibilities.len() - 1
                    }
                };
                let by_id = &mut possibilities[slot].1;
                let variant = Variant {
                    diaspora,
                    custom,
                    item: entry,
                };
                match by_id.iter_mut().find(|(existing, _)| *existing == id) {
                    Some((_, variants)) => variants.push(variant),
                    None => by_id.push((id, vec![variant])),
                }
            }
        }
    }

    let mut day: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for (_, by_id) in possibilities {
        for (i, (_, variants)) in by_id.into_iter().enumerate() {
            if i == 0 {
                if let Some(first) = variants.into_iter().next() {
                    day.entry("d".to_string())
                        .or_default()
                        .push(Value::Object(first.item));
                }
                continue;
            }
            for variant in variants {
                let key = format!(
                    "{}|{}",
                    if variant.diaspora { 1 } else { 0 },
                    variant.custom.initial()
                );
                day.entry(key).or_default().push(Value::Object(variant.item));
            }
        }
    }

    Ok(day
        .into_iter()
        .map(|(k, v)| (k, Value::Array(v)))
        .collect())
}

/// Build the calendar document for `today - days_back` up to (not
/// including) `today + days_ahead`.
pub async fn build_calendar<L>(
    library: &L,
    today: NaiveDate,
    days_back: i64,
    days_ahead: i64,
) -> Result<Map<String, Value>>
where
    L: CatalogSource + ?Sized,
{
    let mut calendar = Map::new();
    calendar.insert("metadata".to_string(), Value::Object(calendar_metadata()?));

    for offset in -days_back..days_ahead {
        let date = today + Duration::days(offset);
        let day = day_calendar(library, date).await?;
        calendar.insert(date.format("%Y-%m-%d").to_string(), Value::Object(day));
    }

    debug!("Built calendar with {} days", calendar.len() - 1);
    Ok(calendar)
}
