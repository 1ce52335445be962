//! Warehouse name normalization.
//!
//! Both external sources report warehouse names as free text and routinely
//! disagree on spelling, casing, and padding. Everything entering the
//! aggregator goes through [`normalize`] first so the two sources meet on a
//! stable identity. The function is pure; both source clients call it
//! concurrently without coordination.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Known misspellings and regional variants, keyed by lowercase collapsed
/// form. Values are the canonical display names.
static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("спб уткина заводь", "Санкт-Петербург (Уткина Заводь)"),
        ("санкт-петербург уткина заводь", "Санкт-Петербург (Уткина Заводь)"),
        ("спб шушары", "Санкт-Петербург (Шушары)"),
        ("екб", "Екатеринбург"),
        ("екатеринбург - испытателей 14г", "Екатеринбург"),
        ("подольск 3", "Подольск"),
        ("подольск 4", "Подольск"),
        ("краснодар (тихорецкая)", "Краснодар"),
    ])
});

/// Logistics-stage pseudo-warehouses, keyed by lowercase collapsed form.
/// These are tracked for diagnostics but excluded from physical totals.
static VIRTUAL: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "в пути до получателей",
        "в пути возвраты на склад wb",
        "всего находится на складах",
        "в пути до клиента",
        "маркетплейс",
    ])
});

/// A canonicalized warehouse name plus its physical/virtual classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedWarehouse {
    pub name: String,
    pub is_virtual: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("warehouse name is empty after trimming")]
    Empty,
}

/// Canonicalize a raw warehouse name from either source.
///
/// Trims, collapses internal whitespace, folds known aliases to one
/// canonical spelling, and classifies known logistics pseudo-warehouses as
/// virtual. Unknown non-empty names pass through as real physical
/// warehouses: an unrecognized warehouse is counted, never dropped. Empty
/// input is rejected so no entry ever exists with an empty name.
pub fn normalize(raw: &str) -> Result<NormalizedWarehouse, NormalizeError> {
    let collapsed = WHITESPACE.replace_all(raw.trim(), " ").into_owned();
    if collapsed.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let folded = collapsed.to_lowercase();
    let name = match ALIASES.get(folded.as_str()) {
        Some(canonical) => (*canonical).to_string(),
        None => collapsed,
    };

    let is_virtual = VIRTUAL.contains(name.to_lowercase().as_str());
    Ok(NormalizedWarehouse { name, is_virtual })
}
