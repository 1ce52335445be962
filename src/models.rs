use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Composite product key: the tenant-chosen SKU plus the marketplace's
/// numeric product id.
///
/// Identity is the full pair. Two records sharing a marketplace article but
/// carrying different seller articles are distinct products; the aggregator
/// logs the collision but never merges them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductIdentity {
    pub seller_article: String,
    pub marketplace_article: i64,
}

impl ProductIdentity {
    pub fn new(seller_article: impl Into<String>, marketplace_article: i64) -> Self {
        Self {
            seller_article: seller_article.into(),
            marketplace_article,
        }
    }
}

impl fmt::Display for ProductIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.seller_article, self.marketplace_article)
    }
}

/// One warehouse line of a validated stock report row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockWarehouse {
    pub name: String,
    pub quantity: u32,
}

/// A validated stock snapshot record: quantities per warehouse for one
/// product, as reported by the stock report download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRecord {
    pub product: ProductIdentity,
    pub warehouses: Vec<StockWarehouse>,
}

/// A validated order log event: one order occurrence at one warehouse.
///
/// Cancelled events are carried through decoding with the flag set; the
/// aggregator is the single place that excludes them from counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEvent {
    pub product: ProductIdentity,
    pub warehouse_name: String,
    pub is_cancelled: bool,
}

/// Per-warehouse state accumulated during a reconciliation run.
///
/// An entry exists if the warehouse was seen in either source; a warehouse
/// with orders but no stock is never dropped. The provenance flags record
/// which source(s) mentioned it, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseEntry {
    pub name: String,
    pub stock: u32,
    pub orders: u32,
    pub is_virtual: bool,
    pub seen_in_stock_source: bool,
    pub seen_in_order_source: bool,
}

impl WarehouseEntry {
    pub fn new(name: impl Into<String>, is_virtual: bool) -> Self {
        Self {
            name: name.into(),
            stock: 0,
            orders: 0,
            is_virtual,
            seen_in_stock_source: false,
            seen_in_order_source: false,
        }
    }
}

/// In-flight product state owned by the aggregator.
///
/// Warehouse order is insertion order of first appearance and is preserved
/// into the finalized output so reruns over identical input render
/// identically downstream.
#[derive(Debug, Clone)]
pub struct Product {
    pub identity: ProductIdentity,
    warehouses: Vec<WarehouseEntry>,
}

impl Product {
    pub fn new(identity: ProductIdentity) -> Self {
        Self {
            identity,
            warehouses: Vec::new(),
        }
    }

    pub fn warehouses(&self) -> &[WarehouseEntry] {
        &self.warehouses
    }

    /// Get or create the entry for a normalized warehouse name, preserving
    /// first-appearance order. Lookup is case-insensitive so case-only
    /// variants from the two sources land on one entry; the first-seen
    /// spelling is kept for display.
    pub fn entry_mut(&mut self, name: &str, is_virtual: bool) -> &mut WarehouseEntry {
        let folded = name.to_lowercase();
        let idx = match self
            .warehouses
            .iter()
            .position(|w| w.name.to_lowercase() == folded)
        {
            Some(idx) => idx,
            None => {
                self.warehouses.push(WarehouseEntry::new(name, is_virtual));
                self.warehouses.len() - 1
            }
        };
        &mut self.warehouses[idx]
    }
}

/// Orders-to-stock ratio used as a restock-urgency signal.
///
/// Undefined when stock is zero but orders exist; a plain zero would read as
/// "no demand" downstream, which is the opposite of the truth. Serializes as
/// a JSON number, or the string `"undefined"` for the sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Turnover {
    Ratio(f64),
    Undefined,
}

impl Turnover {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Ratio per the finalization rules of the aggregator.
    pub fn compute(total_orders: u32, total_stock: u32) -> Self {
        if total_stock > 0 {
            Self::Ratio(f64::from(total_orders) / f64::from(total_stock))
        } else if total_orders > 0 {
            Self::Undefined
        } else {
            Self::Ratio(0.0)
        }
    }
}

impl Serialize for Turnover {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Ratio(value) => serializer.serialize_f64(*value),
            Self::Undefined => serializer.serialize_str("undefined"),
        }
    }
}

impl<'de> Deserialize<'de> for Turnover {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TurnoverVisitor;

        impl Visitor<'_> for TurnoverVisitor {
            type Value = Turnover;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number or the string \"undefined\"")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Turnover, E> {
                Ok(Turnover::Ratio(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Turnover, E> {
                Ok(Turnover::Ratio(v as f64))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Turnover, E> {
                Ok(Turnover::Ratio(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Turnover, E> {
                if v == "undefined" {
                    Ok(Turnover::Undefined)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(v), &self))
                }
            }
        }

        deserializer.deserialize_any(TurnoverVisitor)
    }
}

/// Per-warehouse slice of the finalized output. Virtual warehouses never
/// appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseTotals {
    pub name: String,
    pub orders: u32,
    pub stock: u32,
}

/// One finalized product record, the shape handed to the sink adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedProduct {
    pub seller_article: String,
    pub marketplace_article: i64,
    pub total_orders: u32,
    pub total_stock: u32,
    pub turnover: Turnover,
    pub warehouses: Vec<WarehouseTotals>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turnover_compute_rules() {
        assert_eq!(Turnover::compute(5, 52), Turnover::Ratio(5.0 / 52.0));
        assert_eq!(Turnover::compute(3, 0), Turnover::Undefined);
        assert_eq!(Turnover::compute(0, 0), Turnover::Ratio(0.0));
        assert_eq!(Turnover::compute(0, 10), Turnover::Ratio(0.0));
    }

    #[test]
    fn turnover_serializes_sentinel_as_string() {
        let json = serde_json::to_string(&Turnover::Undefined).unwrap();
        assert_eq!(json, "\"undefined\"");

        let json = serde_json::to_string(&Turnover::Ratio(0.25)).unwrap();
        assert_eq!(json, "0.25");
    }

    #[test]
    fn turnover_roundtrips() {
        let t: Turnover = serde_json::from_str("\"undefined\"").unwrap();
        assert!(t.is_undefined());
        let t: Turnover = serde_json::from_str("0.5").unwrap();
        assert_eq!(t, Turnover::Ratio(0.5));
    }

    #[test]
    fn finalized_product_uses_camel_case_keys() {
        let product = FinalizedProduct {
            seller_article: "WB001".into(),
            marketplace_article: 12345678,
            total_orders: 5,
            total_stock: 52,
            turnover: Turnover::Ratio(5.0 / 52.0),
            warehouses: vec![WarehouseTotals {
                name: "Краснодар".into(),
                orders: 3,
                stock: 52,
            }],
        };
        let value = serde_json::to_value(&product).unwrap();
        assert!(value.get("sellerArticle").is_some());
        assert!(value.get("marketplaceArticle").is_some());
        assert!(value.get("totalOrders").is_some());
    }

    #[test]
    fn product_entry_order_is_first_appearance() {
        let mut product = Product::new(ProductIdentity::new("SKU-1", 1));
        product.entry_mut("B", false).stock += 1;
        product.entry_mut("A", false).stock += 2;
        product.entry_mut("B", false).orders += 1;

        let names: Vec<_> = product.warehouses().iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn product_entry_lookup_ignores_case() {
        let mut product = Product::new(ProductIdentity::new("SKU-1", 1));
        product.entry_mut("КРАСНОДАР", false).stock += 52;
        product.entry_mut("Краснодар", false).orders += 1;

        assert_eq!(product.warehouses().len(), 1);
        let entry = &product.warehouses()[0];
        assert_eq!(entry.name, "КРАСНОДАР");
        assert_eq!(entry.stock, 52);
        assert_eq!(entry.orders, 1);
    }
}
