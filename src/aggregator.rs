//! Reconciliation of the stock snapshot against the order log.
//!
//! The two sources are fetched independently and routinely disagree on
//! which warehouses exist for a product. The aggregator merges them by
//! composite product identity: a warehouse entry is created from whichever
//! source mentions it first, quantities accumulate per side, and totals are
//! computed once at finalization over physical warehouses only.
//!
//! The aggregator performs no I/O and has a single writer. Callers buffer
//! both fetches, ingest all stock records, then all order events, then
//! finalize; that fixed step order is what makes output ordering
//! deterministic across reruns of identical input.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::errors::{SyncError, SyncErrorRecord};
use crate::models::{
    FinalizedProduct, OrderEvent, Product, ProductIdentity, StockRecord, Turnover,
    WarehouseTotals,
};
use crate::warehouses::{self, NormalizeError};

/// Output of one aggregation pass: the finalized products in first-appearance
/// order, plus every per-record error absorbed along the way.
#[derive(Debug)]
pub struct AggregationOutput {
    pub products: Vec<FinalizedProduct>,
    pub errors: Vec<SyncErrorRecord>,
}

/// Merges stock records and order events into per-product, per-warehouse
/// aggregates.
#[derive(Debug, Default)]
pub struct ReconciliationAggregator {
    index: HashMap<ProductIdentity, usize>,
    products: Vec<Product>,
    /// First seller article seen per marketplace article, for collision
    /// diagnostics.
    seller_by_marketplace: HashMap<i64, String>,
    errors: Vec<SyncErrorRecord>,
}

impl ReconciliationAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one validated stock record, accumulating per-warehouse
    /// quantities. Warehouse lines with unusable names are skipped and
    /// recorded, never fatal.
    pub fn ingest_stock(&mut self, record: StockRecord) {
        let idx = self.product_index(record.product.clone());
        for line in record.warehouses {
            let normalized = match warehouses::normalize(&line.name) {
                Ok(n) => n,
                Err(NormalizeError::Empty) => {
                    self.skip_malformed("stock", &record.product, "empty warehouse name");
                    continue;
                }
            };
            let entry = self.products[idx].entry_mut(&normalized.name, normalized.is_virtual);
            entry.stock += line.quantity;
            entry.seen_in_stock_source = true;
        }
    }

    /// Ingest one validated order event. Cancelled events are discarded
    /// before they can touch any counter.
    pub fn ingest_order(&mut self, event: OrderEvent) {
        if event.is_cancelled {
            debug!(product = %event.product, "skipping cancelled order event");
            return;
        }
        let normalized = match warehouses::normalize(&event.warehouse_name) {
            Ok(n) => n,
            Err(NormalizeError::Empty) => {
                self.skip_malformed("orders", &event.product, "empty warehouse name");
                return;
            }
        };
        let idx = self.product_index(event.product);
        let entry = self.products[idx].entry_mut(&normalized.name, normalized.is_virtual);
        entry.orders += 1;
        entry.seen_in_order_source = true;
    }

    /// Compute totals and turnover for every product and emit them in
    /// first-appearance order. Virtual warehouses are excluded from totals
    /// and from the emitted warehouse lists.
    pub fn finalize(self) -> AggregationOutput {
        let products = self
            .products
            .into_iter()
            .map(|product| {
                let physical: Vec<_> = product
                    .warehouses()
                    .iter()
                    .filter(|w| !w.is_virtual)
                    .collect();
                let total_orders: u32 = physical.iter().map(|w| w.orders).sum();
                let total_stock: u32 = physical.iter().map(|w| w.stock).sum();

                FinalizedProduct {
                    seller_article: product.identity.seller_article.clone(),
                    marketplace_article: product.identity.marketplace_article,
                    total_orders,
                    total_stock,
                    turnover: Turnover::compute(total_orders, total_stock),
                    warehouses: physical
                        .into_iter()
                        .map(|w| WarehouseTotals {
                            name: w.name.clone(),
                            orders: w.orders,
                            stock: w.stock,
                        })
                        .collect(),
                }
            })
            .collect();

        AggregationOutput {
            products,
            errors: self.errors,
        }
    }

    fn product_index(&mut self, identity: ProductIdentity) -> usize {
        if let Some(&idx) = self.index.get(&identity) {
            return idx;
        }

        match self
            .seller_by_marketplace
            .get(&identity.marketplace_article)
        {
            Some(existing) if *existing != identity.seller_article => {
                // Same marketplace article under two seller articles: kept
                // as distinct products, surfaced as a warning.
                warn!(
                    marketplace_article = identity.marketplace_article,
                    existing_seller = %existing,
                    new_seller = %identity.seller_article,
                    "marketplace article appears under conflicting seller articles"
                );
                self.errors.push(
                    SyncErrorRecord::new(
                        "identity_conflict",
                        format!(
                            "marketplace article {} seen under seller articles {} and {}",
                            identity.marketplace_article, existing, identity.seller_article
                        ),
                    )
                    .with_context("aggregator".to_string()),
                );
            }
            Some(_) => {}
            None => {
                self.seller_by_marketplace.insert(
                    identity.marketplace_article,
                    identity.seller_article.clone(),
                );
            }
        }

        let idx = self.products.len();
        self.products.push(Product::new(identity.clone()));
        self.index.insert(identity, idx);
        idx
    }

    fn skip_malformed(&mut self, origin: &'static str, product: &ProductIdentity, reason: &str) {
        warn!(origin, product = %product, reason, "skipping malformed record");
        self.errors.push(
            SyncError::MalformedRecord {
                origin,
                reason: reason.to_string(),
            }
            .into_record(Some(format!("product {product}"))),
        );
    }
}
