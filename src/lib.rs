//! Stocksync — stock/orders reconciliation engine.
//!
//! Combines two independently-fetched marketplace data sources — a
//! warehouse-stock snapshot (async task-based API) and an order-event log
//! (date-filtered, paginated API) — into per-product, per-warehouse
//! aggregates with orders, stock, and turnover, tolerating the two sources
//! disagreeing on which warehouses exist for a product.
//!
//! The embedding application (HTTP API, bot, scheduler) supplies
//! credentials, configuration and a [`sync::ProductSink`]; the engine owns
//! fetching, normalization, aggregation, and session tracking.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod aggregator;
pub mod clients;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod rate_limiter;
pub mod retry;
pub mod session;
pub mod sync;
pub mod warehouses;

pub use aggregator::{AggregationOutput, ReconciliationAggregator};
pub use clients::{ApiCredentials, FetchOutcome, OrderLogClient, RecordSource, StockSnapshotClient};
pub use config::SyncConfig;
pub use errors::{SyncError, SyncErrorRecord, TimeoutScope};
pub use models::{FinalizedProduct, OrderEvent, ProductIdentity, StockRecord, Turnover};
pub use session::{SessionStatus, SessionTracker, SyncSession, TriggerSource};
pub use sync::{ProductSink, SyncOutcome, SyncService};
