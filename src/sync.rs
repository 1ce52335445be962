//! End-to-end reconciliation runs.
//!
//! One run: open a session, fetch both sources concurrently, aggregate
//! stock before orders, finalize, close the session. A source failing after
//! retries marks the session `failed` but whatever the other source
//! produced is still aggregated and returned; partial results are a
//! feature.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, instrument};

use crate::aggregator::ReconciliationAggregator;
use crate::clients::{
    ApiCredentials, FetchOutcome, OrderLogClient, RecordSource, StockSnapshotClient,
};
use crate::config::SyncConfig;
use crate::errors::{SyncError, SyncErrorRecord, TimeoutScope};
use crate::events::{EventSender, SyncEvent};
use crate::models::FinalizedProduct;
use crate::session::{SessionStatus, SessionTracker, SyncSession, TriggerSource};

/// Everything one run produces: the finalized products in deterministic
/// order plus the terminal session summary.
#[derive(Debug)]
pub struct SyncOutcome {
    pub products: Vec<FinalizedProduct>,
    pub session: SyncSession,
}

/// Collaborator boundary for whatever consumes the finalized product list
/// (sheet writer, database, test collector).
#[async_trait]
pub trait ProductSink: Send + Sync {
    async fn deliver(
        &self,
        products: &[FinalizedProduct],
        session: &SyncSession,
    ) -> Result<(), SyncError>;
}

/// Orchestrates one tenant's reconciliation runs.
pub struct SyncService {
    config: SyncConfig,
    stock: StockSnapshotClient,
    orders: OrderLogClient,
    tracker: Arc<SessionTracker>,
    events: Option<EventSender>,
}

impl SyncService {
    pub fn new(
        config: SyncConfig,
        credentials: &ApiCredentials,
        tracker: Arc<SessionTracker>,
    ) -> Result<Self, SyncError> {
        let config = config.validated()?;
        Ok(Self {
            stock: StockSnapshotClient::new(&config, credentials)?,
            orders: OrderLogClient::new(&config, credentials)?,
            config,
            tracker,
            events: None,
        })
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Run one reconciliation for a tenant.
    ///
    /// Returns `Err` only when the tracker refuses admission; every other
    /// failure is recorded on the returned session instead of thrown.
    #[instrument(skip(self))]
    pub async fn run(
        &self,
        tenant: &str,
        trigger: TriggerSource,
    ) -> Result<SyncOutcome, SyncError> {
        let mut session = self.tracker.begin(tenant, trigger)?;
        self.emit(SyncEvent::SessionStarted {
            session_id: session.id,
            tenant: tenant.to_string(),
        })
        .await;

        // The two sources have no data dependency; fetch them concurrently
        // and buffer both before any aggregation.
        let fetches = tokio::time::timeout(
            self.config.run_timeout(),
            futures::future::join(self.stock.fetch(), self.orders.fetch()),
        )
        .await;

        let mut failed = false;
        let mut aggregator = ReconciliationAggregator::new();

        match fetches {
            Ok((stock_result, orders_result)) => {
                // Stock records must be fully ingested before any order
                // event, regardless of which fetch finished first.
                failed |= Self::ingest(
                    &mut session,
                    stock_result,
                    "stock snapshot fetch",
                    |outcome| {
                        for record in outcome.records {
                            aggregator.ingest_stock(record);
                        }
                        session_skips(outcome.skipped)
                    },
                );
                failed |= Self::ingest(
                    &mut session,
                    orders_result,
                    "order log fetch",
                    |outcome| {
                        for event in outcome.records {
                            aggregator.ingest_order(event);
                        }
                        session_skips(outcome.skipped)
                    },
                );
            }
            Err(_) => {
                error!(tenant, "reconciliation run timed out");
                session.record_error(
                    SyncError::Timeout {
                        scope: TimeoutScope::Run,
                        elapsed_secs: self.config.run_timeout().as_secs(),
                    }
                    .into_record(Some("run".into())),
                );
                failed = true;
            }
        }

        let output = aggregator.finalize();
        session.record_errors(output.errors);
        let products_processed = output.products.len();

        if failed {
            session.fail(products_processed);
        } else {
            session.complete(products_processed);
        }
        let session = self.tracker.finish(session);

        self.emit(match session.status {
            SessionStatus::Failed => SyncEvent::SessionFailed {
                session_id: session.id,
                tenant: tenant.to_string(),
                errors: session.errors.len(),
            },
            _ => SyncEvent::SessionCompleted {
                session_id: session.id,
                tenant: tenant.to_string(),
                products_processed,
                errors: session.errors.len(),
            },
        })
        .await;

        Ok(SyncOutcome {
            products: output.products,
            session,
        })
    }

    /// Run and hand the outcome to a sink. The session is already terminal
    /// when delivery happens, so a sink failure is surfaced to the caller
    /// rather than recorded on the session.
    pub async fn run_into(
        &self,
        tenant: &str,
        trigger: TriggerSource,
        sink: &dyn ProductSink,
    ) -> Result<SyncOutcome, SyncError> {
        let outcome = self.run(tenant, trigger).await?;
        sink.deliver(&outcome.products, &outcome.session).await?;
        Ok(outcome)
    }

    fn ingest<T>(
        session: &mut SyncSession,
        result: Result<FetchOutcome<T>, SyncError>,
        context: &str,
        consume: impl FnOnce(FetchOutcome<T>) -> Vec<SyncErrorRecord>,
    ) -> bool {
        match result {
            Ok(outcome) => {
                session.record_errors(consume(outcome));
                false
            }
            Err(err) => {
                error!(context, error = %err, "source fetch failed");
                session.record_error(err.into_record(Some(context.to_string())));
                true
            }
        }
    }

    async fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            events.send(event).await;
        }
    }
}

fn session_skips(
    skipped: Vec<SyncErrorRecord>,
) -> Vec<SyncErrorRecord> {
    if !skipped.is_empty() {
        info!(count = skipped.len(), "skipped malformed source rows");
    }
    skipped
}
