//! Background tasks driving the pool.
//!
//! Both loops stop when the shutdown flag turns `true` or its sender is
//! dropped.

use crate::domain::{PoolError, PoolL2Tx};
use crate::ports::inbound::TxPoolApi;
use crate::service::TxPoolService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Counters reported by the gossip ingest loop when it stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub admitted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// Runs `purge` every `interval` until shutdown.
pub async fn purge_task(
    service: Arc<TxPoolService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // transient store errors are retried on the next tick
                if let Err(e) = service.purge() {
                    warn!(parent: service.span(), error = %e, "Purge failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!(parent: service.span(), "Purge task stopped");
}

/// Feeds transactions received from peers into the pool until shutdown or
/// until the channel closes.
pub async fn gossip_ingest_task(
    service: Arc<TxPoolService>,
    mut inbound: mpsc::UnboundedReceiver<PoolL2Tx>,
    mut shutdown: watch::Receiver<bool>,
) -> IngestStats {
    let mut stats = IngestStats::default();

    loop {
        tokio::select! {
            received = inbound.recv() => {
                let Some(tx) = received else { break };
                match service.add_gossiped_tx(tx) {
                    Ok(_) => stats.admitted += 1,
                    Err(PoolError::DuplicateTx(_)) => stats.duplicates += 1,
                    Err(e) => {
                        stats.rejected += 1;
                        debug!(parent: service.span(), error = %e, "Gossiped transaction rejected");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(
        parent: service.span(),
        admitted = stats.admitted,
        duplicates = stats.duplicates,
        rejected = stats.rejected,
        "Gossip ingest stopped"
    );
    stats
}

/// Spawns [`purge_task`] at the configured interval.
pub fn spawn_purge_task(
    service: Arc<TxPoolService>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let interval = service.config().purge_interval();
    tokio::spawn(purge_task(service, interval, shutdown))
}

/// Spawns [`gossip_ingest_task`].
pub fn spawn_gossip_ingest(
    service: Arc<TxPoolService>,
    inbound: mpsc::UnboundedReceiver<PoolL2Tx>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<IngestStats> {
    tokio::spawn(gossip_ingest_task(service, inbound, shutdown))
}
