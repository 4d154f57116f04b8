//! Sweep triggers.
//!
//! Timer ticks and manual requests are producers on one channel, drained by
//! a single consumer. Two triggers arriving close together therefore queue
//! their sweeps instead of interleaving store writes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::SweepEngine;
use crate::error::Result;

/// Why a sweep was requested. The engine does not distinguish callers; the
/// label exists for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTrigger {
    Timer,
    Manual,
}

impl SweepTrigger {
    fn label(self) -> &'static str {
        match self {
            SweepTrigger::Timer => "timer",
            SweepTrigger::Manual => "manual",
        }
    }
}

/// Spawn the fixed-cadence trigger producer.
///
/// The first tick completes immediately, so a sweep runs right after
/// startup. The producer stops once the consumer hangs up.
pub fn spawn_timer(tx: mpsc::Sender<SweepTrigger>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if tx.send(SweepTrigger::Timer).await.is_err() {
                break;
            }
        }
    })
}

/// Drain triggers until every producer hangs up, running one sweep per
/// trigger. A failed sweep is logged and the loop keeps going.
pub async fn run_trigger_loop(
    engine: Arc<SweepEngine>,
    mut rx: mpsc::Receiver<SweepTrigger>,
) -> Result<()> {
    while let Some(trigger) = rx.recv().await {
        log::info!("Sweep requested ({})", trigger.label());
        if let Err(error) = engine.run_sweep().await {
            log::error!("Sweep failed: {}", error);
        }
    }
    Ok(())
}
