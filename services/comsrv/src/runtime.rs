//! Cycle driver
//!
//! Every tick runs the read phase of all bridges concurrently, then the
//! controllers, then the write phase of all bridges. Ticks that are missed
//! because a cycle overran are skipped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voltage_protocols::modbus::Bridge;

use crate::config::EdgeConfig;

/// Control logic running in the window between read and write phase
///
/// Controllers read channel values and push writes; the write phase sends
/// whatever they pushed.
#[async_trait]
pub trait Controller: Send + Sync {
    fn id(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

pub struct EdgeRuntime {
    cycle_time: Duration,
    bridges: Vec<Bridge>,
    controllers: Vec<Arc<dyn Controller>>,
}

impl EdgeRuntime {
    pub fn new(cycle_time: Duration, bridges: Vec<Bridge>) -> Self {
        Self {
            cycle_time,
            bridges,
            controllers: Vec::new(),
        }
    }

    /// Bridges start without protocols; devices register themselves later
    ///
    /// Every bridge shares the runtime cycle, so a phase deadline is the
    /// start of the next tick.
    pub fn from_config(config: &EdgeConfig) -> Result<Self> {
        let cycle_time = Duration::from_millis(config.cycle_time_ms);
        let bridges = config
            .bridges
            .iter()
            .map(|bridge| Bridge::from_config(bridge, cycle_time))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::new(cycle_time, bridges))
    }

    pub fn add_controller(&mut self, controller: Arc<dyn Controller>) {
        self.controllers.push(controller);
    }

    pub fn bridges(&self) -> &[Bridge] {
        &self.bridges
    }

    pub fn bridge(&self, name: &str) -> Option<&Bridge> {
        self.bridges.iter().find(|bridge| bridge.name() == name)
    }

    pub async fn run_cycle(&self) {
        join_all(self.bridges.iter().map(Bridge::before_process_image)).await;

        for controller in &self.controllers {
            if let Err(e) = controller.run().await {
                warn!("Controller {} failed: {:#}", controller.id(), e);
            }
        }

        join_all(self.bridges.iter().map(Bridge::execute_write)).await;
    }

    /// Run cycles until `shutdown` is cancelled, then close all links
    pub async fn run(&self, shutdown: CancellationToken) {
        for bridge in &self.bridges {
            // links that fail here are retried by the first transaction
            if let Err(e) = bridge.open().await {
                warn!("Bridge {} open failed: {}", bridge.name(), e);
            }
        }

        info!(
            "Running {} bridges, cycle {}ms",
            self.bridges.len(),
            self.cycle_time.as_millis()
        );
        let mut ticker = interval(self.cycle_time);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles: u64 = 0;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_cycle().await;
                    cycles += 1;
                    debug!("Cycle {} done", cycles);
                },
            }
        }

        for bridge in &self.bridges {
            if let Err(e) = bridge.close().await {
                warn!("Bridge {} close failed: {}", bridge.name(), e);
            }
        }
        info!("Stopped after {} cycles", cycles);
    }
}
