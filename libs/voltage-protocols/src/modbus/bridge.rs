//! Modbus bridge
//!
//! One physical link shared by any number of device protocols. The bridge
//! owns the transport and the worker; devices come and go through
//! `add_protocol` / `remove_protocol`.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use voltage_comlink::error::Result;

use super::config::BridgeConfig;
use super::protocol::ModbusProtocol;
use super::transport::{LinkTransport, ModbusTransport};
use super::worker::{ModbusWorker, WorkerSettings};

#[derive(Debug)]
pub struct Bridge {
    name: String,
    transport: Arc<dyn ModbusTransport>,
    worker: ModbusWorker,
}

impl Bridge {
    /// Build the link of `config`; phase deadlines follow `cycle_time`
    pub fn from_config(config: &BridgeConfig, cycle_time: Duration) -> Result<Self> {
        config.validate()?;
        info!("Bridge {}: {}", config.name, config.link);
        let transport: Arc<dyn ModbusTransport> = Arc::new(LinkTransport::from_config(config));
        Ok(Self::with_transport(&config.name, transport, config.worker_settings(cycle_time)))
    }

    pub fn with_transport(name: &str, transport: Arc<dyn ModbusTransport>, settings: WorkerSettings) -> Self {
        Self {
            name: name.to_string(),
            worker: ModbusWorker::new(name, Arc::clone(&transport), settings),
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker(&self) -> &ModbusWorker {
        &self.worker
    }

    pub fn add_protocol(&self, source_id: impl Into<String>, protocol: Arc<ModbusProtocol>) {
        self.worker.add_protocol(source_id, protocol);
    }

    pub fn remove_protocol(&self, source_id: &str) -> Option<Arc<ModbusProtocol>> {
        self.worker.remove_protocol(source_id)
    }

    pub async fn open(&self) -> Result<()> {
        self.transport.open().await
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }

    pub async fn before_process_image(&self) {
        self.worker.before_process_image().await;
    }

    pub async fn execute_write(&self) {
        self.worker.execute_write().await;
    }
}
