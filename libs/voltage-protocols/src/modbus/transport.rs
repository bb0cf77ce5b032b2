//! Request transport
//!
//! The worker talks to devices through [`ModbusTransport`]. The link
//! implementation frames requests over a [`ModbusConnectionManager`];
//! tests substitute an in-memory device.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use voltage_comlink::error::{ComLinkError, Result};

use super::codec::{ModbusRequest, ModbusResponse};
use super::config::BridgeConfig;
use super::connection::ModbusConnectionManager;

#[async_trait]
pub trait ModbusTransport: Send + Sync {
    /// Execute one request against `unit_id` and decode its response
    async fn execute(&self, unit_id: u8, request: &ModbusRequest) -> Result<ModbusResponse>;

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl fmt::Debug for dyn ModbusTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModbusTransport")
    }
}

/// Transport over a TCP or serial link
#[derive(Debug)]
pub struct LinkTransport {
    manager: ModbusConnectionManager,
    timeout: Duration,
    retries: u32,
}

impl LinkTransport {
    pub fn new(manager: ModbusConnectionManager, timeout: Duration, retries: u32) -> Self {
        Self {
            manager,
            timeout,
            retries,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            ModbusConnectionManager::new(config.link.clone()),
            config.timeout(),
            config.retries,
        )
    }

    pub fn manager(&self) -> &ModbusConnectionManager {
        &self.manager
    }

    async fn attempt(&self, unit_id: u8, request: &ModbusRequest) -> Result<ModbusResponse> {
        let pdu = request.encode()?;
        let response = self.manager.transact(unit_id, &pdu, self.timeout).await?;
        request.decode_response(&response)
    }
}

#[async_trait]
impl ModbusTransport for LinkTransport {
    async fn execute(&self, unit_id: u8, request: &ModbusRequest) -> Result<ModbusResponse> {
        let mut attempt = 0;
        loop {
            match self.attempt(unit_id, request).await {
                Ok(response) => return Ok(response),
                // device answered or link closed on purpose, retrying cannot help
                Err(e) if e.is_device_exception() || e == ComLinkError::NotConnected => return Err(e),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    debug!("Unit {} {} failed ({}), retry {}/{}", unit_id, request, e, attempt, self.retries);
                },
                Err(e) => {
                    warn!("Unit {} {} failed: {}", unit_id, request, e);
                    return Err(e);
                },
            }
        }
    }

    async fn open(&self) -> Result<()> {
        self.manager.open(self.timeout).await
    }

    async fn close(&self) -> Result<()> {
        self.manager.close().await
    }
}
