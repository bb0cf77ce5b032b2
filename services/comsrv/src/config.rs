//! Service configuration
//!
//! ```yaml
//! cycle_time_ms: 1000
//! bridges:
//!   - name: meter-link
//!     link: { type: tcp, host: 192.168.1.20 }
//!   - name: rs485
//!     link: { type: serial, device: /dev/ttyUSB0, baud_rate: 19200 }
//!     retries: 2
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use voltage_protocols::modbus::{load_config_from_file, BridgeConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Period of the read/control/write cycle
    #[serde(default = "default_cycle_time_ms")]
    pub cycle_time_ms: u64,
    #[serde(default)]
    pub bridges: Vec<BridgeConfig>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            cycle_time_ms: default_cycle_time_ms(),
            bridges: Vec::new(),
        }
    }
}

fn default_cycle_time_ms() -> u64 {
    1000
}

impl EdgeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: EdgeConfig =
            load_config_from_file(path).with_context(|| format!("loading {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cycle_time_ms == 0 {
            bail!("cycle_time_ms must not be 0");
        }
        let mut names = HashSet::new();
        for bridge in &self.bridges {
            bridge.validate()?;
            if !names.insert(bridge.name.as_str()) {
                bail!("duplicate bridge name: {}", bridge.name);
            }
        }
        Ok(())
    }
}
