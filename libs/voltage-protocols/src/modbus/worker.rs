//! Cyclic Modbus worker
//!
//! Driven from outside once per cycle: `before_process_image` runs the read
//! phase and leaves the worker in the control window, `execute_write` runs
//! the write phase. Tasks run strictly one after another. Both phases of a
//! cycle share one deadline, one cycle time after the read phase started,
//! which is when the next cycle begins. A transaction still running at the
//! deadline is abandoned: it finishes in the background and its result is
//! dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use voltage_channel::{Channel, ChannelRegistry, RegistryError};
use voltage_comlink::ComLinkError;

use super::codec::{ModbusRequest, ModbusResponse};
use super::element::ResolvedChannels;
use super::error::ModbusError;
use super::protocol::ModbusProtocol;
use super::task::Task;
use super::transport::ModbusTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    #[default]
    Idle,
    Reading,
    /// Between read and write phase, controllers run here
    ControlWindow,
    Writing,
}

/// Per-task logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogVerbosity {
    #[default]
    None,
    ReadsAndWrites,
    /// Also logs the transferred values
    ReadsAndWritesVerbose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub cycle_time: Duration,
    pub invalidate_elements_after_read_errors: u32,
    pub log_verbosity: LogVerbosity,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            cycle_time: Duration::from_millis(1000),
            invalidate_elements_after_read_errors: 1,
            log_verbosity: LogVerbosity::None,
        }
    }
}

/// Health channels of one worker
#[derive(Debug, Clone)]
pub struct WorkerDiagnostics {
    /// A phase ran into its deadline
    pub cycle_time_is_too_short: Channel<bool>,
    /// At least one read task failed in the last read phase
    pub communication_failed: Channel<bool>,
    /// Failed read tasks since start
    pub read_failures: Channel<i64>,
    /// Failed write tasks since start
    pub write_failures: Channel<i64>,
}

impl WorkerDiagnostics {
    fn new(component_id: &str) -> Self {
        Self {
            cycle_time_is_too_short: Channel::new(component_id, "CycleTimeIsTooShort"),
            communication_failed: Channel::new(component_id, "CommunicationFailed"),
            read_failures: Channel::new(component_id, "ReadFailures"),
            write_failures: Channel::new(component_id, "WriteFailures"),
        }
    }

    pub fn register(&self, registry: &ChannelRegistry) -> Result<(), RegistryError> {
        registry.register(&self.cycle_time_is_too_short)?;
        registry.register(&self.communication_failed)?;
        registry.register(&self.read_failures)?;
        registry.register(&self.write_failures)
    }

    fn add(counter: &Channel<i64>, failures: usize) {
        counter.set_value(counter.value_or(0) + failures as i64);
    }
}

enum TaskError {
    /// Deadline passed before or during the transaction
    Abandoned,
    Transport(ComLinkError),
    Modbus(ModbusError),
    /// The transport panicked while executing the request
    Panicked,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Abandoned => write!(f, "abandoned at cycle deadline"),
            TaskError::Transport(e) => write!(f, "{e}"),
            TaskError::Modbus(e) => write!(f, "{e}"),
            TaskError::Panicked => write!(f, "transport panicked"),
        }
    }
}

#[derive(Default)]
struct PhaseOutcome {
    failed: usize,
    abandoned: bool,
}

pub struct ModbusWorker {
    name: String,
    transport: Arc<dyn ModbusTransport>,
    protocols: RwLock<BTreeMap<String, Arc<ModbusProtocol>>>,
    state: Mutex<WorkerState>,
    /// Start of the next cycle, set by the read phase
    cycle_deadline: Mutex<Option<Instant>>,
    settings: WorkerSettings,
    diagnostics: WorkerDiagnostics,
}

impl ModbusWorker {
    pub fn new(name: impl Into<String>, transport: Arc<dyn ModbusTransport>, settings: WorkerSettings) -> Self {
        let name = name.into();
        Self {
            diagnostics: WorkerDiagnostics::new(&name),
            name,
            transport,
            protocols: RwLock::new(BTreeMap::new()),
            state: Mutex::new(WorkerState::Idle),
            cycle_deadline: Mutex::new(None),
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    pub fn diagnostics(&self) -> &WorkerDiagnostics {
        &self.diagnostics
    }

    /// Register a protocol; replaces one with the same source id
    pub fn add_protocol(&self, source_id: impl Into<String>, protocol: Arc<ModbusProtocol>) {
        let source_id = source_id.into();
        debug!("[{}] add protocol {} (unit {})", self.name, source_id, protocol.unit_id());
        if self.protocols.write().insert(source_id.clone(), protocol).is_some() {
            warn!("[{}] protocol {} replaced", self.name, source_id);
        }
    }

    pub fn remove_protocol(&self, source_id: &str) -> Option<Arc<ModbusProtocol>> {
        let removed = self.protocols.write().remove(source_id);
        if removed.is_some() {
            debug!("[{}] removed protocol {}", self.name, source_id);
        }
        removed
    }

    pub fn protocol_count(&self) -> usize {
        self.protocols.read().len()
    }

    fn protocols(&self) -> Vec<(String, Arc<ModbusProtocol>)> {
        self.protocols
            .read()
            .iter()
            .map(|(id, protocol)| (id.clone(), Arc::clone(protocol)))
            .collect()
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }

    /// Read phase: execute this cycle's read tasks of all protocols and
    /// push the results into the bound channels
    pub async fn before_process_image(&self) {
        self.set_state(WorkerState::Reading);
        let deadline = Instant::now() + self.settings.cycle_time;
        *self.cycle_deadline.lock() = Some(deadline);
        let mut outcome = PhaseOutcome::default();

        for (source_id, protocol) in self.protocols() {
            for task in protocol.next_read_tasks() {
                match self.read(&protocol, &task, deadline).await {
                    Ok(()) => {
                        task.record_read_success();
                        protocol.complete_read(&task);
                    },
                    Err(e) => {
                        outcome.failed += 1;
                        outcome.abandoned |= matches!(e, TaskError::Abandoned);
                        let invalidated = task.record_read_failure(self.settings.invalidate_elements_after_read_errors);
                        warn!(
                            "[{}] {} read {} failed: {} ({} elements invalidated)",
                            self.name, source_id, task, e, invalidated
                        );
                    },
                }
            }
        }

        self.diagnostics.communication_failed.set_value(outcome.failed > 0);
        WorkerDiagnostics::add(&self.diagnostics.read_failures, outcome.failed);
        self.diagnostics.cycle_time_is_too_short.set_value(outcome.abandoned);
        self.report_deadline(&outcome, "read");
        self.set_state(WorkerState::ControlWindow);
    }

    /// Write phase: resolve the pending writes of all channels, then send
    /// the tasks that have something to write
    pub async fn execute_write(&self) {
        self.set_state(WorkerState::Writing);
        // without a preceding read phase the cycle starts here
        let deadline = self
            .cycle_deadline
            .lock()
            .take()
            .unwrap_or_else(|| Instant::now() + self.settings.cycle_time);
        let mut outcome = PhaseOutcome::default();

        let protocols = self.protocols();
        let mut resolved = ResolvedChannels::new();
        for (_, protocol) in &protocols {
            protocol.shadow_copy_and_reset(&mut resolved);
        }

        for (source_id, protocol) in &protocols {
            for task in protocol.next_write_tasks() {
                let requests = match task.write_requests() {
                    Ok(requests) => requests,
                    Err(e) => {
                        outcome.failed += 1;
                        error!("[{}] {} write {} failed: {}", self.name, source_id, task, e);
                        continue;
                    },
                };
                if requests.is_empty() {
                    continue;
                }

                let mut failed = false;
                for request in requests {
                    if let Err(e) = self.write(protocol, &task, request, deadline).await {
                        failed = true;
                        outcome.abandoned |= matches!(e, TaskError::Abandoned);
                        error!("[{}] {} write {} failed: {}", self.name, source_id, task, e);
                    }
                }
                if failed {
                    outcome.failed += 1;
                } else {
                    protocol.complete_write(&task);
                }
            }
        }

        for (_, protocol) in &protocols {
            protocol.discard_writes();
        }
        WorkerDiagnostics::add(&self.diagnostics.write_failures, outcome.failed);
        if outcome.abandoned {
            self.diagnostics.cycle_time_is_too_short.set_value(true);
        }
        self.report_deadline(&outcome, "write");
        self.set_state(WorkerState::Idle);
    }

    fn report_deadline(&self, outcome: &PhaseOutcome, phase: &str) {
        if outcome.abandoned {
            warn!(
                "[{}] {} phase exceeded cycle time of {}ms",
                self.name,
                phase,
                self.settings.cycle_time.as_millis()
            );
        }
    }

    async fn read(&self, protocol: &ModbusProtocol, task: &Task, deadline: Instant) -> Result<(), TaskError> {
        let Some(request) = task.read_request() else {
            return Ok(());
        };
        let response = self.transact(protocol.unit_id(), request, deadline).await?;
        self.log_task("read", task, &response);
        task.apply_response(&response).map_err(TaskError::Modbus)
    }

    async fn write(
        &self,
        protocol: &ModbusProtocol,
        task: &Task,
        request: ModbusRequest,
        deadline: Instant,
    ) -> Result<(), TaskError> {
        if self.settings.log_verbosity == LogVerbosity::ReadsAndWritesVerbose {
            info!("[{}] {} request {:?}", self.name, task, request);
        }
        let response = self.transact(protocol.unit_id(), request, deadline).await?;
        self.log_task("write", task, &response);
        Ok(())
    }

    /// Run one transaction against the deadline
    ///
    /// The transaction is spawned so that hitting the deadline leaves it
    /// running instead of cancelling it mid-frame.
    async fn transact(&self, unit_id: u8, request: ModbusRequest, deadline: Instant) -> Result<ModbusResponse, TaskError> {
        if Instant::now() >= deadline {
            return Err(TaskError::Abandoned);
        }
        let transport = Arc::clone(&self.transport);
        let handle = tokio::spawn(async move { transport.execute(unit_id, &request).await });
        match tokio::time::timeout_at(deadline, handle).await {
            Ok(Ok(result)) => result.map_err(TaskError::Transport),
            Ok(Err(e)) if e.is_panic() => {
                error!("[{}] unit {} transaction panicked: {}", self.name, unit_id, e);
                Err(TaskError::Panicked)
            },
            Ok(Err(e)) => Err(TaskError::Transport(ComLinkError::protocol(format!(
                "transaction cancelled: {e}"
            )))),
            Err(_) => Err(TaskError::Abandoned),
        }
    }

    fn log_task(&self, phase: &str, task: &Task, response: &ModbusResponse) {
        match self.settings.log_verbosity {
            LogVerbosity::None => {},
            LogVerbosity::ReadsAndWrites => info!("[{}] {} {} ok", self.name, phase, task),
            LogVerbosity::ReadsAndWritesVerbose => {
                info!("[{}] {} {} ok: {:?}", self.name, phase, task, response)
            },
        }
    }
}

impl fmt::Debug for ModbusWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModbusWorker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("protocols", &self.protocol_count())
            .field("settings", &self.settings)
            .finish()
    }
}
