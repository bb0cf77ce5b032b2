//! Device protocol
//!
//! Task set of one Modbus device (unit id). Device definitions build a
//! protocol once and register it at a bridge.

use std::sync::Arc;

use parking_lot::Mutex;

use super::element::ResolvedChannels;
use super::error::Result;
use super::task::Task;
use super::task_manager::TaskManager;

#[derive(Debug)]
pub struct ModbusProtocol {
    unit_id: u8,
    read: Mutex<TaskManager>,
    write: Mutex<TaskManager>,
}

impl ModbusProtocol {
    pub fn new(unit_id: u8) -> Self {
        Self {
            unit_id,
            read: Mutex::new(TaskManager::new()),
            write: Mutex::new(TaskManager::new()),
        }
    }

    /// Build a protocol from task constructors, failing on the first
    /// invalid definition
    pub fn with_tasks(unit_id: u8, tasks: impl IntoIterator<Item = Result<Task>>) -> Result<Self> {
        let protocol = Self::new(unit_id);
        for task in tasks {
            protocol.add_task(task?);
        }
        Ok(protocol)
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn add_task(&self, task: Task) {
        let task = Arc::new(task);
        if task.is_read() {
            self.read.lock().add(task);
        } else {
            self.write.lock().add(task);
        }
    }

    pub fn next_read_tasks(&self) -> Vec<Arc<Task>> {
        self.read.lock().next_tasks()
    }

    pub fn next_write_tasks(&self) -> Vec<Arc<Task>> {
        self.write.lock().next_tasks()
    }

    pub fn complete_read(&self, task: &Arc<Task>) {
        self.read.lock().complete(task);
    }

    pub fn complete_write(&self, task: &Arc<Task>) {
        self.write.lock().complete(task);
    }

    /// Resolve pending writes of every channel bound to a write task,
    /// skipping channels already in `resolved`
    pub fn shadow_copy_and_reset(&self, resolved: &mut ResolvedChannels) {
        for task in self.write.lock().tasks() {
            task.shadow_copy_and_reset(resolved);
        }
    }

    pub fn discard_writes(&self) {
        for task in self.write.lock().tasks() {
            task.discard_write();
        }
    }

    pub fn read_task_count(&self) -> usize {
        self.read.lock().len()
    }

    pub fn write_task_count(&self) -> usize {
        self.write.lock().len()
    }
}
