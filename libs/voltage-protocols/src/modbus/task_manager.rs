//! Per-cycle task selection
//!
//! Every cycle runs all ONCE tasks that have not succeeded yet, all HIGH
//! tasks and a single LOW task. LOW tasks take turns in registration order.

use std::sync::Arc;

use super::task::{Priority, Task};

#[derive(Debug, Default)]
pub struct TaskManager {
    once: Vec<Arc<Task>>,
    high: Vec<Arc<Task>>,
    low: Vec<Arc<Task>>,
    next_low: usize,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, task: Arc<Task>) {
        match task.priority() {
            Priority::Once => self.once.push(task),
            Priority::High => self.high.push(task),
            Priority::Low => self.low.push(task),
        }
    }

    /// Tasks to execute this cycle, in execution order
    ///
    /// Advances the LOW cursor, so call it exactly once per cycle.
    pub fn next_tasks(&mut self) -> Vec<Arc<Task>> {
        let mut tasks = Vec::with_capacity(self.once.len() + self.high.len() + 1);
        tasks.extend(self.once.iter().cloned());
        tasks.extend(self.high.iter().cloned());
        if !self.low.is_empty() {
            let index = self.next_low % self.low.len();
            tasks.push(Arc::clone(&self.low[index]));
            self.next_low = (index + 1) % self.low.len();
        }
        tasks
    }

    /// Mark a task as successfully executed; ONCE tasks are retired
    pub fn complete(&mut self, task: &Arc<Task>) {
        if task.priority() == Priority::Once {
            self.once.retain(|t| !Arc::ptr_eq(t, task));
        }
    }

    /// All tasks still scheduled, regardless of priority
    pub fn tasks(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.once.iter().chain(self.high.iter()).chain(self.low.iter())
    }

    pub fn len(&self) -> usize {
        self.once.len() + self.high.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
