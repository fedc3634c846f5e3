//! In-memory relay (for testing and demos).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::*;

/// Scriptable relay. Task ids come from a queue, falling back to `task-<n>`.
#[derive(Default)]
pub struct MemoryRelay {
    task_ids: Mutex<VecDeque<String>>,
    submitted: Mutex<Vec<SignedRelayEnvelope>>,
    statuses: Mutex<HashMap<String, TaskStatus>>,
    reject_execute: AtomicBool,
    execute_delay: Mutex<Option<Duration>>,
    create_calls: AtomicUsize,
    execute_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_task_id(&self, task_id: &str) {
        self.task_ids.lock().unwrap().push_back(task_id.to_string());
    }

    /// Make `execute_relay_transaction` fail with a relay rejection.
    pub fn reject_execute(&self, reject: bool) {
        self.reject_execute.store(reject, Ordering::SeqCst);
    }

    /// Hold every execution for `delay` before answering.
    pub fn set_execute_delay(&self, delay: Option<Duration>) {
        *self.execute_delay.lock().unwrap() = delay;
    }

    pub fn set_task_state(&self, task_id: &str, state: TaskState, tx_hash: Option<&str>) {
        self.statuses.lock().unwrap().insert(
            task_id.to_string(),
            TaskStatus {
                task_id: task_id.to_string(),
                task_state: state,
                transaction_hash: tx_hash.map(str::to_string),
            },
        );
    }

    pub fn submitted(&self) -> Vec<SignedRelayEnvelope> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.create_calls() + self.execute_calls() + self.status_calls()
    }
}

#[async_trait]
impl RelayKit for MemoryRelay {
    async fn create_relayed_transaction(
        &self,
        transaction: SafeTransaction,
        options: RelayOptions,
    ) -> Result<RelayEnvelope> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        prepare_envelope(transaction, options)
    }

    async fn execute_relay_transaction(
        &self,
        signed: &SignedRelayEnvelope,
        _sponsored: bool,
    ) -> Result<RelayResponse> {
        let n = self.execute_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.execute_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject_execute.load(Ordering::SeqCst) {
            return Err(RelayFailure::Rejected("sponsor balance too low".into()).into());
        }
        let task_id = self
            .task_ids
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("task-{n}"));
        self.submitted.lock().unwrap().push(signed.clone());
        self.statuses
            .lock()
            .unwrap()
            .entry(task_id.clone())
            .or_insert_with(|| TaskStatus {
                task_id: task_id.clone(),
                task_state: TaskState::CheckPending,
                transaction_hash: None,
            });
        Ok(RelayResponse { task_id })
    }

    async fn get_task_status(&self, task_id: &str) -> Result<TaskStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .unwrap_or_else(|| TaskStatus {
                task_id: task_id.to_string(),
                task_state: TaskState::NotFound,
                transaction_hash: None,
            }))
    }
}
