//! Event gateway
//!
//! Single entry point for all system inputs. Validates events, routes them
//! into per-session priority queues, dispatches to registered handlers, and
//! runs the proactive emitters (heartbeats, cron jobs).

mod queue;
mod scheduler;

pub use queue::SessionQueue;
pub use scheduler::{CronSchedule, JobRegistry};

use crate::domain::errors::{ScheduleError, ValidationError};
use crate::domain::events::{EventType, InputEvent};
use crate::domain::types::CronJobType;
use crate::infrastructure::audit::{BlockData, SharedChain};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Idle delay between drain passes of a processing loop
const PROCESS_LOOP_IDLE: std::time::Duration = std::time::Duration::from_millis(100);

/// Priorities assigned to scheduler-emitted events
const HEARTBEAT_PRIORITY: u8 = 3;
const CRON_PRIORITY: u8 = 4;

/// Handler invoked for each dispatched event.
///
/// Errors are caught, logged to the audit chain, and never abort the drain.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &InputEvent) -> anyhow::Result<()>;
}

/// Overall gateway counters
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub events_received: u64,
    pub events_rejected: u64,
    pub events_processed: u64,
    pub active_sessions: usize,
    pub is_running: bool,
    pub scheduled_jobs: usize,
}

/// Per-queue counters
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub total_enqueued: u64,
}

pub struct Gateway {
    chain: Option<SharedChain>,
    queues: Mutex<HashMap<String, SessionQueue>>,
    handlers: RwLock<HashMap<EventType, Vec<Arc<dyn EventHandler>>>>,
    jobs: JobRegistry,
    processing_tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    running: AtomicBool,
    events_received: AtomicU64,
    events_rejected: AtomicU64,
    events_processed: AtomicU64,
}

impl Gateway {
    pub fn new(chain: Option<SharedChain>) -> Self {
        Self {
            chain,
            queues: Mutex::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            jobs: JobRegistry::new(),
            processing_tasks: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            events_received: AtomicU64::new(0),
            events_rejected: AtomicU64::new(0),
            events_processed: AtomicU64::new(0),
        }
    }

    // ===== Submission =====

    /// Validate and enqueue an event, returning its (possibly assigned) id.
    pub async fn submit(&self, mut event: InputEvent) -> Result<String, ValidationError> {
        self.events_received.fetch_add(1, Ordering::Relaxed);

        if event.event_id.is_empty() {
            event.event_id = format!("evt_{}", crate::domain::events::short_hex(12));
        }
        if let Err(e) = event.validate() {
            self.events_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }

        let event_id = event.event_id.clone();
        let session_id = event.session_id.clone();
        let priority = event.priority;
        let receipt_tag = match event.event_type() {
            EventType::MarketEvent => "market_event_detected",
            other => other.as_str(),
        };

        {
            let mut queues = self.queues.lock().await;
            queues
                .entry(session_id.clone())
                .or_insert_with(SessionQueue::new)
                .push(event);
        }

        self.log(
            BlockData::new(receipt_tag)
                .session(&session_id)
                .actor("gateway")
                .action("event_received")
                .field("event_id", event_id.clone())
                .field("priority", priority),
        );

        info!(
            "Gateway: event {event_id} submitted to session {session_id} (priority={priority})"
        );
        Ok(event_id)
    }

    // ===== Dispatch =====

    /// Drain one session's queue in priority order, dispatching each event
    /// to all handlers registered for its type.
    pub async fn process_session(&self, session_id: &str) {
        loop {
            let event = {
                let mut queues = self.queues.lock().await;
                match queues.get_mut(session_id) {
                    Some(queue) => queue.pop(),
                    None => {
                        warn!("Gateway: no queue exists for session {session_id}");
                        return;
                    }
                }
            };
            let Some(event) = event else {
                return;
            };

            self.dispatch(&event).await;
            self.events_processed.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn dispatch(&self, event: &InputEvent) {
        let handlers = {
            let registered = self.handlers.read().await;
            registered.get(&event.event_type()).cloned().unwrap_or_default()
        };

        if handlers.is_empty() {
            warn!("Gateway: no handlers registered for {}", event.type_tag());
            return;
        }

        for handler in handlers {
            if let Err(e) = handler.handle(event).await {
                error!(
                    "Gateway: handler failed for event {}: {e:#}",
                    event.event_id
                );
                self.log(
                    BlockData::new("event_processing_error")
                        .session(&event.session_id)
                        .actor("gateway")
                        .action("dispatch")
                        .field("event_id", event.event_id.clone())
                        .field("error", format!("{e:#}")),
                );
            }
        }
    }

    /// Register a handler; handlers run in registration order.
    pub async fn register_handler(&self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .await
            .entry(event_type)
            .or_default()
            .push(handler);
        debug!("Gateway: handler registered for {event_type}");
    }

    /// Remove a previously registered handler. Returns whether it was found.
    pub async fn unregister_handler(
        &self,
        event_type: EventType,
        handler: &Arc<dyn EventHandler>,
    ) -> bool {
        let mut handlers = self.handlers.write().await;
        if let Some(registered) = handlers.get_mut(&event_type) {
            let before = registered.len();
            registered.retain(|h| !Arc::ptr_eq(h, handler));
            return registered.len() < before;
        }
        false
    }

    // ===== Lifecycle =====

    /// Start accepting processing loops. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Gateway started");
    }

    /// Stop the gateway: cancels processing loops and scheduler jobs.
    /// Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for (_, task) in self.processing_tasks.lock().await.drain() {
            task.abort();
        }
        self.jobs.shutdown();
        info!("Gateway stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn a background loop draining the session's queue as events arrive
    pub async fn start_processing(self: Arc<Self>, session_id: &str) {
        let mut tasks = self.processing_tasks.lock().await;
        if tasks.contains_key(session_id) {
            return;
        }

        let gateway = Arc::clone(&self);
        let session = session_id.to_string();
        let task = tokio::spawn(async move {
            while gateway.is_running() {
                gateway.process_session(&session).await;
                tokio::time::sleep(PROCESS_LOOP_IDLE).await;
            }
        });
        tasks.insert(session_id.to_string(), task);
        info!("Gateway: started processing for session {session_id}");
    }

    pub async fn stop_processing(&self, session_id: &str) {
        if let Some(task) = self.processing_tasks.lock().await.remove(session_id) {
            task.abort();
            info!("Gateway: stopped processing for session {session_id}");
        }
    }

    // ===== Scheduler =====

    /// Emit a heartbeat for the given portfolios every `interval_minutes`.
    pub fn schedule_heartbeat(
        self: Arc<Self>,
        portfolio_ids: Vec<String>,
        session_id: impl Into<String>,
        interval_minutes: u64,
    ) -> Result<String, ScheduleError> {
        if interval_minutes == 0 {
            return Err(ScheduleError::InvalidInterval {
                minutes: interval_minutes,
            });
        }

        let job_id = format!("heartbeat_{}", crate::domain::events::short_hex(8));
        let gateway = Arc::clone(&self);
        let session_id = session_id.into();
        let interval = std::time::Duration::from_secs(interval_minutes * 60);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so the first
            // heartbeat lands one interval from now.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let event = InputEvent::heartbeat(session_id.clone(), portfolio_ids.clone())
                    .with_priority(HEARTBEAT_PRIORITY);
                if let Err(e) = gateway.submit(event).await {
                    error!("Gateway: scheduled heartbeat rejected: {e}");
                }
            }
        });

        self.jobs.insert(job_id.clone(), handle);
        info!(
            "Gateway: scheduled heartbeat {job_id} every {interval_minutes} min"
        );
        Ok(job_id)
    }

    /// Emit a cron job event whenever the expression matches (minute
    /// resolution). The expression is validated here; misconfigured jobs
    /// never get registered.
    pub fn schedule_cron_job(
        self: Arc<Self>,
        job_type: CronJobType,
        session_id: impl Into<String>,
        cron_expression: &str,
        instructions: impl Into<String>,
    ) -> Result<String, ScheduleError> {
        let schedule = CronSchedule::parse(cron_expression)?;

        let job_id = format!("cron_{}_{}", job_type, crate::domain::events::short_hex(8));
        let gateway = Arc::clone(&self);
        let session_id = session_id.into();
        let instructions = instructions.into();

        let handle = tokio::spawn(async move {
            loop {
                // Wake at the next minute boundary and test the schedule
                let now = Utc::now();
                let wait_secs = 60 - (now.timestamp() % 60) as u64;
                tokio::time::sleep(std::time::Duration::from_secs(wait_secs)).await;

                if schedule.matches(Utc::now()) {
                    let instructions = if instructions.is_empty() {
                        format!("Execute {job_type}")
                    } else {
                        instructions.clone()
                    };
                    let event = InputEvent::cron_job(session_id.clone(), job_type, instructions)
                        .with_priority(CRON_PRIORITY);
                    if let Err(e) = gateway.submit(event).await {
                        error!("Gateway: scheduled cron job rejected: {e}");
                    }
                }
            }
        });

        self.jobs.insert(job_id.clone(), handle);
        info!("Gateway: scheduled cron job {job_id} with expression '{cron_expression}'");
        Ok(job_id)
    }

    /// Cancel a scheduled job by id
    pub fn cancel_job(&self, job_id: &str) -> bool {
        self.jobs.cancel(job_id)
    }

    // ===== Introspection =====

    pub async fn queue_stats(&self) -> HashMap<String, QueueStats> {
        self.queues
            .lock()
            .await
            .iter()
            .map(|(session_id, queue)| {
                (
                    session_id.clone(),
                    QueueStats {
                        pending: queue.len(),
                        total_enqueued: queue.total_enqueued(),
                    },
                )
            })
            .collect()
    }

    pub async fn stats(&self) -> GatewayStats {
        GatewayStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            active_sessions: self.queues.lock().await.len(),
            is_running: self.is_running(),
            scheduled_jobs: self.jobs.len(),
        }
    }

    /// Drop all pending events for a session, returning how many were cleared
    pub async fn clear_queue(&self, session_id: &str) -> usize {
        let mut queues = self.queues.lock().await;
        match queues.get_mut(session_id) {
            Some(queue) => {
                let cleared = queue.len();
                *queue = SessionQueue::new();
                cleared
            }
            None => 0,
        }
    }

    fn log(&self, data: BlockData) {
        if let Some(chain) = &self.chain {
            if let Err(e) = chain.append(data) {
                warn!("Gateway: audit append failed: {e}");
            }
        }
    }
}
