//! Task executor.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sndx_queue::{QueuedTask, TaskQueue};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::pipeline::PipelineOrchestrator;

/// Stream message ids this worker is currently running.
///
/// A task that runs past the claim idle threshold shows up again in
/// `claim_pending`; it must not be started a second time while the first run
/// is still going.
#[derive(Debug, Clone, Default)]
pub struct InFlightTasks {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlightTasks {
    /// Mark `message_id` as running. Returns `None` if it already is.
    pub fn try_start(&self, message_id: &str) -> Option<InFlightGuard> {
        let inserted = self.lock().insert(message_id.to_string());
        inserted.then(|| InFlightGuard {
            ids: Arc::clone(&self.ids),
            message_id: message_id.to_string(),
        })
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.lock().contains(message_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears the in-flight mark when the run ends, however it ends.
#[derive(Debug)]
pub struct InFlightGuard {
    ids: Arc<Mutex<HashSet<String>>>,
    message_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.message_id);
    }
}

/// Task executor that processes clip tasks from the queue.
pub struct TaskExecutor {
    config: WorkerConfig,
    queue: Arc<TaskQueue>,
    orchestrator: Arc<PipelineOrchestrator>,
    task_semaphore: Arc<Semaphore>,
    in_flight: InFlightTasks,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl TaskExecutor {
    /// Create a new task executor.
    pub fn new(config: WorkerConfig, queue: TaskQueue, orchestrator: PipelineOrchestrator) -> Self {
        let task_semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            orchestrator: Arc::new(orchestrator),
            task_semaphore,
            in_flight: InFlightTasks::default(),
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor. Returns once shutdown was signalled and in-flight
    /// tasks finished or the shutdown timeout elapsed.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting task executor '{}' with {} max concurrent tasks",
            self.consumer_name, self.config.max_concurrent_tasks
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically reclaim tasks left pending by crashed workers
        let queue_clone = Arc::clone(&self.queue);
        let orchestrator_clone = Arc::clone(&self.orchestrator);
        let semaphore_clone = Arc::clone(&self.task_semaphore);
        let in_flight_clone = self.in_flight.clone();
        let consumer_name = self.consumer_name.clone();
        let claim_interval = self.config.claim_interval;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue_clone.claim_pending(&consumer_name, 5).await {
                            Ok(tasks) if !tasks.is_empty() => {
                                info!("Claimed {} pending tasks", tasks.len());
                                for task in tasks {
                                    if in_flight_clone.contains(&task.message_id) {
                                        debug!("Task {} is still running here, not reclaiming", task.clip.id);
                                        continue;
                                    }
                                    let Ok(permit) = Arc::clone(&semaphore_clone).acquire_owned().await else {
                                        break;
                                    };
                                    Self::dispatch(
                                        Arc::clone(&orchestrator_clone),
                                        Arc::clone(&queue_clone),
                                        &in_flight_clone,
                                        permit,
                                        task,
                                    );
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim pending tasks: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_tasks() => {
                    if let Err(e) = result {
                        error!("Error consuming tasks: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight tasks to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_tasks())
            .await
            .is_err()
        {
            warn!(
                "Shutdown timeout elapsed with {} tasks still running",
                self.in_flight.len()
            );
        }

        info!("Task executor stopped");
        Ok(())
    }

    /// Consume and dispatch tasks from the queue.
    async fn consume_tasks(&self) -> WorkerResult<()> {
        let available = self.task_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let tasks = self
            .queue
            .consume(
                &self.consumer_name,
                1000, // Block for 1 second
                available.min(5),
            )
            .await?;

        if tasks.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} tasks from queue", tasks.len());

        for task in tasks {
            let permit = Arc::clone(&self.task_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::task_failed("Semaphore closed"))?;
            Self::dispatch(
                Arc::clone(&self.orchestrator),
                Arc::clone(&self.queue),
                &self.in_flight,
                permit,
                task,
            );
        }

        Ok(())
    }

    /// Spawn a task run unless the same message is already running here.
    fn dispatch(
        orchestrator: Arc<PipelineOrchestrator>,
        queue: Arc<TaskQueue>,
        in_flight: &InFlightTasks,
        permit: OwnedSemaphorePermit,
        task: QueuedTask,
    ) {
        let Some(guard) = in_flight.try_start(&task.message_id) else {
            debug!("Task {} is already running, skipping", task.clip.id);
            return;
        };
        metrics::set_tasks_in_flight(in_flight.len());

        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            Self::execute_task(orchestrator, queue, task).await;
        });
    }

    /// Execute a single task with ack, retry and DLQ handling.
    async fn execute_task(
        orchestrator: Arc<PipelineOrchestrator>,
        queue: Arc<TaskQueue>,
        task: QueuedTask,
    ) {
        let clip_id = task.clip.id.clone();
        info!("Executing task {}", clip_id);

        match orchestrator.run(&task.clip).await {
            Ok(outcome) => {
                info!("Task {} finished: {}", clip_id, outcome.as_str());
                if let Err(e) = queue.ack(&task.message_id).await {
                    error!("Failed to ack task {}: {}", clip_id, e);
                }
            }
            Err(e) => {
                error!("Task {} failed: {}", clip_id, e);

                let retry_count = match queue.increment_retry(&task.message_id).await {
                    Ok(count) => count,
                    Err(retry_err) => {
                        warn!("Failed to count retry for task {}: {}", clip_id, retry_err);
                        u32::MAX
                    }
                };
                let max_retries = queue.max_retries();

                if retry_count >= max_retries {
                    warn!(
                        "Task {} exceeded max retries ({}), moving to DLQ",
                        clip_id, max_retries
                    );
                    metrics::record_dlq();
                    if let Err(dlq_err) = queue.dlq(&task, &e.to_string()).await {
                        error!("Failed to move task {} to DLQ: {}", clip_id, dlq_err);
                    }
                } else {
                    info!(
                        "Task {} will be retried (attempt {}/{})",
                        clip_id, retry_count, max_retries
                    );
                    // Redelivered once idle past the claim threshold
                }
            }
        }
    }

    /// Wait for all in-flight tasks to complete.
    async fn wait_for_tasks(&self) {
        while !self.in_flight.is_empty() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Handle for signalling shutdown from another task.
    pub fn shutdown_handle(&self) -> tokio::sync::watch::Sender<bool> {
        self.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_message_cannot_start_twice() {
        let in_flight = InFlightTasks::default();

        let guard = in_flight.try_start("1700000000000-0").unwrap();
        assert!(in_flight.contains("1700000000000-0"));
        assert!(in_flight.try_start("1700000000000-0").is_none());
        assert!(in_flight.try_start("1700000000001-0").is_some());

        drop(guard);
        assert!(!in_flight.contains("1700000000000-0"));
        assert!(in_flight.try_start("1700000000000-0").is_some());
    }

    #[tokio::test]
    async fn test_guard_released_when_run_ends() {
        let in_flight = InFlightTasks::default();
        let guard = in_flight.try_start("1-0").unwrap();

        tokio::spawn(async move {
            let _guard = guard;
        })
        .await
        .unwrap();

        assert!(in_flight.is_empty());
    }
}
