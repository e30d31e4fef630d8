//! Refresh lifecycle for the task list
//!
//! TaskPoller owns the published [`PollState`]:
//! - One worker task runs a fetch cycle immediately and then on every tick
//! - Starting a cycle cancels the one still in flight (superseding, never queuing)
//! - Results of a superseded or stopped cycle are dropped, never applied
//! - Consumers read clones of the state through a watch channel
//!
//! Every state mutation that follows an await point goes through
//! `PollerShared::finish_cycle`, which holds the cycle slot lock and checks the
//! cycle generation and the shutdown token first.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ClickUpClient;
use crate::config::WallboardConfig;
use crate::error::{Result, WallboardError};
use crate::fetcher::{fetch_all, TaskPageSource};
use crate::fields::FieldSelectors;
use crate::models::Task;
use crate::normalize::normalize_all;

/// Shortest accepted refresh period; `tokio::time::interval` rejects zero
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Read-only snapshot published to consumers
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    /// Last successfully normalized list; kept when a later cycle fails
    pub tasks: Arc<Vec<Task>>,
    pub status: LoadStatus,
    /// Present only when `status` is `Error`
    pub error: Option<WallboardError>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for PollState {
    fn default() -> Self {
        Self {
            tasks: Arc::new(Vec::new()),
            status: LoadStatus::Idle,
            error: None,
            last_updated: None,
        }
    }
}

impl PollState {
    pub fn has_loaded(&self) -> bool {
        self.last_updated.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub list_id: String,
    pub page_size: u32,
    pub refresh_interval: Duration,
    pub field_selectors: FieldSelectors,
}

impl PollSettings {
    pub fn from_config(config: &WallboardConfig, list_id: String) -> Self {
        Self {
            list_id,
            page_size: config.page_size,
            refresh_interval: config.refresh_interval,
            field_selectors: config.field_selectors.clone(),
        }
    }
}

#[derive(Default)]
struct CycleSlot {
    generation: u64,
    in_flight: Option<CancellationToken>,
    has_loaded: bool,
}

struct PollerShared {
    source: Arc<dyn TaskPageSource>,
    settings: PollSettings,
    state_tx: Arc<watch::Sender<PollState>>,
    slot: Mutex<CycleSlot>,
    shutdown: CancellationToken,
}

impl PollerShared {
    fn slot(&self) -> MutexGuard<'_, CycleSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Supersede any in-flight cycle and spawn a new one
    fn begin_cycle(self: &Arc<Self>) {
        let mut slot = self.slot();
        if self.shutdown.is_cancelled() {
            return;
        }

        if let Some(previous) = slot.in_flight.take() {
            debug!(
                "[TaskPoller] Superseding in-flight cycle {}",
                slot.generation
            );
            previous.cancel();
        }

        slot.generation += 1;
        let generation = slot.generation;
        let cancel = self.shutdown.child_token();
        slot.in_flight = Some(cancel.clone());

        if !slot.has_loaded {
            self.state_tx.send_if_modified(|state| {
                if state.status == LoadStatus::Loading {
                    return false;
                }
                state.status = LoadStatus::Loading;
                state.error = None;
                true
            });
        }
        drop(slot);

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let result = shared.run_cycle(generation, &cancel).await;
            shared.finish_cycle(generation, result);
        });
    }

    #[tracing::instrument(name = "wallboard.fetch_cycle", skip(self, cancel), fields(list_id = %self.settings.list_id))]
    async fn run_cycle(&self, generation: u64, cancel: &CancellationToken) -> Result<Vec<Task>> {
        let raw_tasks = fetch_all(
            self.source.as_ref(),
            &self.settings.list_id,
            self.settings.page_size,
            cancel,
        )
        .await?;
        Ok(normalize_all(&raw_tasks, &self.settings.field_selectors))
    }

    /// Apply a cycle's outcome unless it was superseded or the poller stopped
    fn finish_cycle(&self, generation: u64, result: Result<Vec<Task>>) {
        let mut slot = self.slot();
        if self.shutdown.is_cancelled() || slot.generation != generation {
            debug!(
                "[TaskPoller] Discarding result of cycle {} (current {}, stopped={})",
                generation,
                slot.generation,
                self.shutdown.is_cancelled()
            );
            return;
        }
        slot.in_flight = None;

        match result {
            Ok(tasks) => {
                slot.has_loaded = true;
                info!(
                    "[TaskPoller] Cycle {} loaded {} tasks from list {}",
                    generation,
                    tasks.len(),
                    self.settings.list_id
                );
                self.state_tx.send_replace(PollState {
                    tasks: Arc::new(tasks),
                    status: LoadStatus::Success,
                    error: None,
                    last_updated: Some(Utc::now()),
                });
            }
            Err(WallboardError::Cancelled) => {
                debug!("[TaskPoller] Cycle {} cancelled", generation);
            }
            Err(error) => {
                warn!("[TaskPoller] Cycle {} failed: {}", generation, error);
                self.state_tx.send_modify(|state| {
                    state.status = LoadStatus::Error;
                    state.error = Some(error);
                });
            }
        }
    }
}

/// Polls one ClickUp list and publishes normalized tasks
pub struct TaskPoller {
    state_tx: Arc<watch::Sender<PollState>>,
    shared: Option<Arc<PollerShared>>,
    shutdown: CancellationToken,
    refresh: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TaskPoller {
    /// Validate the configuration and start polling ClickUp.
    ///
    /// With a missing credential or list id the poller is created in the
    /// `Error` state and never touches the network. Otherwise this must be
    /// called from within a Tokio runtime.
    pub fn start(config: &WallboardConfig) -> Self {
        let prepared = config.credentials().and_then(|credentials| {
            let client = ClickUpClient::new(&credentials.api_token, &config.api_base)?;
            Ok((credentials, client))
        });

        match prepared {
            Ok((credentials, client)) => {
                debug!("[TaskPoller] Using ClickUp API at {}", client.api_base());
                Self::with_source(
                    PollSettings::from_config(config, credentials.list_id),
                    Arc::new(client),
                )
            }
            Err(error) => Self::failed(error),
        }
    }

    /// Start polling an arbitrary page source. Must be called from within a
    /// Tokio runtime.
    ///
    /// The refresh interval is raised to [`MIN_REFRESH_INTERVAL`] and the page
    /// size to 1 when set lower.
    pub fn with_source(mut settings: PollSettings, source: Arc<dyn TaskPageSource>) -> Self {
        settings.refresh_interval = settings.refresh_interval.max(MIN_REFRESH_INTERVAL);
        settings.page_size = settings.page_size.max(1);

        let (state_tx, _) = watch::channel(PollState::default());
        let state_tx = Arc::new(state_tx);
        let shutdown = CancellationToken::new();
        let refresh = Arc::new(Notify::new());

        info!(
            "[TaskPoller] Polling list {} every {:?} (page size {})",
            settings.list_id, settings.refresh_interval, settings.page_size
        );

        let shared = Arc::new(PollerShared {
            source,
            settings,
            state_tx: Arc::clone(&state_tx),
            slot: Mutex::new(CycleSlot::default()),
            shutdown: shutdown.clone(),
        });

        let worker = tokio::spawn(run_worker(Arc::clone(&shared), Arc::clone(&refresh)));

        Self {
            state_tx,
            shared: Some(shared),
            shutdown,
            refresh,
            worker: Mutex::new(Some(worker)),
        }
    }

    fn failed(error: WallboardError) -> Self {
        warn!("[TaskPoller] Not polling: {}", error);
        let (state_tx, _) = watch::channel(PollState {
            status: LoadStatus::Error,
            error: Some(error),
            ..PollState::default()
        });

        Self {
            state_tx: Arc::new(state_tx),
            shared: None,
            shutdown: CancellationToken::new(),
            refresh: Arc::new(Notify::new()),
            worker: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> PollState {
        self.state_tx.borrow().clone()
    }

    /// Run a cycle now, superseding the one in flight
    pub fn refresh(&self) {
        if self.is_running() {
            self.refresh.notify_one();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_some() && !self.shutdown.is_cancelled()
    }

    /// Stop the timer and cancel in-flight work. Safe to call repeatedly.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            debug!("[TaskPoller] Stopping");
        }
        self.shutdown.cancel();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            worker.abort();
        }
    }
}

impl Drop for TaskPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_worker(shared: Arc<PollerShared>, refresh: Arc<Notify>) {
    let mut ticker = tokio::time::interval(shared.settings.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
            _ = refresh.notified() => {
                debug!("[TaskPoller] Manual refresh requested");
            }
        }
        shared.begin_cycle();
    }

    debug!("[TaskPoller] Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeClickUp;
    use serde_json::json;

    const WAIT: Duration = Duration::from_secs(5);

    fn settings(refresh_interval: Duration) -> PollSettings {
        PollSettings {
            list_id: "list-1".to_string(),
            page_size: 100,
            refresh_interval,
            field_selectors: FieldSelectors::default(),
        }
    }

    async fn wait_for_status(rx: &mut watch::Receiver<PollState>, status: LoadStatus) -> PollState {
        tokio::time::timeout(WAIT, rx.wait_for(|state| state.status == status))
            .await
            .expect("timed out waiting for status")
            .expect("poller dropped")
            .clone()
    }

    #[test]
    fn missing_configuration_never_polls() {
        let poller = TaskPoller::start(&WallboardConfig::default());
        let state = poller.snapshot();

        assert_eq!(state.status, LoadStatus::Error);
        assert!(matches!(state.error, Some(WallboardError::Configuration { .. })));
        assert!(state.tasks.is_empty());
        assert!(!poller.is_running());
        poller.refresh();
        poller.stop();
    }

    #[tokio::test]
    async fn first_cycle_loads_tasks() {
        let fake = FakeClickUp::new();
        fake.push_tasks(vec![json!({"id": "a"}), json!({"id": "b"})]);

        let poller = TaskPoller::with_source(settings(Duration::from_secs(3600)), Arc::new(fake.clone()));
        let mut rx = poller.subscribe();
        let state = wait_for_status(&mut rx, LoadStatus::Success).await;

        assert_eq!(state.tasks.len(), 2);
        assert!(state.error.is_none());
        assert!(state.has_loaded());
        assert_eq!(fake.requests().len(), 1);
    }

    #[tokio::test]
    async fn loading_is_shown_only_before_first_success() {
        let fake = FakeClickUp::new();
        let gate = fake.hold_next_request();
        fake.push_tasks(vec![json!({"id": "a"})]);

        let poller = TaskPoller::with_source(settings(Duration::from_secs(3600)), Arc::new(fake.clone()));
        let mut rx = poller.subscribe();
        wait_for_status(&mut rx, LoadStatus::Loading).await;
        gate.release();
        wait_for_status(&mut rx, LoadStatus::Success).await;

        let gate = fake.hold_next_request();
        fake.push_tasks(vec![json!({"id": "a"}), json!({"id": "b"})]);
        poller.refresh();
        fake.wait_for_requests(2).await;

        assert_eq!(poller.snapshot().status, LoadStatus::Success);
        assert_eq!(poller.snapshot().tasks.len(), 1);

        gate.release();
        let state = tokio::time::timeout(WAIT, rx.wait_for(|state| state.tasks.len() == 2))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(state.status, LoadStatus::Success);
    }

    #[tokio::test]
    async fn error_keeps_last_good_tasks() {
        let fake = FakeClickUp::new();
        fake.push_tasks(vec![json!({"id": "a"}), json!({"id": "b"})]);
        fake.push_error(WallboardError::Upstream {
            status: 502,
            body: "bad gateway".to_string(),
        });

        let poller = TaskPoller::with_source(settings(Duration::from_secs(3600)), Arc::new(fake.clone()));
        let mut rx = poller.subscribe();
        wait_for_status(&mut rx, LoadStatus::Success).await;

        poller.refresh();
        let state = wait_for_status(&mut rx, LoadStatus::Error).await;

        assert_eq!(state.tasks.len(), 2);
        assert_eq!(
            state.error,
            Some(WallboardError::Upstream {
                status: 502,
                body: "bad gateway".to_string()
            })
        );

        // recovers on the next cycle
        fake.push_tasks(vec![json!({"id": "c"})]);
        poller.refresh();
        let state = wait_for_status(&mut rx, LoadStatus::Success).await;
        assert_eq!(state.tasks.len(), 1);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn superseded_cycle_never_mutates_state() {
        let fake = FakeClickUp::new();
        let gate = fake.hold_next_request();
        fake.push_tasks(vec![json!({"id": "stale"})]);
        fake.push_tasks(vec![json!({"id": "fresh-1"}), json!({"id": "fresh-2"})]);

        let poller = TaskPoller::with_source(settings(Duration::from_secs(3600)), Arc::new(fake.clone()));
        let mut rx = poller.subscribe();
        fake.wait_for_requests(1).await;

        poller.refresh();
        let state = wait_for_status(&mut rx, LoadStatus::Success).await;
        assert_eq!(state.tasks.len(), 2);

        gate.release();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = poller.snapshot();
        let ids: Vec<_> = state.tasks.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids, vec!["fresh-1", "fresh-2"]);
    }

    #[tokio::test]
    async fn stale_generation_result_is_discarded() {
        let fake = FakeClickUp::new();
        fake.push_tasks(vec![json!({"id": "a"})]);

        let poller = TaskPoller::with_source(settings(Duration::from_secs(3600)), Arc::new(fake));
        let mut rx = poller.subscribe();
        let before = wait_for_status(&mut rx, LoadStatus::Success).await;

        let shared = poller.shared.clone().unwrap();
        shared.finish_cycle(0, Ok(Vec::new()));
        shared.finish_cycle(
            0,
            Err(WallboardError::Transport {
                message: "late".to_string(),
            }),
        );

        assert_eq!(poller.snapshot(), before);
    }

    #[tokio::test]
    async fn cancellation_is_never_reported() {
        let fake = FakeClickUp::new();
        fake.push_tasks(vec![json!({"id": "a"})]);

        let poller = TaskPoller::with_source(settings(Duration::from_secs(3600)), Arc::new(fake));
        let mut rx = poller.subscribe();
        let before = wait_for_status(&mut rx, LoadStatus::Success).await;

        let shared = poller.shared.clone().unwrap();
        let current = shared.slot().generation;
        shared.finish_cycle(current, Err(WallboardError::Cancelled));

        assert_eq!(poller.snapshot(), before);
    }

    #[tokio::test]
    async fn stop_cancels_in_flight_and_is_idempotent() {
        let fake = FakeClickUp::new();
        let gate = fake.hold_next_request();
        fake.push_tasks(vec![json!({"id": "a"})]);

        let poller = TaskPoller::with_source(settings(Duration::from_secs(3600)), Arc::new(fake.clone()));
        fake.wait_for_requests(1).await;

        poller.stop();
        poller.stop();
        gate.release();
        poller.refresh();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = poller.snapshot();
        assert_eq!(state.status, LoadStatus::Loading);
        assert!(state.tasks.is_empty());
        assert!(!poller.is_running());
        assert_eq!(fake.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_raised_to_minimum() {
        let fake = FakeClickUp::new();
        fake.push_page(FakeClickUp::numbered_page(0, 1, Some(true)));
        let started = tokio::time::Instant::now();

        let mut zero = settings(Duration::ZERO);
        zero.page_size = 0;
        let poller = TaskPoller::with_source(zero, Arc::new(fake.clone()));
        let mut rx = poller.subscribe();

        let state = wait_for_status(&mut rx, LoadStatus::Success).await;
        assert_eq!(state.tasks.len(), 1);
        assert!(poller.is_running());

        fake.wait_for_requests(3).await;
        assert!(started.elapsed() >= MIN_REFRESH_INTERVAL * 2);
        assert!(fake.requests().iter().all(|request| request.page_size == 1));
        poller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_on_every_tick() {
        let fake = FakeClickUp::new();
        let started = tokio::time::Instant::now();

        let poller = TaskPoller::with_source(settings(Duration::from_secs(60)), Arc::new(fake.clone()));
        fake.wait_for_requests(3).await;

        assert!(started.elapsed() >= Duration::from_secs(120));
        poller.stop();
    }
}
