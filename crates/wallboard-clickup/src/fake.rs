//! In-memory ClickUp page source for tests and offline runs
//!
//! FakeClickUp implements TaskPageSource:
//! - Serves scripted pages/errors in request order (an empty page once the script runs out)
//! - Records every request it receives
//! - Can hold a request open until released, to simulate a slow upstream

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{oneshot, watch};

use crate::error::Result;
use crate::fetcher::{PageRequest, TaskPageSource};
use crate::models::{RawTask, TaskPage};

#[derive(Default)]
struct FakeState {
    responses: VecDeque<Result<TaskPage>>,
    requests: Vec<PageRequest>,
    held: Option<oneshot::Receiver<()>>,
}

/// Cloning shares the script and the request log
#[derive(Clone)]
pub struct FakeClickUp {
    state: Arc<Mutex<FakeState>>,
    request_count: Arc<watch::Sender<usize>>,
}

/// Keeps a held request pending until released or dropped
pub struct RequestGate {
    release: Option<oneshot::Sender<()>>,
}

impl RequestGate {
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            let _ = release.send(());
        }
    }
}

impl Default for FakeClickUp {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeClickUp {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            request_count: Arc::new(watch::channel(0).0),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push_page(&self, page: TaskPage) {
        self.state().responses.push_back(Ok(page));
    }

    pub fn push_tasks(&self, tasks: Vec<serde_json::Value>) {
        self.push_page(TaskPage {
            tasks: tasks.into_iter().map(RawTask::from_json).collect(),
            last_page: None,
        });
    }

    pub fn push_error(&self, error: crate::error::WallboardError) {
        self.state().responses.push_back(Err(error));
    }

    /// The next request stays pending until the returned gate is released
    pub fn hold_next_request(&self) -> RequestGate {
        let (release, held) = oneshot::channel();
        self.state().held = Some(held);
        RequestGate {
            release: Some(release),
        }
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.state().requests.clone()
    }

    /// Resolves once at least `count` requests have been received
    pub async fn wait_for_requests(&self, count: usize) {
        let mut receiver = self.request_count.subscribe();
        let _ = receiver.wait_for(|received| *received >= count).await;
    }

    /// A page of `count` minimal tasks with ids `task-{start}`, `task-{start + 1}`, ...
    pub fn numbered_page(start: usize, count: usize, last_page: Option<bool>) -> TaskPage {
        TaskPage {
            tasks: (start..start + count)
                .map(|n| {
                    RawTask::from_json(json!({
                        "id": format!("task-{}", n),
                        "name": format!("Task {}", n),
                        "status": {"status": "to do", "type": "open"}
                    }))
                })
                .collect(),
            last_page,
        }
    }
}

#[async_trait]
impl TaskPageSource for FakeClickUp {
    async fn fetch_page(&self, request: &PageRequest) -> Result<TaskPage> {
        let (response, held) = {
            let mut state = self.state();
            state.requests.push(request.clone());
            let response = state.responses.pop_front().unwrap_or_else(|| Ok(TaskPage::default()));
            (response, state.held.take())
        };
        self.request_count.send_modify(|count| *count += 1);

        if let Some(held) = held {
            // Released or dropped gate both let the request finish
            let _ = held.await;
        }

        response
    }
}
