//! Paged retrieval of every task in a list
//!
//! Pages are requested strictly in sequence (0, 1, 2, ...) and each one is
//! awaited before the next is issued. The sequence ends on an empty page, a
//! short page, or an explicit `last_page` flag.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, WallboardError};
use crate::models::{RawTask, TaskPage};

/// Upper bound on pages per fetch, in case a server keeps returning full pages
pub const MAX_PAGES: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub list_id: String,
    pub page: u32,
    pub page_size: u32,
}

/// Anything that can serve one page of the list task endpoint
#[async_trait]
pub trait TaskPageSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<TaskPage>;
}

/// Fetch all pages of `list_id`.
///
/// Cancelling `cancel` aborts the in-flight request and yields
/// [`WallboardError::Cancelled`].
pub async fn fetch_all(
    source: &dyn TaskPageSource,
    list_id: &str,
    page_size: u32,
    cancel: &CancellationToken,
) -> Result<Vec<RawTask>> {
    let page_size = page_size.max(1);
    let mut all_tasks = Vec::new();

    for page in 0..MAX_PAGES {
        if cancel.is_cancelled() {
            return Err(WallboardError::Cancelled);
        }

        let request = PageRequest {
            list_id: list_id.to_string(),
            page,
            page_size,
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WallboardError::Cancelled),
            response = source.fetch_page(&request) => response?,
        };

        let received = response.tasks.len();
        let last_page = response.is_last_page();
        all_tasks.extend(response.tasks);

        debug!(
            "[fetch_all] list={} page={} received={} last_page={} total={}",
            list_id,
            page,
            received,
            last_page,
            all_tasks.len()
        );

        if received == 0 || received != page_size as usize || last_page {
            return Ok(all_tasks);
        }
    }

    warn!(
        "[fetch_all] list={} still returning full pages after {} pages; stopping",
        list_id, MAX_PAGES
    );
    Ok(all_tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeClickUp;

    #[tokio::test]
    async fn follows_pages_until_short_page() {
        let fake = FakeClickUp::new();
        fake.push_page(FakeClickUp::numbered_page(0, 100, None));
        fake.push_page(FakeClickUp::numbered_page(100, 100, None));
        fake.push_page(FakeClickUp::numbered_page(200, 37, None));

        let tasks = fetch_all(&fake, "list-1", 100, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(tasks.len(), 237);
        let pages: Vec<u32> = fake.requests().iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![0, 1, 2]);
        assert!(fake.requests().iter().all(|r| r.page_size == 100 && r.list_id == "list-1"));
    }

    #[tokio::test]
    async fn stops_on_last_page_flag() {
        let fake = FakeClickUp::new();
        fake.push_page(FakeClickUp::numbered_page(0, 100, Some(true)));
        fake.push_page(FakeClickUp::numbered_page(100, 100, None));

        let tasks = fetch_all(&fake, "list-1", 100, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(tasks.len(), 100);
        assert_eq!(fake.requests().len(), 1);
    }

    #[tokio::test]
    async fn stops_on_empty_page() {
        let fake = FakeClickUp::new();
        fake.push_page(FakeClickUp::numbered_page(0, 2, Some(false)));
        fake.push_page(TaskPage::default());

        let tasks = fetch_all(&fake, "list-1", 2, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(fake.requests().len(), 2);
    }

    #[tokio::test]
    async fn error_on_later_page_aborts_whole_fetch() {
        let fake = FakeClickUp::new();
        fake.push_page(FakeClickUp::numbered_page(0, 10, None));
        fake.push_error(WallboardError::Upstream {
            status: 500,
            body: "boom".to_string(),
        });

        let err = fetch_all(&fake, "list-1", 10, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            WallboardError::Upstream {
                status: 500,
                body: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn cancelled_token_issues_no_request() {
        let fake = FakeClickUp::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetch_all(&fake, "list-1", 100, &cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn cancelling_aborts_pending_request() {
        let fake = FakeClickUp::new();
        let gate = fake.hold_next_request();
        fake.push_page(FakeClickUp::numbered_page(0, 1, None));

        let cancel = CancellationToken::new();
        let fetch = {
            let cancel = cancel.clone();
            let fake = fake.clone();
            tokio::spawn(async move { fetch_all(&fake, "list-1", 100, &cancel).await })
        };

        fake.wait_for_requests(1).await;
        cancel.cancel();

        let err = fetch.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        drop(gate);
    }
}
