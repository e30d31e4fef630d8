//! ClickUp task polling for the team wallboard
//!
//! This crate turns one ClickUp list into a stream of normalized tasks:
//!
//! ## Data Path
//! - `config` - WallboardConfig (environment-driven settings)
//! - `client` - ClickUpClient (HTTP client for the list task endpoint)
//! - `fetcher` - TaskPageSource trait and paged `fetch_all`
//! - `models` - Lenient wire models and canonical Task types
//! - `fields` - Custom field discovery and option/date resolution
//! - `normalize` - Raw task to Task conversion
//! - `poller` - TaskPoller (refresh timer, superseding cycles, published state)
//! - `fake` - FakeClickUp, an in-memory page source for tests
//! - `error` - WallboardError

pub mod client;
pub mod config;
pub mod error;
pub mod fake;
pub mod fetcher;
pub mod fields;
pub mod models;
pub mod normalize;
pub mod poller;

pub use client::ClickUpClient;
pub use config::{Credentials, WallboardConfig};
pub use error::{Result, WallboardError};
pub use fake::{FakeClickUp, RequestGate};
pub use fetcher::{fetch_all, PageRequest, TaskPageSource};
pub use fields::FieldSelectors;
pub use models::{Assignee, Priority, StatusKind, Tag, Task, TaskStatus};
pub use normalize::{normalize, normalize_all};
pub use poller::{LoadStatus, PollSettings, PollState, TaskPoller};
