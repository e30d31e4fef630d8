//! Configuration for the ClickUp poller
//!
//! Read once at startup (see [`WallboardConfig::from_env`]) and passed by
//! reference into the poller. Nothing below the config layer reads the
//! environment.

use std::time::Duration;

use tracing::warn;

use crate::error::{Result, WallboardError};
use crate::fields::FieldSelectors;

pub const CLICKUP_API_BASE: &str = "https://api.clickup.com/api/v2";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

pub const ENV_API_TOKEN: &str = "CLICKUP_API_TOKEN";
pub const ENV_LIST_ID: &str = "CLICKUP_LIST_ID";
pub const ENV_API_BASE_URL: &str = "CLICKUP_API_BASE_URL";
pub const ENV_TAGS_FIELD_ID: &str = "CLICKUP_TAGS_FIELD_ID";
pub const ENV_PROJECT_FIELD_ID: &str = "CLICKUP_PROJECT_FIELD_ID";
pub const ENV_DEADLINE_FIELD_ID: &str = "CLICKUP_DEADLINE_FIELD_ID";
pub const ENV_PAGE_SIZE: &str = "CLICKUP_PAGE_SIZE";
pub const ENV_REFRESH_SECS: &str = "WALLBOARD_REFRESH_SECS";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WallboardConfig {
    pub api_token: Option<String>,
    pub list_id: Option<String>,
    pub api_base: String,
    pub page_size: u32,
    pub refresh_interval: Duration,
    pub field_selectors: FieldSelectors,
}

impl Default for WallboardConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            list_id: None,
            api_base: CLICKUP_API_BASE.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            field_selectors: FieldSelectors::default(),
        }
    }
}

/// Credential and list id, present and non-blank
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub api_token: String,
    pub list_id: String,
}

impl WallboardConfig {
    pub fn new(api_token: Option<String>, list_id: Option<String>) -> Self {
        Self {
            api_token,
            list_id,
            ..Self::default()
        }
    }

    /// Build the configuration from process environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let page_size = parse_or_default(ENV_PAGE_SIZE, get(ENV_PAGE_SIZE), DEFAULT_PAGE_SIZE)
            .max(1);
        let refresh_secs = parse_or_default(
            ENV_REFRESH_SECS,
            get(ENV_REFRESH_SECS),
            DEFAULT_REFRESH_INTERVAL.as_secs(),
        )
        .max(1);

        Self {
            api_token: get(ENV_API_TOKEN),
            list_id: get(ENV_LIST_ID),
            api_base: resolve_api_base(get(ENV_API_BASE_URL)),
            page_size,
            refresh_interval: Duration::from_secs(refresh_secs),
            field_selectors: FieldSelectors {
                tags_field_id: get(ENV_TAGS_FIELD_ID),
                project_field_id: get(ENV_PROJECT_FIELD_ID),
                deadline_field_id: get(ENV_DEADLINE_FIELD_ID),
            },
        }
    }

    /// Check that the credential and list id are present
    pub fn credentials(&self) -> Result<Credentials> {
        let missing: Vec<&str> = [
            (ENV_API_TOKEN, self.api_token.as_deref()),
            (ENV_LIST_ID, self.list_id.as_deref()),
        ]
        .into_iter()
        .filter(|(_, value)| value.map(str::trim).unwrap_or_default().is_empty())
        .map(|(key, _)| key)
        .collect();

        match (&self.api_token, &self.list_id) {
            (Some(api_token), Some(list_id)) if missing.is_empty() => Ok(Credentials {
                api_token: api_token.trim().to_string(),
                list_id: list_id.trim().to_string(),
            }),
            _ => Err(WallboardError::configuration(format!(
                "set {} in your environment",
                missing.join(" and ")
            ))),
        }
    }
}

/// An explicit override wins; otherwise the public API host
pub fn resolve_api_base(configured: Option<String>) -> String {
    configured
        .map(|base| base.trim().trim_end_matches('/').to_string())
        .filter(|base| !base.is_empty())
        .unwrap_or_else(|| CLICKUP_API_BASE.to_string())
}

fn parse_or_default<T>(key: &str, value: Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("[WallboardConfig] Ignoring unparseable {}={:?}", key, raw);
            default
        }),
    }
}
