use std::path::Path;
use std::time::Duration;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// client settings. every field has a default, so a partial json file works.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatClientConfig {
    /// api root, e.g. `http://localhost:8080/api`.
    pub base_url: String,
    /// streaming completion path under `base_url`.
    pub completions_path: String,
    /// model selector sent with each request.
    pub model: String,
    pub connect_timeout_ms: Option<u64>,
    /// cancel a stream that delivers nothing for this long and report it as
    /// a failed turn. `None` relies on the transport alone.
    pub idle_timeout_ms: Option<u64>,
    /// bound of the worker -> main thread inbox.
    pub inbox_capacity: usize,
    /// inbox entries applied per `pump` call.
    pub max_events_per_pump: usize,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            completions_path: "/chat/completions".to_string(),
            model: "claude-haiku-4-5-20251001".to_string(),
            connect_timeout_ms: Some(10_000),
            idle_timeout_ms: None,
            inbox_capacity: 2048,
            max_events_per_pump: 512,
        }
    }
}

impl ChatClientConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// apply `CHAT_BASE_URL`, `CHAT_MODEL` and `CHAT_IDLE_TIMEOUT_MS`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("CHAT_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(model) = std::env::var("CHAT_MODEL") {
            self.model = model;
        }
        if let Some(ms) = std::env::var("CHAT_IDLE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.idle_timeout_ms = Some(ms);
        }
        self
    }

    pub fn completions_url(&self) -> String {
        join_url(&self.base_url, &self.completions_path)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
