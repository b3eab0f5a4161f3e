//! plain request/response collaborators: conversation crud plus the read-only
//! settings, auth and usage endpoints. nothing here streams.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ureq::http::Response;

use crate::config::{ChatClientConfig, join_url};
use crate::error::ApiError;
use crate::extract::api_error_message;
use crate::transport::build_agent;
use crate::types::{ConversationDetail, ConversationId, ConversationSummary};

/// remote conversation store used by the orchestrator. calls block; the
/// client runs them on worker threads.
pub trait ConversationApi: Send + Sync + 'static {
    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError>;
    fn get_conversation(&self, id: &ConversationId) -> Result<ConversationDetail, ApiError>;
    fn create_conversation(
        &self,
        title: Option<&str>,
        model: Option<&str>,
    ) -> Result<ConversationSummary, ApiError>;
    fn update_conversation(
        &self,
        id: &ConversationId,
        title: &str,
    ) -> Result<ConversationSummary, ApiError>;
    fn delete_conversation(&self, id: &ConversationId) -> Result<(), ApiError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsStatus {
    pub has_api_key: bool,
    pub api_key_masked: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthStatus {
    pub logged_in: bool,
    #[serde(default)]
    pub auth_method: String,
    pub api_provider: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub total_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub avg_response_time_ms: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

#[derive(Serialize)]
struct CreateConversation<'a> {
    title: Option<&'a str>,
    model: Option<&'a str>,
}

#[derive(Serialize)]
struct UpdateConversation<'a> {
    title: &'a str,
}

/// json-over-http client for the backend's rest endpoints.
#[derive(Clone)]
pub struct UreqApi {
    agent: ureq::Agent,
    base_url: String,
}

impl UreqApi {
    pub fn new(config: &ChatClientConfig) -> Self {
        Self {
            agent: build_agent(config),
            base_url: config.base_url.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn read_body(mut response: Response<ureq::Body>) -> Result<String, ApiError> {
        let status = response.status().as_u16();
        let text = response.body_mut().read_to_string()?;
        if !(200..300).contains(&status) {
            return Err(ApiError::Status {
                status,
                message: api_error_message(status, &text),
            });
        }
        Ok(text)
    }

    fn decode<T: DeserializeOwned>(response: Response<ureq::Body>) -> Result<T, ApiError> {
        let text = Self::read_body(response)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        Self::decode(self.agent.get(&self.url(path)).call()?)
    }

    pub fn settings(&self) -> Result<SettingsStatus, ApiError> {
        self.get("/settings")
    }

    pub fn auth_status(&self) -> Result<AuthStatus, ApiError> {
        self.get("/settings/auth/status")
    }

    pub fn usage_summary(&self, days: u32) -> Result<UsageSummary, ApiError> {
        self.get(&format!("/usage/summary?days={days}"))
    }

    pub fn models(&self) -> Result<Vec<ModelInfo>, ApiError> {
        self.get("/models")
    }
}

impl ConversationApi for UreqApi {
    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        self.get("/conversations")
    }

    fn get_conversation(&self, id: &ConversationId) -> Result<ConversationDetail, ApiError> {
        self.get(&format!("/conversations/{id}"))
    }

    fn create_conversation(
        &self,
        title: Option<&str>,
        model: Option<&str>,
    ) -> Result<ConversationSummary, ApiError> {
        let response = self
            .agent
            .post(&self.url("/conversations"))
            .send_json(CreateConversation { title, model })?;
        Self::decode(response)
    }

    fn update_conversation(
        &self,
        id: &ConversationId,
        title: &str,
    ) -> Result<ConversationSummary, ApiError> {
        let response = self
            .agent
            .put(&self.url(&format!("/conversations/{id}")))
            .send_json(UpdateConversation { title })?;
        Self::decode(response)
    }

    fn delete_conversation(&self, id: &ConversationId) -> Result<(), ApiError> {
        let response = self
            .agent
            .delete(&self.url(&format!("/conversations/{id}")))
            .call()?;
        Self::read_body(response).map(|_| ())
    }
}
