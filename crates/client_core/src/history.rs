use reqwest::{Client, StatusCode};
use shared::protocol::MessagePayload;
use tracing::debug;
use url::Url;

use crate::error::HistoryError;

/// Fetches persisted conversation history from the backend.
#[derive(Clone)]
pub struct HistoryClient {
    http: Client,
    server_url: String,
    bearer_token: Option<String>,
}

impl HistoryClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into(),
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub async fn private_history(
        &self,
        user: &str,
        peer: &str,
    ) -> Result<Vec<MessagePayload>, HistoryError> {
        self.fetch(&["api", "messages", "private", user, peer]).await
    }

    pub async fn group_history(&self, group_name: &str) -> Result<Vec<MessagePayload>, HistoryError> {
        self.fetch(&["api", "messages", "group", group_name]).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, HistoryError> {
        let mut url = Url::parse(self.server_url.trim())?;
        url.path_segments_mut()
            .map_err(|_| HistoryError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch(&self, segments: &[&str]) -> Result<Vec<MessagePayload>, HistoryError> {
        let url = self.endpoint(segments)?;
        let mut request = self.http.get(url.clone());
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(HistoryError::Unauthorized),
            status if !status.is_success() => return Err(HistoryError::Status(status.as_u16())),
            _ => {}
        }
        let messages: Vec<MessagePayload> = response.json().await?;
        debug!(url = %url, count = messages.len(), "history: fetched");
        Ok(messages)
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
