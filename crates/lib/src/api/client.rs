//! HTTP client for the remote chat server.
//!
//! Every call is a single request/response with the bearer token attached. No retries,
//! no timeouts: a failure is reported and the caller decides what to do.

use super::dialect;
use super::{ApiError, ChatApi};
use crate::config::Dialect;
use crate::credentials::Credential;
use crate::message::Message;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

/// Stateless request functions for one server dialect. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    dialect: Dialect,
    client: reqwest::Client,
}

/// Normalize a user-entered server URL: trim, drop trailing slashes, ensure it ends in `/api`.
pub fn normalize_base(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.ends_with("/api") {
        base.to_string()
    } else {
        format!("{}/api", base)
    }
}

impl ApiClient {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            client: reqwest::Client::new(),
        }
    }

    fn url(base: &str, path: &str) -> String {
        format!("{}{}", normalize_base(base), path)
    }

    async fn get_authed(&self, credential: &Credential, path: &str) -> Result<String, ApiError> {
        let url = Self::url(&credential.server_base, path);
        log::debug!("GET {}", url);
        let res = self
            .client
            .get(&url)
            .bearer_auth(&credential.api_key)
            .send()
            .await?;
        json_body(res).await
    }

    async fn post_authed<B: serde::Serialize + ?Sized>(
        &self,
        credential: &Credential,
        path: &str,
        body: &B,
    ) -> Result<String, ApiError> {
        let url = Self::url(&credential.server_base, path);
        log::debug!("POST {}", url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&credential.api_key)
            .json(body)
            .send()
            .await?;
        json_body(res).await
    }
}

/// Accept only 2xx responses whose content type is JSON; anything else is a protocol
/// failure carrying the raw body.
async fn json_body(res: reqwest::Response) -> Result<String, ApiError> {
    let status = res.status();
    let content_type = res
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !status.is_success() || !content_type.contains("application/json") {
        let body = res.text().await.unwrap_or_default();
        return Err(ApiError::Protocol {
            status: status.as_u16(),
            content_type,
            body,
        });
    }
    Ok(res.text().await?)
}

#[async_trait]
impl ChatApi for ApiClient {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// GET /models: first model's id (or name). Every failure reads as "no model".
    async fn discover_model(&self, credential: &Credential) -> Option<String> {
        let result = match self.get_authed(credential, dialect::MODELS_PATH).await {
            Ok(body) => dialect::decode_first_model(&body),
            Err(e) => Err(e),
        };
        match result {
            Ok(Some(model)) => Some(model),
            Ok(None) => {
                log::warn!("model discovery: server returned an empty model list");
                None
            }
            Err(e) => {
                log::warn!("model discovery failed: {}", e);
                None
            }
        }
    }

    /// GET /chats: server history, verbatim.
    async fn fetch_history(&self, credential: &Credential) -> Result<Vec<Message>, ApiError> {
        let Some(path) = dialect::history_path(self.dialect) else {
            log::debug!("{} dialect has no history endpoint", self.dialect.as_str());
            return Ok(Vec::new());
        };
        let body = self.get_authed(credential, path).await?;
        dialect::decode_history(&body)
    }

    /// POST /chat/completions or /message: assistant replies to `text`.
    async fn send_message(
        &self,
        credential: &Credential,
        model: &str,
        conversation: &[Message],
        text: &str,
    ) -> Result<Vec<Message>, ApiError> {
        let payload = dialect::send_body(self.dialect, model, conversation, text);
        let body = self
            .post_authed(credential, dialect::send_path(self.dialect), &payload)
            .await?;
        dialect::decode_reply(self.dialect, &body)
    }

    /// POST /login: exchange username/password for a token (unauthenticated).
    async fn login(
        &self,
        server_base: &str,
        username: &str,
        password: &str,
    ) -> Result<String, ApiError> {
        let url = Self::url(server_base, dialect::LOGIN_PATH);
        log::debug!("POST {}", url);
        let res = self
            .client
            .post(&url)
            .json(&dialect::login_body(username, password))
            .send()
            .await?;
        let body = json_body(res).await?;
        dialect::decode_login(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_appends_api() {
        assert_eq!(normalize_base("https://chat.example"), "https://chat.example/api");
        assert_eq!(normalize_base("https://chat.example/"), "https://chat.example/api");
        assert_eq!(normalize_base("  http://localhost:8080//  "), "http://localhost:8080/api");
    }

    #[test]
    fn normalize_base_keeps_existing_api() {
        assert_eq!(normalize_base("https://chat.example/api"), "https://chat.example/api");
        assert_eq!(normalize_base("https://chat.example/api/"), "https://chat.example/api");
    }

    #[test]
    fn url_joins_normalized_base() {
        assert_eq!(
            ApiClient::url("https://chat.example/", "/models"),
            "https://chat.example/api/models"
        );
    }
}
