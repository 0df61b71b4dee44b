//! Remote chat-server API: model discovery, history, message submission and login.
//!
//! `ChatApi` is the seam the session drives; `ApiClient` is the reqwest implementation.

mod client;
mod dialect;
mod error;

pub use client::{normalize_base, ApiClient};
pub use error::ApiError;

use crate::config::Dialect;
use crate::credentials::Credential;
use crate::message::Message;
use async_trait::async_trait;

/// Operations against the remote server. All network-bound; none retries.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Dialect this client speaks (decides whether history is fetched).
    fn dialect(&self) -> Dialect;

    /// First model id listed by the server, or `None` on any failure or an empty list.
    async fn discover_model(&self, credential: &Credential) -> Option<String>;

    /// Server-side history. Empty when the server omits the field; `Err` when the call fails.
    async fn fetch_history(&self, credential: &Credential) -> Result<Vec<Message>, ApiError>;

    /// Submit `text` after `conversation`; returns the assistant replies in order.
    async fn send_message(
        &self,
        credential: &Credential,
        model: &str,
        conversation: &[Message],
        text: &str,
    ) -> Result<Vec<Message>, ApiError>;

    /// Exchange a username and password for a token used as the API key.
    async fn login(
        &self,
        server_base: &str,
        username: &str,
        password: &str,
    ) -> Result<String, ApiError>;
}
