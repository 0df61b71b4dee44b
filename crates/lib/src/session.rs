//! Client session: credential, discovered model, conversation and connection status.
//!
//! `Session` is a plain state machine. Its transition functions return the next network
//! `Command` to run (if any); the caller runs it with [`run_command`] wherever it likes
//! (inline, or on a worker thread for the desktop) and feeds the `Outcome` back through
//! [`Session::apply`]. `SessionController` is the inline driver used by the CLI.
//!
//! Every command carries the epoch current when it was issued. Reconnecting or resetting
//! the conversation bumps the epoch, so late results for an older epoch are dropped.

use crate::api::{ApiError, ChatApi};
use crate::credentials::{Credential, CredentialStore};
use crate::message::{Message, MessageIds};

pub const DISCOVERY_FAILED: &str = "Failed to retrieve models";

/// Connection status. Errors are an overlay (`Session::error`), not a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Disconnected,
    Discovering,
    Ready,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Disconnected => "disconnected",
            Status::Discovering => "discovering model",
            Status::Ready => "ready",
        }
    }
}

/// Local failures that block an action. Remote failures go to the error overlay instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error("not connected: no model has been discovered yet")]
    NotReady,
}

/// A network call the session wants made. Not `Debug`: `Login` carries a password.
#[derive(Clone)]
pub enum Command {
    Login {
        epoch: u64,
        server_base: String,
        username: String,
        password: String,
    },
    DiscoverModel {
        epoch: u64,
        credential: Credential,
    },
    FetchHistory {
        epoch: u64,
        credential: Credential,
    },
    SendMessage {
        epoch: u64,
        credential: Credential,
        model: String,
        /// Conversation before the new user message.
        conversation: Vec<Message>,
        text: String,
    },
}

/// Result of a `Command`, fed back into `Session::apply`.
#[derive(Debug)]
pub enum Outcome {
    LoggedIn {
        epoch: u64,
        server_base: String,
        result: Result<String, ApiError>,
    },
    ModelDiscovered {
        epoch: u64,
        model: Option<String>,
    },
    HistoryLoaded {
        epoch: u64,
        result: Result<Vec<Message>, ApiError>,
    },
    RepliesReceived {
        epoch: u64,
        result: Result<Vec<Message>, ApiError>,
    },
}

impl Outcome {
    fn epoch(&self) -> u64 {
        match self {
            Outcome::LoggedIn { epoch, .. }
            | Outcome::ModelDiscovered { epoch, .. }
            | Outcome::HistoryLoaded { epoch, .. }
            | Outcome::RepliesReceived { epoch, .. } => *epoch,
        }
    }
}

/// Run one command against the API.
pub async fn run_command(api: &dyn ChatApi, command: Command) -> Outcome {
    match command {
        Command::Login {
            epoch,
            server_base,
            username,
            password,
        } => {
            let result = api.login(&server_base, &username, &password).await;
            Outcome::LoggedIn {
                epoch,
                server_base,
                result,
            }
        }
        Command::DiscoverModel { epoch, credential } => Outcome::ModelDiscovered {
            epoch,
            model: api.discover_model(&credential).await,
        },
        Command::FetchHistory { epoch, credential } => Outcome::HistoryLoaded {
            epoch,
            result: api.fetch_history(&credential).await,
        },
        Command::SendMessage {
            epoch,
            credential,
            model,
            conversation,
            text,
        } => Outcome::RepliesReceived {
            epoch,
            result: api
                .send_message(&credential, &model, &conversation, &text)
                .await,
        },
    }
}

/// Session state. Created at startup, lives for the process.
pub struct Session {
    store: CredentialStore,
    fetch_history: bool,
    credential: Option<Credential>,
    model: Option<String>,
    status: Status,
    error: Option<String>,
    conversation: Vec<Message>,
    epoch: u64,
    ids: MessageIds,
}

impl Session {
    /// `fetch_history`: whether entering Ready triggers a history fetch (dialect-dependent).
    pub fn new(store: CredentialStore, fetch_history: bool) -> Self {
        Self {
            store,
            fetch_history,
            credential: None,
            model: None,
            status: Status::Disconnected,
            error: None,
            conversation: Vec::new(),
            epoch: 0,
            ids: MessageIds::default(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Startup: adopt the persisted credential, if complete, and start discovery.
    /// Storage is not rewritten.
    pub fn resume(&mut self) -> Option<Command> {
        if self.status != Status::Disconnected {
            return None;
        }
        let credential = self.store.load().complete()?;
        log::info!("resuming session for {}", credential.server_base);
        Some(self.enter_discovering(credential))
    }

    /// Accept a new credential: persist it, drop the conversation, start discovery.
    pub fn connect(&mut self, server_base: &str, api_key: &str) -> Result<Command, SessionError> {
        let server_base = server_base.trim();
        let api_key = api_key.trim();
        if server_base.is_empty() || api_key.is_empty() {
            return Err(self.reject("Server URL and API key are required"));
        }
        if let Err(e) = self.store.save(server_base, api_key) {
            log::warn!("could not persist credentials: {:#}", e);
        }
        log::info!("connecting to {}", server_base);
        Ok(self.enter_discovering(Credential::new(server_base, api_key)))
    }

    /// Login auth mode: validate and request the username/password exchange. The returned
    /// token is handed to `connect` when the outcome arrives.
    pub fn begin_login(
        &mut self,
        server_base: &str,
        username: &str,
        password: &str,
    ) -> Result<Command, SessionError> {
        let server_base = server_base.trim();
        let username = username.trim();
        if server_base.is_empty() || username.is_empty() || password.is_empty() {
            return Err(self.reject("Server URL, username and password are required"));
        }
        self.error = None;
        Ok(Command::Login {
            epoch: self.epoch,
            server_base: server_base.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Optimistically append the user's message and request the send. Whitespace-only text
    /// is ignored without error.
    pub fn begin_send(&mut self, text: &str) -> Result<Option<Command>, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let (Status::Ready, Some(credential), Some(model)) =
            (self.status, self.credential.clone(), self.model.clone())
        else {
            self.error = Some(SessionError::NotReady.to_string());
            return Err(SessionError::NotReady);
        };
        self.error = None;
        let conversation = self.conversation.clone();
        let id = self.ids.next();
        self.conversation.push(Message::user(text).with_id(id));
        Ok(Some(Command::SendMessage {
            epoch: self.epoch,
            credential,
            model,
            conversation,
            text: text.to_string(),
        }))
    }

    /// Start a fresh conversation with the same credential and model. Replies still in
    /// flight are dropped when they arrive.
    pub fn reset_conversation(&mut self) {
        self.epoch += 1;
        self.conversation.clear();
        self.error = None;
    }

    /// Apply a command's outcome. Returns the follow-up command, if the transition has one.
    pub fn apply(&mut self, outcome: Outcome) -> Option<Command> {
        if outcome.epoch() != self.epoch {
            log::debug!(
                "dropping stale result (epoch {} != {})",
                outcome.epoch(),
                self.epoch
            );
            return None;
        }
        match outcome {
            Outcome::LoggedIn {
                server_base,
                result,
                ..
            } => match result {
                Ok(token) => self.connect(&server_base, &token).ok(),
                Err(e) => {
                    log::warn!("login failed: {}", e);
                    self.error = Some(format!("Login failed: {}", e.summary()));
                    None
                }
            },
            Outcome::ModelDiscovered { model, .. } => {
                if self.status != Status::Discovering {
                    return None;
                }
                match model {
                    Some(model) => {
                        log::info!("model discovered: {}", model);
                        self.model = Some(model);
                        self.status = Status::Ready;
                        match (&self.credential, self.fetch_history) {
                            (Some(credential), true) => Some(Command::FetchHistory {
                                epoch: self.epoch,
                                credential: credential.clone(),
                            }),
                            _ => None,
                        }
                    }
                    None => {
                        self.error = Some(DISCOVERY_FAILED.to_string());
                        None
                    }
                }
            }
            Outcome::HistoryLoaded { result, .. } => {
                match result {
                    Ok(history) => {
                        log::info!("loaded {} history message(s)", history.len());
                        let mut merged: Vec<Message> = history
                            .into_iter()
                            .map(|m| self.with_assigned_id(m))
                            .collect();
                        merged.append(&mut self.conversation);
                        self.conversation = merged;
                    }
                    Err(e) => {
                        log::warn!("history fetch failed: {}", e);
                        self.error = Some(format!("Failed to load history: {}", e.summary()));
                    }
                }
                None
            }
            Outcome::RepliesReceived { result, .. } => {
                match result {
                    Ok(replies) => {
                        for reply in replies {
                            let reply = self.with_assigned_id(reply);
                            self.conversation.push(reply);
                        }
                    }
                    Err(e) => {
                        log::warn!("send failed: {}", e);
                        self.error = Some(format!("Failed to send message: {}", e.summary()));
                    }
                }
                None
            }
        }
    }

    fn enter_discovering(&mut self, credential: Credential) -> Command {
        self.epoch += 1;
        self.conversation.clear();
        self.model = None;
        self.error = None;
        self.credential = Some(credential.clone());
        self.status = Status::Discovering;
        Command::DiscoverModel {
            epoch: self.epoch,
            credential,
        }
    }

    fn reject(&mut self, message: &str) -> SessionError {
        self.error = Some(message.to_string());
        SessionError::Validation(message.to_string())
    }

    fn with_assigned_id(&mut self, mut message: Message) -> Message {
        if message.id.is_empty() {
            message.id = self.ids.next();
        }
        message
    }
}

/// Drives a `Session` inline: each operation runs its command chain to completion.
pub struct SessionController<A> {
    session: Session,
    api: A,
}

impl<A: ChatApi> SessionController<A> {
    pub fn new(api: A, store: CredentialStore) -> Self {
        let fetch_history = api.dialect().supports_history();
        Self {
            session: Session::new(store, fetch_history),
            api,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Resume the persisted credential, if any.
    pub async fn resume(&mut self) {
        let next = self.session.resume();
        self.drive(next).await;
    }

    pub async fn connect(&mut self, server_base: &str, api_key: &str) -> Result<(), SessionError> {
        let next = self.session.connect(server_base, api_key)?;
        self.drive(Some(next)).await;
        Ok(())
    }

    pub async fn connect_with_login(
        &mut self,
        server_base: &str,
        username: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        let next = self.session.begin_login(server_base, username, password)?;
        self.drive(Some(next)).await;
        Ok(())
    }

    pub async fn send_message(&mut self, text: &str) -> Result<(), SessionError> {
        let next = self.session.begin_send(text)?;
        self.drive(next).await;
        Ok(())
    }

    pub fn reset_conversation(&mut self) {
        self.session.reset_conversation();
    }

    pub fn clear_error(&mut self) {
        self.session.clear_error();
    }

    async fn drive(&mut self, mut next: Option<Command>) {
        while let Some(command) = next {
            let outcome = run_command(&self.api, command).await;
            next = self.session.apply(outcome);
        }
    }
}
