//! Parley core library: credential store, chat-server API client and session state
//! used by both the CLI and desktop applications.

pub mod api;
pub mod config;
pub mod credentials;
pub mod init;
pub mod message;
pub mod session;
