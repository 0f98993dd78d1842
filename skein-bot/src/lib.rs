//! Skein Bot - chat-service adapters for bots.
//!
//! A bot talks to every chat platform through the same [`Service`]
//! trait. A service is opened once and hands back a bounded stream of
//! normalized [`Message`]s. Actions (send, join, ban, ...) go through the
//! service, and capabilities the platform lacks fail with
//! [`ServiceError::Unsupported`].
//!
//! # Architecture
//!
//! - **Message** ([`message`]) - Platform-neutral inbound message
//! - **Service** ([`service`]) - The adapter trait and shared state
//! - **Services** ([`services`]) - Platform adapters (IRC)
//! - **Config** ([`config`]) - JSON configuration and validation
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use skein_bot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let irc = IrcService::new(IrcConfig::new("irc.libera.chat", "skein", ["#skein"]));
//!     let mut messages = irc.open().await?;
//!     while let Some(msg) = messages.recv().await {
//!         println!("<{}> {}", msg.user_name(), msg.message());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! [`Service`]: service::Service
//! [`Message`]: message::Message
//! [`ServiceError::Unsupported`]: error::ServiceError::Unsupported

pub mod config;
pub mod error;
pub mod message;
pub mod service;
pub mod services;

/// Prelude module for convenient imports.
pub mod prelude {
    // Error types (centralized)
    pub use crate::error::{
        BotError, Capability, ConfigError, ConfigResult, ErrorContext, Result, ServiceError,
        ServiceResult, TransportError, TransportResult,
    };

    // Message
    pub use crate::message::Message;

    // Service
    pub use crate::service::{
        BoxedService, MessageStream, Service, ServiceBase, ServiceState, ServiceStatus,
    };

    // Services
    pub use crate::services::IrcService;
    pub use crate::services::irc::{Connection, ConnectionEvent, Connector, Identity};

    // Config
    pub use crate::config::{
        BotConfig, ConfigIssue, IrcConfig, IssueLevel, ReconnectConfig, config_path,
        init_config, load_config, save_config,
    };
}
