//! Normalized inbound messages.
//!
//! Every transport turns its native events into a [`Message`] so that the
//! dispatcher and plugins never see a transport-specific shape. Fields a
//! transport cannot express resolve to an empty string or `false`.

use serde::{Deserialize, Serialize};

/// A transport-agnostic view of one inbound chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    channel: String,
    user_name: String,
    user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_avatar: Option<String>,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(default)]
    is_moderator: bool,
}

impl Message {
    /// Create a message whose user ID equals the user name.
    pub fn new(
        channel: impl Into<String>,
        user_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let user_name = user_name.into();
        Self {
            channel: channel.into(),
            user_id: user_name.clone(),
            user_name,
            user_avatar: None,
            text: text.into(),
            message_id: None,
            is_moderator: false,
        }
    }

    /// Set a user ID distinct from the user name.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Set the sender's avatar URL.
    #[must_use]
    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.user_avatar = Some(url.into());
        self
    }

    /// Set the transport's message identifier.
    #[must_use]
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Mark whether the sender is a moderator.
    #[must_use]
    pub const fn with_moderator(mut self, is_moderator: bool) -> Self {
        self.is_moderator = is_moderator;
        self
    }

    /// Channel or conversation the message was posted to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Display name of the sender.
    #[must_use]
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Stable identifier of the sender.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Avatar URL, empty when the transport has none.
    #[must_use]
    pub fn user_avatar(&self) -> &str {
        self.user_avatar.as_deref().unwrap_or_default()
    }

    /// Message body.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.text
    }

    /// Message identifier, empty when the transport cannot address messages.
    #[must_use]
    pub fn message_id(&self) -> &str {
        self.message_id.as_deref().unwrap_or_default()
    }

    /// Whether the sender holds moderator privileges.
    #[must_use]
    pub const fn is_moderator(&self) -> bool {
        self.is_moderator
    }
}
