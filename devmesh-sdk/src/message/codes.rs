use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Error kinds carried inside a reply rather than thrown at the call site.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No owning gateway, or no subscriber on its topic.
    ClientOffline,
    /// The gateway acknowledged but never wrote a reply.
    NoReply,
    /// Reply payload type was not recognized.
    UnsupportedMessage,
    /// Unexpected store error during send.
    SystemError,
}

impl ErrorCode {
    /// Human-readable default message for this code.
    pub fn text(&self) -> &'static str {
        match self {
            ErrorCode::ClientOffline => "client offline",
            ErrorCode::NoReply => "no reply from device",
            ErrorCode::UnsupportedMessage => "unsupported message type",
            ErrorCode::SystemError => "system error",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}
