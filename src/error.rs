//! Error taxonomy shared by the dispenser components.

/// Result type for dispenser operations.
pub type Result<T> = std::result::Result<T, DispenserError>;

/// Errors raised by the remote store, hardware and parsing layers.
///
/// Workers never let these escape: they are logged, shown on the display
/// and the worker carries on with its next cycle.
#[derive(Debug, thiserror::Error)]
pub enum DispenserError {
    /// The remote store was unreachable or rejected the request.
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable error details.
        message: String,
    },

    /// A schedule time could not be parsed.
    #[error("parse error: {message}")]
    Parse {
        /// Human-readable error details.
        message: String,
    },

    /// A display, actuator or GPIO write failed.
    #[error("hardware error: {message}")]
    Hardware {
        /// Human-readable error details.
        message: String,
    },

    /// The remote record is gone while a write would assert it.
    #[error("remote record missing: {medication}")]
    MissingRecord {
        /// Medication whose record was deleted.
        medication: String,
    },

    /// Invalid configuration.
    #[error("config error: {message}")]
    Config {
        /// Human-readable error details.
        message: String,
    },
}

impl DispenserError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a hardware error.
    #[must_use]
    pub fn hardware(message: impl Into<String>) -> Self {
        Self::Hardware {
            message: message.into(),
        }
    }

    /// Creates a config error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Short text suitable for the second display line.
    pub fn display_text(&self) -> String {
        match self {
            Self::Transport { message }
            | Self::Parse { message }
            | Self::Hardware { message }
            | Self::Config { message } => message.clone(),
            Self::MissingRecord { medication } => format!("{medication} gone"),
        }
    }
}

impl From<reqwest::Error> for DispenserError {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err.to_string())
    }
}

impl From<std::io::Error> for DispenserError {
    fn from(err: std::io::Error) -> Self {
        Self::hardware(err.to_string())
    }
}
