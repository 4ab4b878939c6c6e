//! Error types of the engine

use thiserror::Error;

/// Failure to turn expression text into an action tree
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Unexpected token, unmatched parenthesis, unknown name
    #[error("syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },

    /// Known action given parameters it cannot be built from
    #[error("invalid parameters: {message}")]
    Construction { message: String },
}

impl ParseError {
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            position,
            message: message.into(),
        }
    }

    pub fn construction(message: impl Into<String>) -> Self {
        ParseError::Construction {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed profile document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("profile document must be an object, found {0}")]
    NotAnObject(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config decoding error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("config encoding error: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver channel closed: {0}")]
    ChannelClosed(String),

    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),
}
