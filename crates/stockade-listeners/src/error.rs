use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListenerError {
    /// A name or group filter is not a valid regular expression.
    #[error("invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A listener callback failed; the broadcast stopped at this listener.
    #[error("listener '{listener}' failed: {reason}")]
    Failed { listener: String, reason: String },
}

impl ListenerError {
    pub fn failed(listener: impl Into<String>, reason: impl Into<String>) -> Self {
        ListenerError::Failed {
            listener: listener.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ListenerError>;
