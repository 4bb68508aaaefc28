use thiserror::Error;

/// Fatal error categories. Raised through `anyhow` so callers can recover
/// the category with `downcast_ref::<AutomlError>()`.
///
/// Recoverable conditions (skipped transformations, reuse without a prior
/// run) never become one of these.
#[derive(Error, Debug)]
pub enum AutomlError {
    /// Missing target column, unknown task type, unknown estimator kind,
    /// invalid run parameters.
    #[error("CONFIG/{0}")]
    Config(String),

    /// No well-formed structured payload could be recovered from a
    /// collaborator response.
    #[error("PAYLOAD/{site}: {detail}")]
    Payload { site: String, detail: String },

    /// Dataset missing or unreadable, snapshot not writable.
    #[error("RESOURCE/{0}")]
    Resource(String),

    /// The reasoning or estimator collaborator raised.
    #[error("COLLABORATOR/{0}")]
    Collaborator(String),
}

impl AutomlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Payload { .. } => "payload",
            Self::Resource(_) => "resource",
            Self::Collaborator(_) => "collaborator",
        }
    }
}

/// Category of an `anyhow::Error`, if it carries an `AutomlError` anywhere
/// in its chain.
pub fn category(err: &anyhow::Error) -> Option<&AutomlError> {
    err.chain().find_map(|e| e.downcast_ref::<AutomlError>())
}
