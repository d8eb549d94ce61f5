/// Failure taxonomy shared by the dispatcher and its collaborators.
///
/// Each independent sub-task (a send, a stats write, a retraction) catches
/// its own error, so these values are logged or turned into a user-facing
/// reply rather than bubbling up to the transport.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required backing service was never configured.
    #[error("{0} is not configured")]
    ConfigurationUnavailable(&'static str),

    /// A Telegram call failed or returned `ok: false`.
    #[error("{method} failed: {description}")]
    RemoteCall {
        method: &'static str,
        description: String,
    },

    /// The inbound update could not be parsed.
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

impl Error {
    pub fn remote(method: &'static str, description: impl Into<String>) -> Self {
        Error::RemoteCall {
            method,
            description: description.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
