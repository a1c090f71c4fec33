use thiserror::Error;

use crate::form::FormError;

/// failure reported by a job service implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("rejected by job service ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("could not decode job service response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// transport failures and server side rejections may succeed on a later attempt
    pub fn is_retriable(&self) -> bool {
        match self {
            RemoteError::Transport(_) => true,
            RemoteError::Rejected { status, .. } => *status >= 500,
            RemoteError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            RemoteError::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Decode(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// no authenticated session handle, nothing was sent
    #[error("actor unavailable: no authenticated session")]
    SessionUnavailable,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Form(#[from] FormError),
}

impl Error {
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::Remote(remote) => remote.is_retriable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::{Error, RemoteError};

    #[test]
    fn test_retriable_classification() {
        assert!(Error::from(RemoteError::Transport("reset".to_string())).is_retriable());
        let unavailable = RemoteError::Rejected {
            status: 503,
            message: "busy".to_string(),
        };
        assert!(unavailable.is_retriable());
        let forbidden = RemoteError::Rejected {
            status: 403,
            message: "not an admin".to_string(),
        };
        assert!(!forbidden.is_retriable());
        assert!(!RemoteError::Decode("eof".to_string()).is_retriable());
        assert!(!Error::SessionUnavailable.is_retriable());
    }

    #[test]
    fn test_malformed_body_is_decode_error() {
        let err = serde_json::from_str::<Vec<u64>>("{\"jobs\": 1}").unwrap_err();
        match RemoteError::from(err) {
            RemoteError::Decode(_) => {}
            other => panic!("expected decode error, got: {:?}", other),
        }
    }
}
