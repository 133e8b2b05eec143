//! Errors raised by the Directus HTTP client

use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    /// The server answered with a non-success status
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },
    /// The response body was not the JSON we expected
    Decode { path: String, message: String },
    /// The request never got an answer (connection, timeout, TLS, ...)
    Transport {
        context: String,
        source: reqwest::Error,
    },
    InvalidUrl { url: String },
}

impl ApiError {
    /// Status code of a `Status` error
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn decode(path: &str, message: impl fmt::Display) -> Self {
        Self::Decode {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status {
                method,
                path,
                status,
                body,
            } => {
                write!(f, "{} {} returned {}", method, path, status)?;
                if !body.is_empty() {
                    write!(f, ": {}", body)?;
                }
                Ok(())
            }
            Self::Decode { path, message } => {
                write!(f, "Could not read response of {}: {}", path, message)
            }
            Self::Transport { context, source } => write!(f, "{}: {}", context, source),
            Self::InvalidUrl { url } => write!(f, "Invalid Directus URL: {}", url),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}
