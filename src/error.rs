use std::fmt;

#[derive(Debug)]
pub enum DocSearchError {
    /// Neither transport could establish a session.
    Connection(String),
    /// The search tool is not offered by the server (or could not be listed).
    ToolUnavailable(String),
    /// The transport raised during a protocol call such as tools/list.
    Protocol(String),
    /// The tool call itself failed.
    Invocation {
        message: String,
        cause: Option<String>,
    },
    /// Malformed request at the local HTTP boundary.
    Parse(String),
    Network(reqwest::Error),
    Json(serde_json::Error),
    Timeout,
    IoError(std::io::Error),
    Other(String),
}

impl fmt::Display for DocSearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocSearchError::Connection(msg) => write!(f, "{}", msg),
            DocSearchError::ToolUnavailable(msg) => write!(f, "Tool unavailable: {}", msg),
            DocSearchError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            DocSearchError::Invocation { message, cause } => match cause {
                Some(cause) => write!(f, "{} ({})", message, cause),
                None => write!(f, "{}", message),
            },
            DocSearchError::Parse(msg) => write!(f, "{}", msg),
            DocSearchError::Network(e) => write!(f, "Network error: {}", e),
            DocSearchError::Json(e) => write!(f, "JSON error: {}", e),
            DocSearchError::Timeout => write!(f, "Request timeout"),
            DocSearchError::IoError(e) => write!(f, "IO error: {}", e),
            DocSearchError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for DocSearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocSearchError::Network(e) => Some(e),
            DocSearchError::Json(e) => Some(e),
            DocSearchError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DocSearchError {
    fn from(err: reqwest::Error) -> Self {
        DocSearchError::Network(err)
    }
}

impl From<serde_json::Error> for DocSearchError {
    fn from(err: serde_json::Error) -> Self {
        DocSearchError::Json(err)
    }
}

impl From<std::io::Error> for DocSearchError {
    fn from(err: std::io::Error) -> Self {
        DocSearchError::IoError(err)
    }
}

impl From<url::ParseError> for DocSearchError {
    fn from(err: url::ParseError) -> Self {
        DocSearchError::Other(format!("Invalid URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, DocSearchError>;
