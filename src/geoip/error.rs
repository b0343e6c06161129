use std::{fmt, io};

use tracing::debug;

#[derive(Debug)]
pub enum Error {
    MalformedPrefix(String),
    RangeDocument(String),
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MalformedPrefix(prefix) => write!(f, "Malformed IP prefix: '{prefix}'"),
            Error::RangeDocument(err) => write!(f, "Invalid range document: {err}"),
            Error::Io(err) => write!(f, "IO error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        debug!("JSON error: {err}");
        Error::RangeDocument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::MalformedPrefix("10.0.0.0/33".to_string());
        assert_eq!(error.to_string(), "Malformed IP prefix: '10.0.0.0/33'");

        let error = Error::RangeDocument("missing field".to_string());
        assert_eq!(error.to_string(), "Invalid range document: missing field");
    }
}
