use std::fmt;

use hyper::StatusCode;

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    // caller errors
    InvalidInput(String),
    // probe failures, retried and never surfaced to clients
    Transport(String),
    Timeout,
    UnexpectedStatus(StatusCode),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidInput(err) => write!(f, "Invalid input: {err}"),
            Error::Transport(err) => write!(f, "Transport error: {err}"),
            Error::Timeout => write!(f, "Probe timed out"),
            Error::UnexpectedStatus(status) => write!(f, "Unexpected probe status: {status}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<hyper_util::client::legacy::Error> for Error {
    fn from(error: hyper_util::client::legacy::Error) -> Self {
        Error::Transport(error.to_string())
    }
}
