use std::fmt;

#[derive(Debug, PartialEq)]
pub enum Error {
    Initialization(String),
    Execution(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Initialization(err) | Error::Execution(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {}
