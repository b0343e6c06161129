use std::{fmt, io};

use opentelemetry_otlp::ExporterBuildError;
use rustls_pki_types::pem;
use tracing::debug;

use crate::geoip;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    ConfigurationFileFormat(String),
    InvalidValue(String),
    Tls(String),
    ExporterInit(ExporterBuildError),
    RegionTable(geoip::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {err}"),
            Error::ConfigurationFileFormat(error) => {
                write!(f, "Configuration file format error.")?;
                write!(f, "{error}")
            }
            Error::InvalidValue(error) => write!(f, "Invalid configuration value: {error}"),
            Error::Tls(error) => write!(f, "TLS error: {error}"),
            Error::ExporterInit(error) => {
                write!(f, "Exporter initialization error: {error}")
            }
            Error::RegionTable(error) => write!(f, "Region table error: {error}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        debug!("TOML error: {error}");
        Error::ConfigurationFileFormat(error.to_string())
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Tls(err.to_string())
    }
}

impl From<pem::Error> for Error {
    fn from(err: pem::Error) -> Self {
        Error::Tls(err.to_string())
    }
}

impl From<ExporterBuildError> for Error {
    fn from(error: ExporterBuildError) -> Self {
        Error::ExporterInit(error)
    }
}

impl From<geoip::Error> for Error {
    fn from(error: geoip::Error) -> Self {
        debug!("Region table error: {error}");
        Error::RegionTable(error)
    }
}
