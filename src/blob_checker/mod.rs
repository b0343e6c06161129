use async_trait::async_trait;

mod cached;
mod config;
mod error;
mod probe;
mod retry;

pub use cached::CachedBlobChecker;
pub use config::Config;
pub use error::Error;
#[cfg(test)]
pub use probe::MockBlobProbe;
pub use probe::{BlobProbe, HttpProbe, Presence};

/// Answers whether a content-addressed blob is present at a mirror.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobChecker: Send + Sync {
    /// Check a blob by its sha256 hex digest at the given mirror base URL.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` if the mirror holds the blob
    /// * `Ok(false)` if it does not, or if it could not be asked
    /// * `Err(Error::InvalidInput)` if the mirror URL or digest is malformed
    async fn blob_exists(&self, mirror: &str, digest: &str) -> Result<bool, Error>;
}
