use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::Uri;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::blob_checker::retry::{linear_backoff, retry_with_backoff};
use crate::blob_checker::{BlobChecker, BlobProbe, Config, Error, Presence};
use crate::metrics_provider::METRICS_PROVIDER;
use crate::mirror::blob_url;

// A full cache frees this fraction of its capacity per eviction scan.
const EVICTION_BATCH_DIVISOR: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct BlobKey {
    mirror: String,
    digest: String,
}

struct Entry {
    present: bool,
    expires_at: Instant,
    last_access: AtomicU64,
}

// Resolves to `Some(present)` once the probe for a key completes.
type Outcome = watch::Receiver<Option<bool>>;

enum Lookup {
    Cached(bool),
    Pending(Outcome),
}

struct Inner {
    probe: Arc<dyn BlobProbe>,
    entries: RwLock<HashMap<BlobKey, Entry>>,
    in_flight: Mutex<HashMap<BlobKey, Outcome>>,
    access_clock: AtomicU64,
    positive_ttl: Duration,
    negative_ttl: Duration,
    capacity: usize,
    eviction_batch: usize,
    probe_attempts: u32,
    probe_backoff: Duration,
}

impl Inner {
    fn tick(&self) -> u64 {
        self.access_clock.fetch_add(1, Ordering::Relaxed)
    }

    async fn cached(&self, key: &BlobKey) -> Option<bool> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;

        if entry.expires_at <= Instant::now() {
            return None;
        }

        entry.last_access.store(self.tick(), Ordering::Relaxed);
        Some(entry.present)
    }

    async fn join_or_start(self: &Arc<Self>, key: &BlobKey) -> Lookup {
        let mut in_flight = self.in_flight.lock().await;

        // a probe may have completed since the unlocked lookup
        if let Some(present) = self.cached(key).await {
            return Lookup::Cached(present);
        }

        if let Some(outcome) = in_flight.get(key) {
            // a closed channel means the probe task died without publishing
            if outcome.has_changed().is_ok() {
                METRICS_PROVIDER
                    .metric_blob_cache_lookup_total
                    .with_label_values(&["joined"])
                    .inc();
                return Lookup::Pending(outcome.clone());
            }
        }

        let (sender, outcome) = watch::channel(None);
        in_flight.insert(key.clone(), outcome.clone());
        drop(in_flight);

        METRICS_PROVIDER
            .metric_blob_cache_lookup_total
            .with_label_values(&["probed"])
            .inc();

        // Detached so that the probe outlives the request that started it.
        tokio::spawn(Arc::clone(self).probe(key.clone(), sender));

        Lookup::Pending(outcome)
    }

    async fn probe(self: Arc<Self>, key: BlobKey, sender: watch::Sender<Option<bool>>) {
        let url = blob_url(&key.mirror, &key.digest);
        debug!("Probing {url}");

        let result = retry_with_backoff(
            self.probe_attempts,
            linear_backoff(self.probe_backoff),
            |_| {
                let probe = Arc::clone(&self.probe);
                let url = url.clone();
                async move { probe.probe(&url).await }
            },
        )
        .await;

        let present = match result {
            Ok(presence) => {
                let present = presence == Presence::Present;
                let label = if present { "present" } else { "absent" };
                METRICS_PROVIDER
                    .metric_blob_probe_total
                    .with_label_values(&[label])
                    .inc();

                self.store(key.clone(), present).await;
                present
            }
            Err(error) => {
                METRICS_PROVIDER
                    .metric_blob_probe_total
                    .with_label_values(&["error"])
                    .inc();
                warn!(
                    "Probe of {url} failed after {} attempts: {error}",
                    self.probe_attempts
                );
                false
            }
        };

        self.in_flight.lock().await.remove(&key);
        sender.send_replace(Some(present));
    }

    async fn store(&self, key: BlobKey, present: bool) {
        let ttl = if present {
            self.positive_ttl
        } else {
            self.negative_ttl
        };
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            self.evict(&mut entries, now);
        }

        entries.insert(
            key,
            Entry {
                present,
                expires_at: now + ttl,
                last_access: AtomicU64::new(self.tick()),
            },
        );
    }

    /// Drops expired entries, then as many least recently used ones as it
    /// takes to leave `eviction_batch` free slots, so that a full cache is
    /// scanned once per batch of insertions rather than once per insertion.
    fn evict(&self, entries: &mut HashMap<BlobKey, Entry>, now: Instant) {
        entries.retain(|_, entry| entry.expires_at > now);

        let target = self.capacity - self.eviction_batch;
        if entries.len() <= target {
            return;
        }

        let mut by_access: Vec<(u64, BlobKey)> = entries
            .iter()
            .map(|(key, entry)| (entry.last_access.load(Ordering::Relaxed), key.clone()))
            .collect();
        let excess = entries.len() - target;
        if excess < by_access.len() {
            by_access.select_nth_unstable_by_key(excess, |(access, _)| *access);
        }

        for (_, key) in by_access.into_iter().take(excess) {
            entries.remove(&key);
        }
        debug!("Evicted {excess} least recently used entries from blob cache");
    }
}

/// Answers "is this blob present at this mirror", remembering authoritative
/// answers and collapsing concurrent questions about the same blob into a
/// single probe.
///
/// Present answers are kept for `positive_ttl` (blobs are immutable once
/// written), absent answers for `negative_ttl`. Probe transport failures are
/// reported as "not present" and are not cached.
pub struct CachedBlobChecker {
    inner: Arc<Inner>,
}

impl CachedBlobChecker {
    pub fn new(config: &Config, probe: Arc<dyn BlobProbe>) -> Self {
        info!(
            "Using in-memory blob cache (capacity: {}, positive TTL: {}s, negative TTL: {}s)",
            config.capacity, config.positive_ttl, config.negative_ttl
        );

        let capacity = config.capacity.max(1);

        Self {
            inner: Arc::new(Inner {
                probe,
                entries: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                access_clock: AtomicU64::new(0),
                positive_ttl: Duration::from_secs(config.positive_ttl),
                negative_ttl: Duration::from_secs(config.negative_ttl),
                capacity,
                eviction_batch: (capacity / EVICTION_BATCH_DIVISOR).max(1),
                probe_attempts: config.probe_attempts,
                probe_backoff: Duration::from_millis(config.probe_backoff_ms),
            }),
        }
    }
}

fn validate_mirror(mirror: &str) -> Result<(), Error> {
    let invalid = || Error::InvalidInput(format!("invalid mirror URL: '{mirror}'"));
    let uri = mirror.parse::<Uri>().map_err(|_| invalid())?;

    match (uri.scheme_str(), uri.authority()) {
        (Some("http" | "https"), Some(_)) => Ok(()),
        _ => Err(invalid()),
    }
}

fn validate_digest(digest: &str) -> Result<(), Error> {
    let is_sha256_hex =
        digest.len() == 64 && digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));

    if is_sha256_hex {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid sha256 digest: '{digest}'")))
    }
}

#[async_trait]
impl BlobChecker for CachedBlobChecker {
    async fn blob_exists(&self, mirror: &str, digest: &str) -> Result<bool, Error> {
        validate_mirror(mirror)?;
        validate_digest(digest)?;

        let key = BlobKey {
            mirror: mirror.to_string(),
            digest: digest.to_string(),
        };

        if let Some(present) = self.inner.cached(&key).await {
            METRICS_PROVIDER
                .metric_blob_cache_lookup_total
                .with_label_values(&["hit"])
                .inc();
            return Ok(present);
        }

        let mut outcome = match self.inner.join_or_start(&key).await {
            Lookup::Cached(present) => {
                METRICS_PROVIDER
                    .metric_blob_cache_lookup_total
                    .with_label_values(&["hit"])
                    .inc();
                return Ok(present);
            }
            Lookup::Pending(outcome) => outcome,
        };

        let present = match outcome.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or(false),
            Err(_) => {
                warn!("Probe for {digest} at {mirror} ended without an outcome");
                false
            }
        };

        Ok(present)
    }
}
