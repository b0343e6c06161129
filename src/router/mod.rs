use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};

use hyper::{HeaderMap, Method};
use tracing::{debug, instrument, warn};

use crate::blob_checker::BlobChecker;
use crate::configuration::UpstreamConfig;
use crate::geoip::RegionTrie;
use crate::metrics_provider::METRICS_PROVIDER;
use crate::mirror::{blob_url, MirrorResolver};

mod client_address;
mod route;

pub use client_address::ClientAddressPolicy;
use route::{decode_path, parse, upstream_location, Route, ROUTE_BLOB_REGEX};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedirectTarget {
    Mirror,
    Upstream,
    Info,
}

impl RedirectTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            RedirectTarget::Mirror => "mirror",
            RedirectTarget::Upstream => "upstream",
            RedirectTarget::Info => "info",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    MethodNotAllowed,
    ApiVersion,
    Redirect {
        location: String,
        target: RedirectTarget,
    },
    NotFound,
    BadRequest(String),
}

/// A decision and the metric label of the route it was made for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Routed {
    pub action: &'static str,
    pub decision: Decision,
}

/// Decides, per request, where a client should pull from.
pub struct Router {
    upstream_url: String,
    repository_prefix: String,
    info_url: String,
    regions: Arc<RegionTrie>,
    mirrors: MirrorResolver,
    blob_checker: Arc<dyn BlobChecker>,
    client_address: ClientAddressPolicy,
}

impl Router {
    pub fn new(
        upstream: &UpstreamConfig,
        regions: Arc<RegionTrie>,
        mirrors: MirrorResolver,
        blob_checker: Arc<dyn BlobChecker>,
        client_address: ClientAddressPolicy,
    ) -> Self {
        LazyLock::force(&ROUTE_BLOB_REGEX);

        Self {
            upstream_url: upstream.url.trim_end_matches('/').to_string(),
            repository_prefix: upstream.repository_prefix.clone(),
            info_url: upstream.info_url.clone(),
            regions,
            mirrors,
            blob_checker,
            client_address,
        }
    }

    #[instrument(skip(self, headers))]
    pub async fn route(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Routed {
        let path = match decode_path(path) {
            Ok(path) => path,
            Err(message) => {
                warn!("Rejecting request path: {message}");
                return Routed {
                    action: Route::Unknown.action_name(),
                    decision: Decision::BadRequest(message),
                };
            }
        };

        let route = parse(&path);
        let decision = self.decide(method, route, &path, headers, peer).await;

        Routed {
            action: route.action_name(),
            decision,
        }
    }

    async fn decide(
        &self,
        method: &Method,
        route: Route<'_>,
        path: &str,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Decision {
        if method != Method::GET && method != Method::HEAD {
            return Decision::MethodNotAllowed;
        }

        match route {
            Route::ApiVersion => Decision::ApiVersion,
            Route::Info => self.redirect(self.info_url.clone(), RedirectTarget::Info),
            Route::Upstream => self.redirect_upstream(path),
            Route::Blob { digest } => self.route_blob(path, digest, headers, peer).await,
            Route::Unknown => {
                debug!("Unknown request path: {path}");
                Decision::NotFound
            }
        }
    }

    async fn route_blob(
        &self,
        path: &str,
        digest: &str,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Decision {
        let client_address = match self.client_address.client_address(headers, peer) {
            Ok(address) => address,
            Err(error) => {
                warn!("Failed to get client address: {error}");
                return Decision::BadRequest(error.to_string());
            }
        };

        let Some(region) = self.regions.resolve(client_address) else {
            return self.redirect_upstream(path);
        };

        let Some(mirror) = self.mirrors.mirror_for(region) else {
            debug!("No mirror serves region {region}");
            return self.redirect_upstream(path);
        };

        match self.blob_checker.blob_exists(&mirror, digest).await {
            Ok(true) => self.redirect(blob_url(&mirror, digest), RedirectTarget::Mirror),
            Ok(false) => self.redirect_upstream(path),
            Err(error) => {
                warn!("Blob check for {digest} at {mirror} failed: {error}");
                self.redirect_upstream(path)
            }
        }
    }

    fn redirect_upstream(&self, path: &str) -> Decision {
        let location = upstream_location(&self.upstream_url, &self.repository_prefix, path);
        self.redirect(location, RedirectTarget::Upstream)
    }

    fn redirect(&self, location: String, target: RedirectTarget) -> Decision {
        debug!("Redirecting to {} at {location}", target.as_str());
        METRICS_PROVIDER
            .metric_redirect_total
            .with_label_values(&[target.as_str()])
            .inc();

        Decision::Redirect { location, target }
    }
}
