use std::time::Duration;

use async_trait::async_trait;
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::RootCertStore;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::CertificateDer;
use tracing::{debug, warn};

use crate::blob_checker::Error;
use crate::configuration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
}

/// A single, non-retried existence check against an object URL.
///
/// `Ok` answers are authoritative; `Err` means the mirror could not be asked.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobProbe: Send + Sync {
    async fn probe(&self, blob_url: &str) -> Result<Presence, Error>;
}

pub struct HttpProbe {
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(
        server_ca_bundle: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, configuration::Error> {
        let tls_config = build_tls_config(server_ca_bundle)?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .build();

        Ok(Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            timeout,
        })
    }
}

fn build_tls_config(
    server_ca_bundle: Option<&str>,
) -> Result<rustls::ClientConfig, configuration::Error> {
    let mut root_store = RootCertStore::empty();

    let certs = if let Some(server_ca_bundle) = server_ca_bundle {
        CertificateDer::pem_file_iter(server_ca_bundle)?.collect::<Result<Vec<_>, _>>()?
    } else {
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            warn!("Failed to load a platform certificate: {error}");
        }
        native.certs
    };

    let (added, ignored) = root_store.add_parsable_certificates(certs);
    debug!("Probe TLS roots: {added} added, {ignored} ignored");

    Ok(rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth())
}

#[async_trait]
impl BlobProbe for HttpProbe {
    async fn probe(&self, blob_url: &str) -> Result<Presence, Error> {
        let request = Request::builder()
            .method(Method::HEAD)
            .uri(blob_url)
            .body(Empty::new())
            .map_err(|error| Error::InvalidInput(error.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| Error::Timeout)??;

        match response.status() {
            StatusCode::OK => Ok(Presence::Present),
            // object stores answer 403 for missing keys when listing is not allowed
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(Presence::Absent),
            status => Err(Error::UnexpectedStatus(status)),
        }
    }
}
