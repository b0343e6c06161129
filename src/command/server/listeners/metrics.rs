use std::convert::Infallible;
use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tracing::{debug, error, info};

use crate::command::server::error::Error;
use crate::command::server::listeners::{accept, build_listener};
use crate::configuration::MetricsConfig;
use crate::metrics_provider::METRICS_PROVIDER;

/// Serves the Prometheus exposition on its own port, away from the public
/// redirect surface.
pub struct MetricsListener {
    binding_address: SocketAddr,
}

impl MetricsListener {
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            binding_address: SocketAddr::new(config.bind_address, config.port),
        }
    }

    pub async fn serve(&self) -> Result<(), Error> {
        info!("Serving metrics on {}", self.binding_address);
        let listener = build_listener(self.binding_address).await?;

        loop {
            let (tcp, _) = accept(&listener).await?;

            tokio::spawn(async move {
                let conn = http1::Builder::new()
                    .serve_connection(TokioIo::new(tcp), service_fn(handle_metrics_request));
                if let Err(error) = conn.await {
                    debug!("error serving metrics connection: {error}");
                }
            });
        }
    }
}

async fn handle_metrics_request(
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = if request.method() == Method::GET && request.uri().path() == "/metrics" {
        match METRICS_PROVIDER.gather() {
            Ok((content_type, metrics)) => Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, content_type)
                .body(Full::new(Bytes::from(metrics))),
            Err(error) => {
                error!("Failed to gather metrics: {error}");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::default())
            }
        }
    } else {
        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::default())
    };

    Ok(response.unwrap_or_else(|error| {
        error!("Failed to build metrics response: {error}");
        let mut response = Response::new(Full::default());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }))
}
