use std::sync::Arc;

use argh::FromArgs;
use tracing::{info, warn};

mod error;
mod http_server;
mod listeners;
mod server_context;

use crate::command;
use crate::command::server::listeners::insecure::InsecureListener;
use crate::command::server::listeners::metrics::MetricsListener;
use crate::configuration::Configuration;
use crate::mirror::MirrorResolver;
use crate::router::Router;
pub use error::Error;
pub use server_context::ServerContext;

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "server",
    description = "Run the redirector listeners"
)]
pub struct Options {}

pub struct Command {
    listener: InsecureListener,
    metrics_listener: Option<MetricsListener>,
}

impl Command {
    pub fn new(config: &Configuration) -> Result<Self, command::Error> {
        let regions = Arc::new(config.regions.to_region_trie()?);
        if regions.is_empty() {
            warn!("Region table is empty, every blob request will go upstream");
        } else {
            info!("Region table holds {} prefixes", regions.prefix_count());
        }
        let mirrors = MirrorResolver::new(&config.mirror);
        let blob_checker = config.blob_cache.to_checker()?;

        let router = Router::new(
            &config.upstream,
            regions,
            mirrors,
            blob_checker,
            config.server.client_address.clone(),
        );
        info!("Redirecting to upstream {}", config.upstream.url);

        let listener = InsecureListener::new(&config.server, ServerContext::new(router));
        let metrics_listener = config.metrics.as_ref().map(MetricsListener::new);

        Ok(Self {
            listener,
            metrics_listener,
        })
    }

    pub async fn run(&self) -> Result<(), command::Error> {
        match &self.metrics_listener {
            Some(metrics_listener) => {
                tokio::try_join!(self.listener.serve(), metrics_listener.serve())?;
            }
            None => self.listener.serve().await?,
        }

        Ok(())
    }
}
