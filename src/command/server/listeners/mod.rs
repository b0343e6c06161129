use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::command::server::error::Error;

pub mod insecure;
pub mod metrics;

async fn build_listener(binding_address: SocketAddr) -> Result<TcpListener, Error> {
    TcpListener::bind(binding_address).await.map_err(|err| {
        Error::Initialization(format!("Failed to bind to {binding_address}: {err}"))
    })
}

async fn accept(listener: &TcpListener) -> Result<(TcpStream, SocketAddr), Error> {
    let (stream, remote_address) = listener.accept().await.map_err(|err| {
        Error::Execution(format!("Failed to accept incoming connection: {err}"))
    })?;

    debug!("Accepted connection from {remote_address}");
    Ok((stream, remote_address))
}
