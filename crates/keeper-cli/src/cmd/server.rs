use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use keeper_server::{
    build_box_router, build_telemetry_router, serve, HealthChecks, QueueClient, QueueHandle,
};

use super::ServiceArgs;
use crate::signal;

#[derive(Args, Debug)]
pub struct ServerArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    /// URL of the secret-keeper queue service
    #[arg(long, env = "QUEUE_ENDPOINT")]
    pub queue_endpoint: String,
}

/// Run a box server instance backed by a remote queue.
pub fn run(args: ServerArgs, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let client = QueueClient::with_timeout(args.queue_endpoint.clone(), config.http.dequeue_timeout())
        .context("build queue client")?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        let cancel = signal::shutdown_token();
        let store = super::open_store(args.service.database_url.as_deref(), &config.store).await?;
        let (listener, telemetry_listener) = args.service.bind().await?;
        tracing::info!(endpoint = %client.endpoint(), "using remote queue");

        let grace = config.http.shutdown_grace();
        tokio::try_join!(
            serve(
                "server",
                listener,
                build_box_router(store, QueueHandle::Remote(client), &config.http),
                cancel.clone(),
                grace,
            ),
            serve(
                "telemetry",
                telemetry_listener,
                build_telemetry_router(HealthChecks::default()),
                cancel.clone(),
                grace,
            ),
        )?;
        Ok(())
    })
}
