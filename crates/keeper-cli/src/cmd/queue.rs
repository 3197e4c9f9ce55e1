use std::path::Path;

use anyhow::Result;
use clap::Args;
use keeper_core::Queue;
use keeper_server::{build_queue_router, build_telemetry_router, serve, HealthChecks};

use super::ServiceArgs;
use crate::signal;

#[derive(Args, Debug)]
pub struct QueueArgs {
    #[command(flatten)]
    pub service: ServiceArgs,
}

/// Run a queue instance: the reconciliation loop plus its HTTP services.
pub fn run(args: QueueArgs, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        let cancel = signal::shutdown_token();
        let store = super::open_store(args.service.database_url.as_deref(), &config.store).await?;
        let (listener, telemetry_listener) = args.service.bind().await?;

        let (queue, reconciler) = Queue::new(store, &config.queue);
        let checks = HealthChecks::default().with_queue(queue.clone());
        let grace = config.http.shutdown_grace();

        tokio::try_join!(
            async {
                reconciler.run(cancel.clone()).await;
                Ok::<_, anyhow::Error>(())
            },
            serve(
                "queue",
                listener,
                build_queue_router(queue, &config.http),
                cancel.clone(),
                grace,
            ),
            serve(
                "telemetry",
                telemetry_listener,
                build_telemetry_router(checks),
                cancel.clone(),
                grace,
            ),
        )?;
        Ok(())
    })
}
