use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use keeper_core::Queue;
use keeper_server::{build_box_router, build_telemetry_router, serve, HealthChecks, QueueHandle};

use super::ServiceArgs;
use crate::signal;

#[derive(Args, Debug)]
pub struct StandaloneArgs {
    #[command(flatten)]
    pub service: ServiceArgs,
}

/// Run the box service with an in-process queue.
pub fn run(args: StandaloneArgs, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        let cancel = signal::shutdown_token();
        let store = super::open_store(args.service.database_url.as_deref(), &config.store).await?;
        let (listener, telemetry_listener) = args.service.bind().await?;

        let (queue, reconciler) = Queue::new(Arc::clone(&store), &config.queue);
        let checks = HealthChecks::default().with_queue(queue.clone());
        let handle = QueueHandle::Local(queue);
        let grace = config.http.shutdown_grace();

        tokio::try_join!(
            async {
                reconciler.run(cancel.clone()).await;
                Ok::<_, anyhow::Error>(())
            },
            serve(
                "server",
                listener,
                build_box_router(store, handle, &config.http),
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
