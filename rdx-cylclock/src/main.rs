use anyhow::Result;
use cylclock::events::next_event;
use cylclock::prelude::*;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // An optional config path as the only argument.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ClockConfig::load(config_path.as_deref())?;
    info!(
        "{} v{}: {} markers, {} in {}.",
        cylclock::ENGINE_NAME,
        cylclock::VERSION,
        config.num_major_markers,
        config.language,
        config.timezone
    );

    let clock = match CylinderClock::new(config, HeadlessRenderer::new(), Viewport::new(960, 240)) {
        Ok(clock) => clock,
        Err(err) => {
            error!("Could not start the clock: {}", err);
            return Err(err.into());
        }
    };
    let handle = clock.handle();
    spawn_event_listeners(&handle);

    let shutdown = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received.");
        }
        shutdown.destroy().await;
    });

    clock.run().await?;
    Ok(())
}

fn spawn_event_listeners(handle: &ClockHandle) {
    let mut system_rx = handle.subscribe_system_events();
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut system_rx).await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut label_rx = handle.subscribe_label_events();
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut label_rx).await {
            match event {
                LabelEvent::Reassigned { retired, display_text, .. } => {
                    info!("[LABEL] {} retired => '{}'", retired, display_text)
                }
                LabelEvent::GeometryFailed { minute_index, message, .. } => {
                    error!("[LABEL] {} kept its old text: {}", minute_index, message)
                }
                other => info!("[LABEL] => {:?}", other),
            }
        }
    });
}
