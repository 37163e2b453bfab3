use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, fmt};

use tradefloor::core::Settings;
use tradefloor::platform;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(&path)?,
        None => Settings::default(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},tradefloor=debug", settings.app.log_level))
    });
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();

    tracing::info!(
        "tradefloor platform starting ({} instruments seeded)",
        settings.market.instruments.len()
    );

    let handle = platform::spawn(settings);
    let mut events = handle.subscribe();

    // Log every broadcast until ctrl-c. The transport layer (not part of
    // this crate) subscribes through the same handle.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(notification) => {
                    tracing::info!("event: {}", serde_json::to_string(&notification)?);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event log fell behind broadcast");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    handle.shutdown().ok();
    tracing::info!("tradefloor platform stopped");
    Ok(())
}
