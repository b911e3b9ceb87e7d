//! DMX Rasterizer
//!
//! Listens for Art-Net, keeps the channel buffer current and drives the
//! render consumer. Optional OSC forwarding and diagnostics API.
//!
//! Usage: `dmx-rasterizer [config.toml]`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "osc")]
use dmx_rasterizer::network::OscSender;
use dmx_rasterizer::{
    config::AppConfig,
    network::{ArtNetReceiver, ReceiverEvent},
    render::{FrameSink, LogSink, RenderConsumer},
    Engine,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting DMX Rasterizer");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let mut config = AppConfig::load(config_path.as_deref()).context("Failed to load config")?;
    config.validate().context("Invalid configuration")?;

    let engine = Arc::new(Engine::from_config(&config)?);
    let layout = engine.layout();
    tracing::info!(
        "Channel buffer: {} universes x {} bytes = {} channels",
        layout.universes,
        layout.stride,
        layout.capacity()
    );

    // Socket setup failures end the process here
    let mut receiver = ArtNetReceiver::new(engine.clone());
    receiver
        .start(&config.network)
        .context("Failed to start Art-Net receiver")?;

    let mut sinks: Vec<Box<dyn FrameSink>> = vec![Box::new(LogSink::default())];
    #[cfg(feature = "osc")]
    {
        if config.osc.enabled {
            sinks.push(Box::new(OscSender::new(&config.osc)?));
        }
    }
    let mut consumer = RenderConsumer::start(engine.clone(), &config.render, sinks)?;

    #[cfg(feature = "ui")]
    let mut web_server = if config.ui.enabled {
        let mut server = dmx_rasterizer::ui::WebServer::new(config.ui.clone(), engine.clone());
        match server.start_background().await {
            Ok(_) => Some(server),
            Err(e) => {
                tracing::warn!("Diagnostics API disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let events = receiver.events();
    let mut stopped = tokio::task::spawn_blocking(move || events.recv());
    let mut stats_interval = tokio::time::interval(Duration::from_secs(5));
    stats_interval.tick().await;

    tracing::info!("Running - press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
            event = &mut stopped => {
                if let Ok(Ok(ReceiverEvent::Stopped(reason))) = event {
                    tracing::error!("Art-Net receiver stopped unexpectedly: {:?}", reason);
                }
                break;
            }
            _ = stats_interval.tick() => {
                let stats = engine.stats().snapshot();
                tracing::info!(
                    "Stats: {} packets, {} applied, {} rejected, {} ignored, {} frames rendered",
                    stats.packets_received,
                    stats.packets_applied,
                    stats.packets_rejected,
                    stats.packets_ignored,
                    consumer.frames_presented()
                );
                for (universe, delta) in engine.timing().snapshot_deltas_ms() {
                    tracing::debug!("Universe {}: {:.1} ms", universe, delta);
                }
            }
        }
    }

    receiver.stop();
    consumer.stop();
    #[cfg(feature = "ui")]
    {
        if let Some(server) = web_server.as_mut() {
            server.stop();
        }
    }

    tracing::info!("Stopped");
    Ok(())
}
