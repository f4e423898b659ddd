/**
 * TOMATO GATEWAY - Entry point
 *
 * ROLE: loads configuration, opens the MQTT link, starts the coordination
 * engine and serves the control surface until Ctrl-C, then runs the
 * emergency shutdown (all actuators off, `offline` announced).
 */

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tomato_gateway::config::load_config;
use tomato_gateway::mqtt::{create_mqtt_client, spawn_mqtt_listener, MqttPublisher};
use tomato_gateway::{http, Gateway, PlaceholderDetector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tomato_gateway=info")))
        .init();

    let cfg = load_config().await;
    let (client, eventloop) = create_mqtt_client(&cfg);
    let publisher = Arc::new(MqttPublisher::new(client.clone(), Duration::from_millis(cfg.mqtt.publish_timeout_ms)));
    let bind = cfg.http.bind.clone();

    let (gateway, _policy_worker) = Gateway::start(cfg, publisher, Arc::new(PlaceholderDetector));
    spawn_mqtt_listener(gateway.clone(), client.clone(), eventloop);

    let app = http::build_router(gateway.clone());
    let listener = TcpListener::bind(&bind).await.with_context(|| format!("cannot bind {bind}"))?;
    info!("control surface listening on http://{bind}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {e}");
            }
        })
        .await
        .context("http server failed")?;

    gateway.shutdown().await;
    if let Err(e) = client.disconnect().await {
        warn!("MQTT disconnect failed: {e}");
    }
    // let the event loop flush the queued commands
    tokio::time::sleep(Duration::from_millis(500)).await;
    info!("bye");
    Ok(())
}
