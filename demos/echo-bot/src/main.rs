//! Echoes every message it may respond to back into the same room.
//!
//! Configure it through the environment (see `chatwire::DriverConfig`):
//!
//! ```text
//! CHATWIRE_URL=localhost:3000 CHATWIRE_USER=bot CHATWIRE_PASSWORD=pass \
//! CHATWIRE_ROOM=general RUST_LOG=info cargo run -p echo-bot
//! ```

use chatwire::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = DriverConfig::from_env();
    tracing::info!(host = %config.host, rooms = ?config.rooms, "starting echo bot");

    let driver = Driver::new(DdpTransport::new(), config);
    let user_id = driver.login(None).await?;
    tracing::info!(%user_id, "logged in");

    let replies = driver.clone();
    let responder = driver
        .respond_to_messages(
            move |event| {
                let driver = replies.clone();
                async move {
                    match event {
                        Ok(incoming) => {
                            let IncomingMessage { message, meta } = incoming;
                            let room = meta.room_name.as_deref().unwrap_or(message.room_id.as_str());
                            tracing::info!(room, from = %message.sender.username, text = %message.text, "echoing");
                            let reply = format!("{}: {}", message.sender.username, message.text);
                            if let Err(e) = driver.send_to_room_id(&reply, &message.room_id).await {
                                tracing::warn!(error = %e, "reply failed");
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "skipping bad event"),
                    }
                }
            },
            RespondOptions::new(),
        )
        .await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    responder.stop();
    driver.disconnect().await?;
    Ok(())
}
