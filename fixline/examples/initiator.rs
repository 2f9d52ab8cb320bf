//! FIX 4.4 initiator.
//!
//! Connects to the acceptor example, sends a few NewOrderSingles and logs out.
//!
//! Environment: `FIX_HOST`, `FIX_PORT`, `RUST_LOG`.

use anyhow::Context;
use fixline::prelude::*;
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::info;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

fn new_order(n: u32) -> Message {
    let mut order = Message::new("D");
    order.set_field(11, format!("ORD{n}"));
    order.set_field(55, "MSFT");
    order.set_field(54, "1");
    order.set_field(38, "100");
    order.set_field(40, "1");
    order.set_as(60, &Timestamp::now());
    order
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let host = env::var("FIX_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("FIX_PORT").unwrap_or_else(|_| "9876".to_string());

    let config = SessionConfig::new(
        CompId::new("CLIENT").context("sender CompID")?,
        CompId::new("SERVER").context("target CompID")?,
        "FIX.4.4",
    )
    .with_role(SessionRole::Initiator)
    .with_heartbeat_interval(Duration::from_secs(10));
    let session_id = config.session_id();
    let engine = EngineBuilder::new().add_session(config).build().await?;
    let session = engine.session(&session_id).context("session registered")?;

    let stream = TcpStream::connect(format!("{host}:{port}")).await?;
    let running = {
        let engine = Arc::clone(&engine);
        let session_id = session_id.clone();
        tokio::spawn(async move { engine.initiate(&session_id, stream).await })
    };

    while !session.lock().await.state().is_logged_on() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    for n in 1..=3 {
        let seq = session.lock().await.send_application_message(new_order(n)).await?;
        info!(seq = seq.value(), "order sent");
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    session
        .lock()
        .await
        .initiate_logout(Some("done".to_string()), Instant::now())
        .await?;
    let ended = running.await??;
    info!(session = %ended, "finished");
    Ok(())
}
