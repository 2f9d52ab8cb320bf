//! FIX 4.4 acceptor.
//!
//! Accepts one counterparty (`CLIENT`), counts NewOrderSingles and answers
//! any other application message with a BusinessMessageReject. Sessions are
//! persisted under `./fixline-store`, so sequence numbers survive restarts.
//!
//! Environment: `FIX_HOST`, `FIX_PORT`, `RUST_LOG`.

use anyhow::Context;
use async_trait::async_trait;
use fixline::prelude::*;
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct OrderDesk {
    orders: AtomicU64,
}

#[async_trait]
impl Application for OrderDesk {
    async fn on_create(&self, session_id: &SessionId) {
        info!(session = %session_id, "created");
    }

    async fn on_logon(&self, session_id: &SessionId) {
        info!(session = %session_id, "logon");
    }

    async fn on_logout(&self, session_id: &SessionId) {
        info!(session = %session_id, "logout");
    }

    async fn to_admin(&self, _message: &mut Message, _session_id: &SessionId) {}

    async fn from_admin(&self, _message: &Message, _session_id: &SessionId) -> std::result::Result<(), RejectReason> {
        Ok(())
    }

    async fn to_app(&self, _message: &mut Message, _session_id: &SessionId) {}

    async fn from_app(&self, message: &Message, session_id: &SessionId) -> std::result::Result<(), RejectReason> {
        match message.msg_type() {
            Ok(MsgType::Application(t)) if t == "D" => {
                let n = self.orders.fetch_add(1, Ordering::Relaxed) + 1;
                let cl_ord_id = message.body().get_str(11).unwrap_or("?");
                info!(session = %session_id, cl_ord_id, order = n, "new order");
                Ok(())
            }
            Ok(other) => Err(RejectReason::new(3, format!("unsupported MsgType {other}"))),
            Err(err) => Err(RejectReason::new(0, err.to_string())),
        }
    }

    async fn on_event(&self, session_id: &SessionId, event: &SessionEvent) {
        if let SessionEvent::Error(err) = event {
            warn!(session = %session_id, error = %err, "session error");
        }
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let host = env::var("FIX_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("FIX_PORT").unwrap_or_else(|_| "9876".to_string());
    let addr = format!("{host}:{port}");

    let config = SessionConfig::new(
        CompId::new("SERVER").context("sender CompID")?,
        CompId::new("CLIENT").context("target CompID")?,
        "FIX.4.4",
    );
    let engine = EngineBuilder::new()
        .with_application(OrderDesk::default())
        .add_session(config)
        .with_file_store("fixline-store")
        .build()
        .await
        .context("building engine")?;

    let listener = TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    info!(%addr, "acceptor listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                info!(%peer, "connection");
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    match engine.accept(socket).await {
                        Ok(session) => info!(%session, "connection closed"),
                        Err(err) => warn!(%peer, error = %err, "connection ended"),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                engine.shutdown().await;
                return Ok(());
            }
        }
    }
}
