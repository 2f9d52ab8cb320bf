/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Connection driver.
//!
//! Binds a byte stream to a session. The stream is split: a writer task
//! drains the session's outbound channel while the driver reads, feeding
//! every chunk to the session under its lock. The driver ends when the peer
//! closes, the writer fails, or the session disconnects on its own (logout,
//! heartbeat timeout, protocol violation).

use crate::registry::{Engine, SessionHandle};
use crate::scheduler::HeartbeatScheduler;
use bytes::{Bytes, BytesMut};
use fixline_core::error::SessionError;
use fixline_core::types::SessionId;
use fixline_session::SessionRole;
use fixline_transport::FixCodec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Decoder as _;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 4096;

/// Why a connection ended.
enum Closed {
    /// The session disconnected itself and dropped its outbound channel.
    SessionEnded,
    /// Another connection took the session over.
    Superseded,
    /// The session reported a fatal error.
    Failed(SessionError),
    /// Reading or writing the stream failed, or the peer closed it.
    Transport(String),
}

async fn write_frames<W>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<Bytes>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        writer.write_all(&frame).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

impl Engine {
    /// Serves an accepted stream.
    ///
    /// Waits for the first complete message, routes it by its CompIDs to a
    /// registered session and runs that session over the stream.
    ///
    /// # Returns
    /// The session identity once the connection has ended cleanly.
    ///
    /// # Errors
    /// `UnknownSession` for an unregistered counterparty, `AlreadyConnected`
    /// for a refused duplicate, `Transport` if the stream fails or stays
    /// silent, or the fatal error that ended the session.
    pub async fn accept<S>(&self, stream: S) -> Result<SessionId, SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);
        let mut buffer = BytesMut::with_capacity(READ_CHUNK);
        let mut framer = FixCodec::new();

        let first = tokio::time::timeout(self.logon_wait(), async {
            loop {
                let mut probe = buffer.clone();
                match framer.decode(&mut probe) {
                    Ok(Some(frame)) => return Ok(frame),
                    Ok(None) => {}
                    Err(err) => {
                        return Err(SessionError::ProtocolViolation {
                            reason: err.to_string(),
                        });
                    }
                }
                match reader.read_buf(&mut buffer).await {
                    Ok(0) => {
                        return Err(SessionError::Transport(
                            "connection closed before the first message".to_string(),
                        ));
                    }
                    Ok(_) => {}
                    Err(err) => return Err(SessionError::Transport(err.to_string())),
                }
            }
        })
        .await
        .map_err(|_| SessionError::Transport("no message before the logon deadline".to_string()))??;

        let handle = match self.identify(&first) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(error = %err, "inbound connection refused");
                return Err(err);
            }
        };
        self.run(handle, reader, writer, buffer).await
    }

    /// Runs an initiator session over an established stream.
    ///
    /// # Errors
    /// `UnknownSession` if the identity is not registered, `Configuration`
    /// for an acceptor session, otherwise as [`accept`](Self::accept).
    pub async fn initiate<S>(&self, session_id: &SessionId, stream: S) -> Result<SessionId, SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let handle = self
            .session(session_id)
            .ok_or_else(|| SessionError::UnknownSession {
                session: session_id.to_string(),
            })?;
        if handle.lock().await.config().role != SessionRole::Initiator {
            return Err(SessionError::Configuration(format!(
                "session {session_id} is not an initiator"
            )));
        }
        let (reader, writer) = tokio::io::split(stream);
        self.run(handle, reader, writer, BytesMut::new()).await
    }

    async fn run<R, W>(
        &self,
        handle: SessionHandle,
        mut reader: R,
        writer: W,
        mut buffer: BytesMut,
    ) -> Result<SessionId, SessionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (outbound, frames) = mpsc::unbounded_channel();
        let (session_id, connection_id) = {
            let mut session = handle.lock().await;
            self.attach(&mut session, outbound).await?;
            (session.session_id().clone(), session.connection_id())
        };
        info!(session = %session_id, connection = connection_id, "connection started");

        let mut writer_task: JoinHandle<std::io::Result<()>> = tokio::spawn(write_frames(writer, frames));
        let mut writer_result = None;
        let scheduler = HeartbeatScheduler::spawn(handle.clone(), connection_id, self.timer_tick());

        let closed = loop {
            if !buffer.is_empty() {
                let chunk = buffer.split();
                let mut session = handle.lock().await;
                if session.connection_id() != connection_id {
                    break Closed::Superseded;
                }
                if !session.state().is_connected() {
                    break Closed::SessionEnded;
                }
                if let Err(err) = session.on_bytes_received(&chunk).await {
                    break Closed::Failed(err);
                }
                if !session.state().is_connected() {
                    break Closed::SessionEnded;
                }
            }
            tokio::select! {
                read = reader.read_buf(&mut buffer) => match read {
                    Ok(0) => break Closed::Transport("connection closed by peer".to_string()),
                    Ok(_) => {}
                    Err(err) => break Closed::Transport(err.to_string()),
                },
                written = &mut writer_task => {
                    let closed = match &written {
                        Ok(Ok(())) => Closed::SessionEnded,
                        Ok(Err(err)) => Closed::Transport(err.to_string()),
                        Err(err) => Closed::Transport(err.to_string()),
                    };
                    writer_result = Some(written);
                    break closed;
                }
            }
        };

        scheduler.stop().await;

        let result = match closed {
            Closed::Transport(reason) => {
                let mut session = handle.lock().await;
                if session.connection_id() == connection_id {
                    session.on_transport_failure(&reason).await;
                }
                Err(SessionError::Transport(reason))
            }
            Closed::Failed(err) => Err(err),
            Closed::SessionEnded | Closed::Superseded => Ok(session_id.clone()),
        };

        if writer_result.is_none() {
            match writer_task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(session = %session_id, error = %err, "writer closed with error"),
                Err(err) => warn!(session = %session_id, error = %err, "writer task failed"),
            }
        }
        info!(session = %session_id, connection = connection_id, ok = result.is_ok(), "connection ended");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_core::message::{Message, MsgType};
    use fixline_core::tags;
    use fixline_core::types::{CompId, SeqNum, Timestamp};
    use fixline_dictionary::{Dictionary, Version};
    use fixline_session::{NoOpApplication, SessionConfig, SessionState, messages};
    use fixline_store::MemoryStore;
    use fixline_tagvalue::{decode, encode};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    struct Peer {
        stream: DuplexStream,
        buffer: BytesMut,
        codec: FixCodec,
        dict: Dictionary,
        seq: u64,
    }

    impl Peer {
        fn new(stream: DuplexStream) -> Self {
            Self {
                stream,
                buffer: BytesMut::new(),
                codec: FixCodec::new(),
                dict: Dictionary::session(Version::Fix44),
                seq: 1,
            }
        }

        async fn send(&mut self, mut msg: Message) {
            let header = msg.header_mut();
            header.set_field(tags::BEGIN_STRING, "FIX.4.4");
            header.set_field(tags::SENDER_COMP_ID, "CLIENT");
            header.set_field(tags::TARGET_COMP_ID, "SERVER");
            header.set_as(tags::MSG_SEQ_NUM, &SeqNum::new(self.seq));
            header.set_as(tags::SENDING_TIME, &Timestamp::now());
            self.seq += 1;
            let frame = encode(&msg, Some(&self.dict)).unwrap();
            self.stream.write_all(&frame).await.unwrap();
        }

        async fn recv(&mut self) -> Option<Message> {
            loop {
                if let Some(frame) = self.codec.decode(&mut self.buffer).unwrap() {
                    return Some(decode(&frame, &self.dict).unwrap());
                }
                let read = tokio::time::timeout(Duration::from_secs(5), self.stream.read_buf(&mut self.buffer))
                    .await
                    .unwrap()
                    .unwrap();
                if read == 0 {
                    return None;
                }
            }
        }
    }

    async fn acceptor_engine() -> Arc<Engine> {
        let engine = Engine::new(Arc::new(Dictionary::session(Version::Fix44)))
            .with_timer_tick(Duration::from_millis(20));
        let config = SessionConfig::new(
            CompId::new("SERVER").unwrap(),
            CompId::new("CLIENT").unwrap(),
            "FIX.4.4",
        );
        engine
            .add_session(config, Arc::new(MemoryStore::new()), Arc::new(NoOpApplication))
            .await
            .unwrap();
        Arc::new(engine)
    }

    fn server_id() -> SessionId {
        SessionId::new("FIX.4.4", "SERVER", "CLIENT")
    }

    #[tokio::test]
    async fn test_logon_exchange_and_logout() {
        let engine = acceptor_engine().await;
        let (client, server) = tokio::io::duplex(64 * 1024);
        let serving = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.accept(server).await })
        };

        let mut peer = Peer::new(client);
        peer.send(messages::logon(30, false, None)).await;
        let reply = peer.recv().await.unwrap();
        assert_eq!(reply.msg_type().unwrap(), MsgType::Logon);
        assert_eq!(reply.header().get_str(tags::SENDER_COMP_ID).unwrap(), "SERVER");

        peer.send(messages::test_request("PING")).await;
        let heartbeat = peer.recv().await.unwrap();
        assert_eq!(heartbeat.msg_type().unwrap(), MsgType::Heartbeat);
        assert_eq!(heartbeat.body().get_str(tags::TEST_REQ_ID).unwrap(), "PING");

        peer.send(messages::logout(None)).await;
        let logout = peer.recv().await.unwrap();
        assert_eq!(logout.msg_type().unwrap(), MsgType::Logout);
        assert!(peer.recv().await.is_none());

        let ended = serving.await.unwrap().unwrap();
        assert_eq!(ended, server_id());
        let session = engine.session(&server_id()).unwrap();
        assert_eq!(session.lock().await.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_peer_close_is_transport_failure() {
        let engine = acceptor_engine().await;
        let (client, server) = tokio::io::duplex(64 * 1024);
        let serving = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.accept(server).await })
        };

        let mut peer = Peer::new(client);
        peer.send(messages::logon(30, false, None)).await;
        peer.recv().await.unwrap();
        drop(peer);

        let err = serving.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        let session = engine.session(&server_id()).unwrap();
        let session = session.lock().await;
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.sequence().next_incoming().value(), 2);
        assert_eq!(session.sequence().peek_outgoing().value(), 2);
    }

    #[tokio::test]
    async fn test_unknown_counterparty_is_refused() {
        let engine = acceptor_engine().await;
        let (client, server) = tokio::io::duplex(64 * 1024);
        let serving = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.accept(server).await })
        };

        let mut stream = client;
        let dict = Dictionary::session(Version::Fix44);
        let mut logon = messages::logon(30, false, None);
        let header = logon.header_mut();
        header.set_field(tags::BEGIN_STRING, "FIX.4.4");
        header.set_field(tags::SENDER_COMP_ID, "STRANGER");
        header.set_field(tags::TARGET_COMP_ID, "SERVER");
        header.set_as(tags::MSG_SEQ_NUM, &SeqNum::new(1));
        header.set_as(tags::SENDING_TIME, &Timestamp::now());
        stream.write_all(&encode(&logon, Some(&dict)).unwrap()).await.unwrap();

        let err = serving.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::UnknownSession { .. }));
    }

    #[tokio::test]
    async fn test_initiator_sends_logon_first() {
        let engine = Engine::new(Arc::new(Dictionary::session(Version::Fix44)));
        let config = SessionConfig::new(
            CompId::new("CLIENT").unwrap(),
            CompId::new("SERVER").unwrap(),
            "FIX.4.4",
        )
        .with_role(SessionRole::Initiator);
        let id = config.session_id();
        engine
            .add_session(config, Arc::new(MemoryStore::new()), Arc::new(NoOpApplication))
            .await
            .unwrap();
        let engine = Arc::new(engine);

        let (local, remote) = tokio::io::duplex(64 * 1024);
        let running = {
            let engine = Arc::clone(&engine);
            let id = id.clone();
            tokio::spawn(async move { engine.initiate(&id, local).await })
        };

        let mut peer = Peer::new(remote);
        let logon = peer.recv().await.unwrap();
        assert_eq!(logon.msg_type().unwrap(), MsgType::Logon);
        assert_eq!(logon.header().get_str(tags::SENDER_COMP_ID).unwrap(), "CLIENT");
        drop(peer);

        assert!(matches!(
            running.await.unwrap(),
            Err(SessionError::Transport(_))
        ));
    }
}
