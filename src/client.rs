use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use live_voice_types::audio::Blob;
use live_voice_types::{ClientMessage, InboundEvent, ServerMessage, Session};
#[cfg(test)]
use mockall::automock;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use crate::error::SessionError;
use crate::session::{EventSink, SessionEvent};

mod config;
pub(crate) mod consts;
mod utils;

pub use config::{Config, ConfigBuilder};

/// Opens the remote duplex audio session.
///
/// The connector takes ownership of the outbound capture queue and drains it
/// on its own task. Inbound traffic is reported through `events`: one
/// `Opened` once the remote side accepts the setup, then `Inbound` events,
/// and finally `Inbound(Error)` or `Inbound(Closed)`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        setup: Session,
        outbound: mpsc::Receiver<Blob>,
        events: EventSink,
    ) -> Result<Box<dyn LiveConnection>, SessionError>;
}

/// Handle to an open duplex session.
#[cfg_attr(test, automock)]
pub trait LiveConnection: Send {
    /// Requests a close without waiting for it. Closing twice is not an error.
    fn close(&mut self) -> Result<(), SessionError>;
}

/// Connects to the Gemini Live `BidiGenerateContent` WebSocket.
pub struct GeminiConnector {
    config: Config,
}

impl GeminiConnector {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

pub struct GeminiConnection {
    shutdown: Option<oneshot::Sender<()>>,
    send_handle: tokio::task::JoinHandle<()>,
    recv_handle: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl Connector for GeminiConnector {
    async fn connect(
        &self,
        setup: Session,
        mut outbound: mpsc::Receiver<Blob>,
        events: EventSink,
    ) -> Result<Box<dyn LiveConnection>, SessionError> {
        let request = utils::build_request(&self.config).map_err(SessionError::transport)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(SessionError::transport)?;
        tracing::info!("Connected to live endpoint, model={}", setup.model());

        let (mut write, mut read) = ws_stream.split();

        let setup = serde_json::to_string(&ClientMessage::Setup(setup))
            .map_err(SessionError::transport)?;
        write
            .send(Message::Text(setup))
            .await
            .map_err(SessionError::transport)?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let send_handle = tokio::spawn(async move {
            let mut sent: u64 = 0;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    media = outbound.recv() => {
                        let Some(media) = media else { break };
                        match serde_json::to_string(&ClientMessage::from(media)) {
                            Ok(text) => {
                                if let Err(e) = write.send(Message::Text(text)).await {
                                    tracing::error!("failed to send realtime input: {}", e);
                                    break;
                                }
                                sent += 1;
                            }
                            Err(e) => tracing::error!("failed to serialize realtime input: {}", e),
                        }
                    }
                }
            }
            tracing::debug!("send task finished after {} chunks", sent);
            if let Err(e) = write.send(Message::Close(None)).await {
                tracing::debug!("close frame not sent: {}", e);
            }
        });

        let recv_handle = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        events.send(SessionEvent::Inbound(InboundEvent::Error(e.to_string())));
                        return;
                    }
                };
                match read_frame(message) {
                    Frame::Server(server) => {
                        if let Some(go_away) = &server.go_away {
                            tracing::warn!("server going away, time left: {:?}", go_away.time_left);
                        }
                        if server.is_setup_complete() {
                            events.send(SessionEvent::Opened);
                        }
                        for event in server.into_events() {
                            let terminal = event.is_terminal();
                            if !events.send(SessionEvent::Inbound(event)) || terminal {
                                return;
                            }
                        }
                    }
                    Frame::Closed(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        events.send(SessionEvent::Inbound(InboundEvent::Closed(reason)));
                        return;
                    }
                    Frame::Invalid(e) => {
                        tracing::error!("failed to deserialize server message: {}", e)
                    }
                    Frame::Skip => {}
                }
            }
            events.send(SessionEvent::Inbound(InboundEvent::Closed(None)));
        });

        Ok(Box::new(GeminiConnection {
            shutdown: Some(shutdown_tx),
            send_handle,
            recv_handle,
        }))
    }
}

impl LiveConnection for GeminiConnection {
    fn close(&mut self) -> Result<(), SessionError> {
        let Some(shutdown) = self.shutdown.take() else {
            return Ok(());
        };
        // The send task may already be gone; the close is best-effort.
        let _ = shutdown.send(());
        self.recv_handle.abort();
        if self.send_handle.is_finished() {
            tracing::debug!("send task had already stopped");
        }
        tracing::debug!("connection close requested");
        Ok(())
    }
}

impl Drop for GeminiConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[derive(Debug)]
enum Frame {
    Server(ServerMessage),
    Closed(Option<String>),
    Invalid(String),
    Skip,
}

/// The endpoint sends JSON in both text and binary frames.
fn read_frame(message: Message) -> Frame {
    let parsed = match message {
        Message::Text(text) => serde_json::from_str::<ServerMessage>(&text),
        Message::Binary(bin) => serde_json::from_slice::<ServerMessage>(&bin),
        Message::Close(frame) => {
            return Frame::Closed(
                frame
                    .map(|f| f.reason.to_string())
                    .filter(|reason| !reason.is_empty()),
            );
        }
        _ => return Frame::Skip,
    };
    match parsed {
        Ok(server) => Frame::Server(server),
        Err(e) => Frame::Invalid(e.to_string()),
    }
}
