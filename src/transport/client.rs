use futures::stream::StreamExt;
use futures::SinkExt;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::event::{AudioSender, Connector, EventSender, Session, TransportEvent};
use super::messages::{ClientMessage, ServerMessage};
use crate::error::TransportError;
use crate::session::SessionConfig;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// WebSocket connector for the live agent endpoint
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveClient;

impl LiveClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for LiveClient {
    async fn open(
        &self,
        config: &SessionConfig,
        events: EventSender,
    ) -> Result<Box<dyn Session>, TransportError> {
        info!("Connecting to agent at {}", config.endpoint);

        let url = match &config.api_key {
            Some(key) => format!("{}?key={}", config.endpoint, key),
            None => config.endpoint.clone(),
        };

        let (ws_stream, _) = tokio::time::timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| {
            TransportError::ConnectFailed(format!(
                "timed out after {}ms",
                config.connect_timeout.as_millis()
            ))
        })?
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        let setup = serde_json::to_string(&ClientMessage::setup(config))
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        write
            .send(Message::Text(setup))
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        debug!("Sent session setup for model {}", config.model);

        let (audio, mut audio_rx) = AudioSender::channel();
        let (close_tx, mut close_rx) = oneshot::channel::<()>();

        // Writer: drains captured frames until asked to close
        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = audio_rx.recv() => {
                        let Some(frame) = frame else { break };
                        let payload = match serde_json::to_string(&ClientMessage::audio(&frame.pcm, frame.sample_rate)) {
                            Ok(payload) => payload,
                            Err(e) => {
                                error!("Failed to serialize audio frame: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(payload)).await {
                            warn!("Failed to send audio frame {}: {}", frame.sequence, e);
                            break;
                        }
                    }
                    _ = &mut close_rx => {
                        if let Err(e) = write.send(Message::Close(None)).await {
                            debug!("Close frame not sent: {}", e);
                        }
                        break;
                    }
                }
            }

            if let Err(e) = write.close().await {
                debug!("WebSocket sink close failed: {}", e);
            }
        });

        // Reader: turns server messages into tagged events
        let reader_audio = audio.clone();
        let reader = tokio::spawn(async move {
            let mut failed = false;

            while let Some(msg) = read.next().await {
                let payload = match msg {
                    Ok(Message::Text(text)) => text.into_bytes(),
                    Ok(Message::Binary(bytes)) => bytes,
                    Ok(Message::Close(frame)) => {
                        info!("Agent closed the session: {:?}", frame);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Agent connection error: {}", e);
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        failed = true;
                        break;
                    }
                };

                let message: ServerMessage = match serde_json::from_slice(&payload) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Invalid message from agent: {}", e);
                        continue;
                    }
                };

                for event in message.into_events() {
                    if event == TransportEvent::Opened {
                        info!("Agent session opened");
                        reader_audio.set_open(true);
                    }
                    if events.send(event).is_err() {
                        debug!("Event receiver gone, stopping reader");
                        reader_audio.set_open(false);
                        return;
                    }
                }
            }

            reader_audio.set_open(false);
            if !failed {
                let _ = events.send(TransportEvent::Closed);
            }
        });

        Ok(Box::new(LiveSession {
            id: Uuid::new_v4(),
            audio,
            close_tx: Some(close_tx),
            writer: Some(writer),
            reader: Some(reader),
        }))
    }
}

/// An open WebSocket session
pub struct LiveSession {
    id: Uuid,
    audio: AudioSender,
    close_tx: Option<oneshot::Sender<()>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl Session for LiveSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn audio_sender(&self) -> AudioSender {
        self.audio.clone()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.audio.set_open(false);

        if self.close_tx.is_none() && self.writer.is_none() {
            return Err(TransportError::Closed);
        }

        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }

        let result = match self.writer.take() {
            Some(mut writer) => match tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(TransportError::Send(e.to_string())),
                Err(_) => {
                    writer.abort();
                    Err(TransportError::Send("close timed out".to_string()))
                }
            },
            None => Ok(()),
        };

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        info!("Agent session {} closed", self.id);
        result
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
