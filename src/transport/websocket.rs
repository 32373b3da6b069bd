//! WebSocket link built on tokio-tungstenite.
//!
//! The socket runs on a spawned task. Outbound frames reach it through an
//! mpsc channel; everything it observes comes back as [`LinkEvent`]s on a
//! crossbeam channel that the transport drains from `poll`.

use super::streaming::{ConnectionLink, Connector, LinkEvent};
use crate::MapError;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Opens `ws://` / `wss://` connections. Must be used from inside a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn connect(&mut self, endpoint: &str) -> crate::Result<Box<dyn ConnectionLink>> {
        let (event_tx, event_rx) = unbounded();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let url = endpoint.to_string();
        if crate::runtime::spawn(run_socket(url, event_tx, outbound_rx)).is_none() {
            return Err(MapError::Connection(format!(
                "no async runtime available to connect to {}",
                endpoint
            ))
            .into());
        }

        Ok(Box::new(WebSocketLink {
            events: event_rx,
            outbound: Some(outbound_tx),
            closed_reported: false,
        }))
    }
}

async fn run_socket(
    url: String,
    events: Sender<LinkEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            log::warn!("websocket connect to {} failed: {}", url, e);
            let _ = events.send(LinkEvent::Closed(Some(e.to_string())));
            return;
        }
    };
    let _ = events.send(LinkEvent::Connected);
    let (mut sink, mut stream) = socket.split();

    let reason = loop {
        tokio::select! {
            outgoing = outbound.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break Some(e.to_string());
                    }
                }
                None => {
                    // Client closed the link; nobody is listening for events anymore.
                    let _ = sink.send(Message::Close(None)).await;
                    log::debug!("websocket to {} closed by client", url);
                    return;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(LinkEvent::Message(text));
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        let _ = events.send(LinkEvent::Message(text));
                    }
                    Err(_) => log::warn!("ignoring non-UTF-8 binary frame from {}", url),
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map(|frame| frame.reason.to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
                None => break None,
            },
        }
    };

    let _ = events.send(LinkEvent::Closed(reason));
}

struct WebSocketLink {
    events: Receiver<LinkEvent>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Set once a `Closed` event has been handed out.
    closed_reported: bool,
}

impl ConnectionLink for WebSocketLink {
    fn send(&mut self, text: String) -> crate::Result<()> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| MapError::Connection("link closed".into()))?;
        outbound
            .send(text)
            .map_err(|_| MapError::Connection("socket task has stopped".into()))?;
        Ok(())
    }

    fn try_recv(&mut self) -> Option<LinkEvent> {
        match self.events.try_recv() {
            Ok(event) => {
                if matches!(event, LinkEvent::Closed(_)) {
                    self.closed_reported = true;
                }
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            // The socket task ended without saying goodbye.
            Err(TryRecvError::Disconnected) if !self.closed_reported => {
                log::warn!("websocket task stopped without a close event");
                self.closed_reported = true;
                Some(LinkEvent::Closed(None))
            }
            Err(TryRecvError::Disconnected) => None,
        }
    }

    fn close(&mut self) {
        self.outbound = None;
    }
}
