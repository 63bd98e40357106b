//! Live-reload notifications.
//!
//! The [`ReloadHub`] is a broadcast channel: every subscriber connected when a
//! message is published receives it. [`ReloadServer`] exposes the hub over
//! TCP as newline-delimited JSON so a browser-side helper (or a proxy) can
//! react to rebuilds:
//!
//! ```text
//! {"type":"connected"}
//! {"type":"asset","category":"css","paths":["css/main.css"]}
//! {"type":"full"}
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};

/// Messages buffered per subscriber before it starts lagging.
const DEFAULT_CAPACITY: usize = 64;

/// A reload notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadMessage {
    /// Handshake sent once to each new connection
    Connected,
    /// Reload the whole page
    Full,
    /// Swap assets of one category in place
    Asset {
        /// Category (`css`, `js`, `img`, `fonts`, ...)
        category: String,
        /// Paths relative to the build root, `/`-separated
        paths: Vec<String>,
    },
}

impl ReloadMessage {
    /// Encode as one line of NDJSON, including the trailing newline.
    pub fn to_line(&self) -> String {
        // Serializing a plain enum of strings cannot fail.
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }
}

/// Broadcast hub for reload notifications.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    /// Create a hub with the default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a hub buffering `capacity` messages per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a message, returning the number of subscribers it reached.
    pub fn publish(&self, message: ReloadMessage) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    /// Subscribe to messages published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn listeners(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Error starting the reload endpoint.
#[derive(Debug, Error)]
pub enum ReloadError {
    /// Address could not be bound
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// Runtime or thread setup failed
    #[error("cannot start reload server: {0}")]
    Start(#[from] std::io::Error),
}

/// TCP endpoint streaming hub messages to connected clients.
///
/// The server runs on its own thread with a single-threaded tokio runtime.
/// Dropping it shuts the endpoint down and disconnects all clients.
#[derive(Debug)]
pub struct ReloadServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ReloadServer {
    /// Bind `host:port` (port 0 picks a free port) and start serving.
    pub fn start(hub: &ReloadHub, host: &str, port: u16) -> Result<Self, ReloadError> {
        let listener =
            std::net::TcpListener::bind((host, port)).map_err(|source| ReloadError::Bind {
                addr: format!("{}:{}", host, port),
                source,
            })?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()?;
        let (shutdown, shutdown_rx) = oneshot::channel();
        let hub = hub.clone();

        let thread = std::thread::Builder::new()
            .name("assetflow-reload".to_string())
            .spawn(move || runtime.block_on(serve(listener, hub, shutdown_rx)))?;

        tracing::info!(%addr, "reload server listening");
        Ok(Self {
            addr,
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for the server thread.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("reload server thread panicked");
            }
            tracing::debug!(addr = %self.addr, "reload server stopped");
        }
    }
}

impl Drop for ReloadServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(
    listener: std::net::TcpListener,
    hub: ReloadHub,
    mut shutdown: oneshot::Receiver<()>,
) {
    let listener = match tokio::net::TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("reload server failed to start: {}", e);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    // Subscribe before the handshake so a client that has
                    // read `connected` sees every later message.
                    let messages = hub.subscribe();
                    tokio::spawn(handle_client(stream, peer, messages));
                }
                Err(e) => tracing::warn!("reload accept failed: {}", e),
            },
        }
    }
}

async fn handle_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    mut messages: broadcast::Receiver<ReloadMessage>,
) {
    tracing::debug!(%peer, "reload client connected");
    if stream.write_all(ReloadMessage::Connected.to_line().as_bytes()).await.is_err() {
        return;
    }

    loop {
        let message = match messages.recv().await {
            Ok(message) => message,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(%peer, missed, "reload client lagging; sending full reload");
                ReloadMessage::Full
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if stream.write_all(message.to_line().as_bytes()).await.is_err() {
            break;
        }
    }

    tracing::debug!(%peer, "reload client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpStream as StdTcpStream;
    use std::time::Duration;

    fn read_line(reader: &mut BufReader<StdTcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        line
    }

    #[test]
    fn test_message_wire_format() {
        assert_eq!(
            ReloadMessage::Connected.to_line(),
            "{\"type\":\"connected\"}\n"
        );
        assert_eq!(ReloadMessage::Full.to_line(), "{\"type\":\"full\"}\n");

        let asset = ReloadMessage::Asset {
            category: "css".to_string(),
            paths: vec!["css/main.css".to_string()],
        };
        assert_eq!(
            asset.to_line(),
            "{\"type\":\"asset\",\"category\":\"css\",\"paths\":[\"css/main.css\"]}\n"
        );

        let parsed: ReloadMessage = serde_json::from_str(asset.to_line().trim()).unwrap();
        assert_eq!(parsed, asset);
    }

    #[test]
    fn test_hub_without_listeners() {
        let hub = ReloadHub::new();
        assert_eq!(hub.listeners(), 0);
        assert_eq!(hub.publish(ReloadMessage::Full), 0);
    }

    #[test]
    fn test_hub_broadcasts_to_every_subscriber() {
        let hub = ReloadHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        assert_eq!(hub.publish(ReloadMessage::Full), 2);
        assert_eq!(a.try_recv().unwrap(), ReloadMessage::Full);
        assert_eq!(b.try_recv().unwrap(), ReloadMessage::Full);
    }

    #[test]
    fn test_hub_late_subscriber_misses_earlier_messages() {
        let hub = ReloadHub::new();
        let _early = hub.subscribe();
        hub.publish(ReloadMessage::Full);

        let mut late = hub.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn test_server_streams_messages() {
        let hub = ReloadHub::new();
        let server = ReloadServer::start(&hub, "127.0.0.1", 0).unwrap();

        let stream = StdTcpStream::connect(server.local_addr()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut reader = BufReader::new(stream);

        assert_eq!(read_line(&mut reader), "{\"type\":\"connected\"}\n");
        assert_eq!(hub.listeners(), 1);

        hub.publish(ReloadMessage::Asset {
            category: "js".to_string(),
            paths: vec!["js/app.js".to_string()],
        });
        assert_eq!(
            read_line(&mut reader),
            "{\"type\":\"asset\",\"category\":\"js\",\"paths\":[\"js/app.js\"]}\n"
        );

        hub.publish(ReloadMessage::Full);
        assert_eq!(read_line(&mut reader), "{\"type\":\"full\"}\n");
    }

    #[test]
    fn test_server_stop_disconnects_clients() {
        let hub = ReloadHub::new();
        let mut server = ReloadServer::start(&hub, "127.0.0.1", 0).unwrap();

        let stream = StdTcpStream::connect(server.local_addr()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut reader = BufReader::new(stream);
        read_line(&mut reader);

        server.stop();
        assert_eq!(read_line(&mut reader), "");
    }

    #[test]
    fn test_server_bind_error() {
        let hub = ReloadHub::new();
        let first = ReloadServer::start(&hub, "127.0.0.1", 0).unwrap();
        let err = ReloadServer::start(&hub, "127.0.0.1", first.local_addr().port()).unwrap_err();
        assert!(matches!(err, ReloadError::Bind { .. }));
    }
}
