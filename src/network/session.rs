//! Framed TCP sessions.
//!
//! Every payload travels as `[u16 BE length][payload]`. A session owns the
//! socket's write half behind a queue drained by a single writer task, so
//! outbound frames leave in FIFO order with no interleaving. The read half
//! stays with the caller's receive loop.

use crate::network::{Endpoint, NetworkError};
use crate::types::bytes::Bytes;
use crate::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Hard cap imposed by the 16-bit length prefix.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Outbound queue depth per session.
const SEND_QUEUE_DEPTH: usize = 256;

enum Outbound {
    Frame(Bytes),
    Shutdown,
}

/// One framed TCP connection.
///
/// `Active` until either endpoint closes or an I/O error occurs; after that
/// every send is dropped.
pub struct Session {
    remote: Endpoint,
    outbound: mpsc::Sender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl Session {
    /// Wraps a connected stream, spawning its writer task.
    ///
    /// Returns the session handle plus the read half for the caller's
    /// receive loop.
    pub fn start(stream: TcpStream) -> (Arc<Session>, OwnedReadHalf) {
        let remote = stream
            .peer_addr()
            .map(Endpoint::from)
            .unwrap_or_else(|_| Endpoint::new("unknown", 0));

        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        let closed = Arc::new(AtomicBool::new(false));

        let session = Arc::new(Session {
            remote,
            outbound: tx,
            closed: Arc::clone(&closed),
        });

        tokio::spawn(write_loop(writer, rx, closed));
        (session, reader)
    }

    /// Remote socket endpoint of this connection.
    pub fn remote(&self) -> &Endpoint {
        &self.remote
    }

    /// Queues a payload for sending.
    ///
    /// Returns `false` when the session is closed or the queue is full; a
    /// peer that cannot drain its queue is effectively dead.
    pub fn send(&self, payload: Bytes) -> bool {
        if self.is_closed() {
            return false;
        }
        if payload.len() > MAX_FRAME_LEN {
            warn!("dropping oversized frame of {} bytes", payload.len());
            return false;
        }
        self.outbound.try_send(Outbound::Frame(payload)).is_ok()
    }

    /// Initiates a cooperative shutdown after the queue drains.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.outbound.try_send(Outbound::Shutdown);
    }

    /// Marks the session closed without queueing anything, e.g. when the
    /// read side hit EOF.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Outbound>,
    closed: Arc<AtomicBool>,
) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Frame(payload) => {
                let len = (payload.len() as u16).to_be_bytes();
                if writer.write_all(&len).await.is_err()
                    || writer.write_all(&payload).await.is_err()
                    || writer.flush().await.is_err()
                {
                    break;
                }
            }
            Outbound::Shutdown => {
                let _ = writer.shutdown().await;
                break;
            }
        }
    }
    closed.store(true, Ordering::SeqCst);
}

/// Reads one `[u16 BE length][payload]` frame.
///
/// A zero-length frame is invalid and treated as a protocol violation.
pub async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Vec<u8>, NetworkError> {
    let mut len_buf = [0u8; 2];
    reader.read_exact(&mut len_buf).await?;

    let len = u16::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(NetworkError::BadFrame("zero-length payload".to_string()));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn session_pair() -> (Arc<Session>, OwnedReadHalf, Arc<Session>, OwnedReadHalf) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr);
        let server = listener.accept();
        let (client, server) = tokio::join!(client, server);

        let (client_session, client_reader) = Session::start(client.unwrap());
        let (server_session, server_reader) = Session::start(server.unwrap().0);
        (client_session, client_reader, server_session, server_reader)
    }

    #[tokio::test]
    async fn frames_roundtrip_in_order() {
        let (client, _cr, _server, mut server_reader) = session_pair().await;

        for i in 0..5u8 {
            assert!(client.send(Bytes::new(vec![i; 3])));
        }

        for i in 0..5u8 {
            let frame = read_frame(&mut server_reader).await.unwrap();
            assert_eq!(frame, vec![i; 3]);
        }
    }

    #[tokio::test]
    async fn large_frame_roundtrip() {
        let (client, _cr, _server, mut server_reader) = session_pair().await;

        let payload: Vec<u8> = (0..40_000u32).map(|i| i as u8).collect();
        assert!(client.send(Bytes::new(payload.clone())));

        let frame = read_frame(&mut server_reader).await.unwrap();
        assert_eq!(frame, payload);
    }

    #[tokio::test]
    async fn oversized_send_is_refused() {
        let (client, _cr, _server, _sr) = session_pair().await;
        assert!(!client.send(Bytes::new(vec![0u8; MAX_FRAME_LEN + 1])));
    }

    #[tokio::test]
    async fn close_ends_remote_read() {
        let (client, _cr, _server, mut server_reader) = session_pair().await;

        client.close();
        assert!(client.is_closed());
        assert!(!client.send(Bytes::new(b"late".as_slice())));

        // Remote read loop observes EOF
        let result = read_frame(&mut server_reader).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn zero_length_frame_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let connect = TcpStream::connect(addr);
        let accept = listener.accept();
        let (client, server) = tokio::join!(connect, accept);
        let mut client = client.unwrap();
        let (_session, mut server_reader) = Session::start(server.unwrap().0);

        client.write_all(&0u16.to_be_bytes()).await.unwrap();
        client.flush().await.unwrap();

        assert!(read_frame(&mut server_reader).await.is_err());
    }
}
