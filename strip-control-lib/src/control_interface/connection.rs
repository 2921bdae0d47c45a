use std::fmt;
use std::io;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::control_interface::frame_reader::FrameReader;
use crate::control_interface::registry::ResponseRegistry;
use crate::error::{Error, Result};
use crate::packet::response::{Response, ResponseKind};

/// Capacity of the channel that mirrors every inbound response to subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// State shared between the connection owner and its dispatcher task.
struct Link {
    host: String,
    port: u16,
    io_timeout: Duration,
    registry: Arc<ResponseRegistry>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    state: StdMutex<ConnectionState>,
    events: broadcast::Sender<Response>,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Link {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn open(&self) -> Result<TcpStream> {
        let stream = timeout(
            self.io_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| {
            Error::Connection(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("Connecting to {} timed out after {:?}", self, self.io_timeout),
            ))
        })??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn handle_frame(&self, kind: ResponseKind, frame: &[u8]) {
        match Response::decode_as(kind, frame) {
            Ok(response) => {
                debug!("{} Received: {:?}", self, response);
                // Nobody listening is fine.
                let _ = self.events.send(response.clone());
                self.registry.deliver(response);
            }
            Err(e) => warn!(
                "{} Discarding {:?} frame {}: {}",
                self,
                kind,
                hex::encode(frame),
                e
            ),
        }
    }

    /// Replaces the socket after the peer dropped it. Returns the new read half,
    /// or `None` if the connection is shutting down or the device is unreachable.
    async fn reopen(&self, shutdown: &watch::Receiver<bool>) -> Option<OwnedReadHalf> {
        if *shutdown.borrow() {
            return None;
        }
        info!("{} Reconnecting...", self);
        // Writes into the dead socket would be lost silently.
        self.writer.lock().await.take();
        self.set_state(ConnectionState::Connecting);
        match self.open().await {
            Ok(stream) => {
                if *shutdown.borrow() {
                    return None;
                }
                let (read_half, write_half) = stream.into_split();
                *self.writer.lock().await = Some(write_half);
                self.set_state(ConnectionState::Connected);
                info!("{} Reconnected", self);
                Some(read_half)
            }
            Err(e) => {
                error!("{} Reconnect failed: {}", self, e);
                None
            }
        }
    }
}

struct Dispatcher {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Reads frames off the socket and feeds the registry until shut down.
///
/// This task is the only reader of the socket. A dropped or desynchronized stream is
/// replaced once; if the replacement drops again before delivering a single frame the
/// task gives up and the connection becomes `Disconnected`.
async fn dispatch(link: Arc<Link>, read_half: OwnedReadHalf, mut shutdown: watch::Receiver<bool>) {
    let mut reader = FrameReader::new(read_half, link.io_timeout);
    let mut fresh_socket = false;
    loop {
        let result = tokio::select! {
            _ = shutdown.changed() => break,
            result = reader.read_frame() => result,
        };
        match result {
            Ok((kind, frame)) => {
                fresh_socket = false;
                link.handle_frame(kind, &frame);
            }
            Err(e) if e.is_desync() && !fresh_socket => {
                warn!("{} {}", link, e);
                match link.reopen(&shutdown).await {
                    Some(read_half) => {
                        reader = FrameReader::new(read_half, link.io_timeout);
                        fresh_socket = true;
                    }
                    None => break,
                }
            }
            Err(e) => {
                error!("{} Stopping response dispatcher: {}", link, e);
                break;
            }
        }
    }
    link.writer.lock().await.take();
    link.set_state(ConnectionState::Disconnected);
    debug!("{} Response dispatcher stopped", link);
}

/// A persistent TCP connection to one controller.
///
/// Callers write requests through [`Connection::send`] while a background dispatcher
/// reads responses and hands them to the shared [`ResponseRegistry`].
pub struct Connection {
    link: Arc<Link>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl Connection {
    pub fn new(
        host: &str,
        port: u16,
        io_timeout: Duration,
        registry: Arc<ResponseRegistry>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Connection {
            link: Arc::new(Link {
                host: host.to_string(),
                port,
                io_timeout,
                registry,
                writer: Mutex::new(None),
                state: StdMutex::new(ConnectionState::Disconnected),
                events,
            }),
            dispatcher: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// Every response read from the socket, whether or not a caller awaited it.
    pub fn subscribe(&self) -> broadcast::Receiver<Response> {
        self.link.events.subscribe()
    }

    /// Opens the socket and starts the dispatcher.
    ///
    /// An open connection is reused unless `reconnect` is set, in which case it is torn
    /// down and replaced.
    pub async fn connect(&self, reconnect: bool) -> Result<()> {
        let mut dispatcher = self.dispatcher.lock().await;
        let alive = dispatcher.as_ref().is_some_and(|d| !d.task.is_finished())
            && self.link.writer.lock().await.is_some();
        if alive && !reconnect {
            return Ok(());
        }

        self.stop(dispatcher.take()).await;

        debug!("{} Connecting ...", self.link);
        self.link.set_state(ConnectionState::Connecting);
        let stream = match self.link.open().await {
            Ok(stream) => stream,
            Err(e) => {
                self.link.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        let (read_half, write_half) = stream.into_split();
        *self.link.writer.lock().await = Some(write_half);
        self.link.set_state(ConnectionState::Connected);
        info!("{} Connected", self.link);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(dispatch(self.link.clone(), read_half, shutdown_rx));
        *dispatcher = Some(Dispatcher { shutdown, task });
        Ok(())
    }

    /// Writes one frame. Fails with [`Error::NotConnected`] if there is no socket.
    pub async fn send(&self, frame: &[u8]) -> Result<()> {
        let mut writer = self.link.writer.lock().await;
        let stream = writer.as_mut().ok_or(Error::NotConnected)?;
        debug!("{} Sending: {}", self.link, hex::encode(frame));
        let result = match timeout(self.link.io_timeout, stream.write_all(frame)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "Timed out writing to the socket",
            )),
        };
        if let Err(e) = result {
            // The socket is unusable; the next connect must replace it.
            writer.take();
            return Err(e.into());
        }
        Ok(())
    }

    /// Half-closes the write side while keeping it installed, so the next write fails.
    #[cfg(test)]
    pub(crate) async fn break_writer(&self) {
        if let Some(stream) = self.link.writer.lock().await.as_mut() {
            let _ = stream.shutdown().await;
        }
    }

    /// Closes the socket and waits for the dispatcher to terminate.
    pub async fn disconnect(&self) {
        let mut dispatcher = self.dispatcher.lock().await;
        debug!("{} Disconnecting", self.link);
        self.stop(dispatcher.take()).await;
    }

    async fn stop(&self, dispatcher: Option<Dispatcher>) {
        if let Some(mut dispatcher) = dispatcher {
            // Fails only if the task already finished and dropped its receiver.
            let _ = dispatcher.shutdown.send(true);
            // The dispatcher may be inside a reconnect, which is bounded by the I/O timeout.
            let grace = self.link.io_timeout * 2;
            if timeout(grace, &mut dispatcher.task).await.is_err() {
                warn!(
                    "{} Response dispatcher did not stop within {:?}, aborting it",
                    self.link, grace
                );
                dispatcher.task.abort();
            }
        }
        if let Some(mut stream) = self.link.writer.lock().await.take() {
            if let Err(e) = stream.shutdown().await {
                warn!("{} {}", self.link, e);
            }
        }
        self.link.set_state(ConnectionState::Disconnected);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;
    use crate::packet::response::tests::{sample_status, sample_time};
    use crate::util::traits::WireFrame;

    pub(crate) const IO_TIMEOUT: Duration = Duration::from_millis(300);

    pub(crate) async fn fake_device() -> (TcpListener, u16) {
        let _ = env_logger::builder().is_test(true).try_init();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn connection(port: u16) -> (Connection, Arc<ResponseRegistry>) {
        let registry = Arc::new(ResponseRegistry::default());
        (
            Connection::new("127.0.0.1", port, IO_TIMEOUT, registry.clone()),
            registry,
        )
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_kind() {
        let (listener, port) = fake_device().await;
        let (connection, registry) = connection(port);

        // Register in the opposite order of arrival.
        let time = registry.expect(ResponseKind::GetTime);
        let status = registry.expect(ResponseKind::Status);
        connection.connect(false).await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Connected);

        let (mut device, _) = listener.accept().await.unwrap();
        let mut stream = sample_status().to_frame();
        stream.extend(sample_time().to_frame());
        device.write_all(&stream).await.unwrap();

        let time = time.wait(Duration::from_secs(1)).await.unwrap();
        let status = status.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(time, Response::GetTime(sample_time()));
        assert_eq!(status, Response::Status(sample_status()));

        connection.disconnect().await;
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_corrupt_frame_is_discarded() {
        let (listener, port) = fake_device().await;
        let (connection, registry) = connection(port);
        let status = registry.expect(ResponseKind::Status);
        connection.connect(false).await.unwrap();

        let (mut device, _) = listener.accept().await.unwrap();
        let mut corrupt = sample_status().to_frame();
        *corrupt.last_mut().unwrap() ^= 0xFF;
        device.write_all(&corrupt).await.unwrap();

        let result = status.wait(Duration::from_millis(150)).await;
        assert!(matches!(result, Err(Error::ResponseTimeout { .. })));
        // The stream stays in step: the next good frame is delivered.
        let status = registry.expect(ResponseKind::Status);
        device.write_all(&sample_status().to_frame()).await.unwrap();
        assert!(status.wait(Duration::from_secs(1)).await.is_ok());
        connection.disconnect().await;
    }

    #[tokio::test]
    async fn test_send_reaches_device() {
        let (listener, port) = fake_device().await;
        let (connection, _) = connection(port);
        connection.connect(false).await.unwrap();
        let (mut device, _) = listener.accept().await.unwrap();

        connection.send(&[0x81, 0x8A, 0x8B, 0x96]).await.unwrap();
        let mut buf = [0u8; 4];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x81, 0x8A, 0x8B, 0x96]);
        connection.disconnect().await;
    }

    #[tokio::test]
    async fn test_send_without_socket() {
        let (connection, _) = connection(9);
        assert!(matches!(
            connection.send(&[0x00]).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_reuses_open_socket() {
        let (listener, port) = fake_device().await;
        let (connection, _) = connection(port);
        connection.connect(false).await.unwrap();
        let (_device, _) = listener.accept().await.unwrap();

        connection.connect(false).await.unwrap();
        let second = timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(second.is_err(), "an open socket must be reused");

        connection.connect(true).await.unwrap();
        let third = timeout(Duration::from_secs(1), listener.accept()).await;
        assert!(third.is_ok(), "reconnect must open a new socket");
        connection.disconnect().await;
    }

    #[tokio::test]
    async fn test_dispatcher_reconnects_after_peer_close() {
        let (listener, port) = fake_device().await;
        let (connection, registry) = connection(port);
        connection.connect(false).await.unwrap();

        let (device, _) = listener.accept().await.unwrap();
        drop(device);

        let (mut device, _) = timeout(Duration::from_secs(2), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let time = registry.expect(ResponseKind::GetTime);
        device.write_all(&sample_time().to_frame()).await.unwrap();
        let response = time.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(response, Response::GetTime(sample_time()));
        connection.disconnect().await;
    }

    #[tokio::test]
    async fn test_unknown_prefix_replaces_socket() {
        let (listener, port) = fake_device().await;
        let (connection, registry) = connection(port);
        connection.connect(false).await.unwrap();

        let (mut first, _) = listener.accept().await.unwrap();
        first.write_all(&[0x42, 0x42, 0x00]).await.unwrap();

        let (mut device, _) = timeout(Duration::from_secs(2), listener.accept())
            .await
            .expect("an unknown prefix must trigger a reconnect")
            .unwrap();
        let status = registry.expect(ResponseKind::Status);
        device.write_all(&sample_status().to_frame()).await.unwrap();
        let response = status.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(response, Response::Status(sample_status()));
        assert_eq!(connection.state(), ConnectionState::Connected);
        connection.disconnect().await;
        drop(first);
    }

    #[tokio::test]
    async fn test_disconnect_stops_idle_dispatcher_promptly() {
        let (listener, port) = fake_device().await;
        let (connection, _) = connection(port);
        connection.connect(false).await.unwrap();
        let (_device, _) = listener.accept().await.unwrap();

        let started = std::time::Instant::now();
        connection.disconnect().await;
        assert!(started.elapsed() < IO_TIMEOUT);
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_subscribers_see_every_response() {
        let (listener, port) = fake_device().await;
        let (connection, _) = connection(port);
        let mut events = connection.subscribe();
        connection.connect(false).await.unwrap();

        let (mut device, _) = listener.accept().await.unwrap();
        device.write_all(&sample_status().to_frame()).await.unwrap();
        let event = timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, Response::Status(sample_status()));
        connection.disconnect().await;
    }
}
