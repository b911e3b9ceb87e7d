//! Art-Net ingestion loop
//!
//! Runs on a dedicated OS thread:
//!
//! ```text
//! Starting ──► Listening ⇄ Processing ──► Stopping ──► Stopped
//! ```
//!
//! The thread only ever blocks inside `recv_from`. A stop request clears the
//! running flag and closes the transport from the controlling thread.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::{NetworkConfig, ReceiveErrorPolicy};
use crate::constants::MAX_PACKET_SIZE;
use crate::engine::{IngestState, PacketOutcome, SharedEngine};
use crate::error::{Error, NetworkError};
use crate::network::udp::{ArtNetSocket, TransportCloser};

/// Pause after a resumed receive error so a persistent failure cannot spin
const RESUME_BACKOFF: Duration = Duration::from_millis(10);

/// Why the ingestion loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called
    Requested,
    /// A receive error ended the loop under [`ReceiveErrorPolicy::Terminate`]
    ReceiveError(String),
}

/// Blocking datagram source read by the ingestion loop
pub trait DatagramSource: Send + 'static {
    /// Block until a datagram arrives
    fn receive(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    fn local_addr(&self) -> SocketAddr;
}

impl DatagramSource for ArtNetSocket {
    fn receive(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        ArtNetSocket::receive(self, buf)
    }

    fn local_addr(&self) -> SocketAddr {
        ArtNetSocket::local_addr(self)
    }
}

/// Notifications from the ingestion thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverEvent {
    Stopped(StopReason),
}

/// Art-Net receiver driving the shared [`Engine`](crate::engine::Engine)
pub struct ArtNetReceiver {
    engine: SharedEngine,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    closer: Option<TransportCloser>,
    local_addr: Option<SocketAddr>,
    event_tx: Sender<ReceiverEvent>,
    event_rx: Receiver<ReceiverEvent>,
}

impl ArtNetReceiver {
    pub fn new(engine: SharedEngine) -> Self {
        let (event_tx, event_rx) = bounded(16);
        Self {
            engine,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            closer: None,
            local_addr: None,
            event_tx,
            event_rx,
        }
    }

    /// Open the transport and start the ingestion thread.
    ///
    /// Failing to open the socket is fatal and returned to the caller.
    pub fn start(&mut self, config: &NetworkConfig) -> Result<SocketAddr, Error> {
        if self.is_running() {
            return Err(NetworkError::AlreadyRunning.into());
        }

        self.engine.set_ingest_state(IngestState::Starting);
        let bind_ip = config
            .bind_ip()
            .inspect_err(|_| self.engine.set_ingest_state(IngestState::Stopped))?;
        let socket = ArtNetSocket::open(config.port(), bind_ip, config.receive_buffer_size)
            .inspect_err(|_| self.engine.set_ingest_state(IngestState::Stopped))?;

        self.start_with_socket(socket, config.on_receive_error)
    }

    /// Start the ingestion thread on an already bound socket
    pub fn start_with_socket(
        &mut self,
        socket: ArtNetSocket,
        policy: ReceiveErrorPolicy,
    ) -> Result<SocketAddr, Error> {
        if self.is_running() {
            return Err(NetworkError::AlreadyRunning.into());
        }

        let local_addr = socket.local_addr();
        let closer = socket.closer()?;

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let engine = self.engine.clone();
        let events = self.event_tx.clone();

        let handle = thread::Builder::new()
            .name("artnet-ingest".into())
            .spawn(move || ingest_loop(socket, engine, running, policy, events))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                NetworkError::ThreadSpawn(e)
            })?;

        self.thread_handle = Some(handle);
        self.closer = Some(closer);
        self.local_addr = Some(local_addr);

        Ok(local_addr)
    }

    /// Stop the ingestion thread and wait for it to exit
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(closer) = self.closer.take() {
            closer.close();
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Whether the ingestion thread is still listening
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> IngestState {
        self.engine.ingest_state()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Channel of lifecycle events from the ingestion thread
    pub fn events(&self) -> Receiver<ReceiverEvent> {
        self.event_rx.clone()
    }

    /// Next pending event, if any
    pub fn try_event(&self) -> Option<ReceiverEvent> {
        self.event_rx.try_recv().ok()
    }
}

impl Drop for ArtNetReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn ingest_loop<S: DatagramSource>(
    socket: S,
    engine: SharedEngine,
    running: Arc<AtomicBool>,
    policy: ReceiveErrorPolicy,
    events: Sender<ReceiverEvent>,
) {
    let mut buf = [0u8; MAX_PACKET_SIZE];
    engine.set_ingest_state(IngestState::Listening);
    tracing::debug!("Ingestion loop started on {}", socket.local_addr());

    let reason = loop {
        if !running.load(Ordering::Acquire) {
            break StopReason::Requested;
        }

        let (len, sender) = match socket.receive(&mut buf) {
            Ok(received) => received,
            Err(_) if !running.load(Ordering::Acquire) => break StopReason::Requested,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                engine.stats().record_receive_error();
                match policy {
                    ReceiveErrorPolicy::Terminate => {
                        tracing::error!("Failed to receive UDP packet: {}", e);
                        break StopReason::ReceiveError(e.to_string());
                    }
                    ReceiveErrorPolicy::Resume => {
                        tracing::warn!("Failed to receive UDP packet, resuming: {}", e);
                        thread::sleep(RESUME_BACKOFF);
                        continue;
                    }
                }
            }
        };

        // The wake-up datagram from a stop request lands here
        if !running.load(Ordering::Acquire) {
            break StopReason::Requested;
        }

        engine.set_ingest_state(IngestState::Processing);
        match engine.process_datagram(&buf[..len]) {
            PacketOutcome::Applied {
                universe,
                written,
                truncated,
                first_packet,
            } => {
                if first_packet {
                    tracing::info!("Receiving universe {} from {}", universe, sender);
                }
                if truncated {
                    tracing::debug!("Universe {} truncated to {} bytes", universe, written);
                }
                tracing::trace!("Universe {} from {}: {} bytes", universe, sender, written);
            }
            PacketOutcome::Rejected(rejected) => {
                tracing::trace!("Ignoring {} byte datagram from {}: {:?}", len, sender, rejected);
            }
            PacketOutcome::Ignored(universe) => {
                tracing::trace!("Ignoring universe {} from {}", universe, sender);
            }
            PacketOutcome::Dropped(universe) => {
                tracing::debug!("Universe {} payload does not fit the buffer", universe);
            }
        }
        engine.set_ingest_state(IngestState::Listening);
    };

    engine.set_ingest_state(IngestState::Stopping);
    running.store(false, Ordering::SeqCst);
    tracing::info!("Ingestion loop stopped: {:?}", reason);
    let _ = events.try_send(ReceiverEvent::Stopped(reason));
    engine.set_ingest_state(IngestState::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OverrunPolicy, UniverseLayout};
    use crate::engine::Engine;
    use crate::error::ConfigError;
    use crate::protocol::build_artdmx;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::net::{Ipv4Addr, UdpSocket};
    use std::time::Instant;

    enum Step {
        Fail(io::ErrorKind),
        Packet(Vec<u8>),
    }

    /// Replays scripted receive results, then idles
    struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
            }
        }
    }

    impl DatagramSource for ScriptedSource {
        fn receive(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            match self.steps.lock().pop_front() {
                Some(Step::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
                Some(Step::Packet(packet)) => {
                    buf[..packet.len()].copy_from_slice(&packet);
                    Ok((packet.len(), self.local_addr()))
                }
                None => {
                    thread::sleep(Duration::from_millis(1));
                    Err(io::ErrorKind::Interrupted.into())
                }
            }
        }

        fn local_addr(&self) -> SocketAddr {
            SocketAddr::from((Ipv4Addr::LOCALHOST, 6454))
        }
    }

    fn shared_engine() -> SharedEngine {
        Arc::new(Engine::new(UniverseLayout::standard(), OverrunPolicy::Truncate))
    }

    fn start_receiver() -> (ArtNetReceiver, SharedEngine, SocketAddr) {
        let engine = Arc::new(Engine::new(UniverseLayout::standard(), OverrunPolicy::Truncate));
        let mut receiver = ArtNetReceiver::new(engine.clone());
        let socket = ArtNetSocket::open(0, Some(Ipv4Addr::LOCALHOST), 0).unwrap();
        let addr = receiver
            .start_with_socket(socket, ReceiveErrorPolicy::Terminate)
            .unwrap();
        (receiver, engine, addr)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_receives_and_applies() {
        let (mut receiver, engine, addr) = start_receiver();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        sender.send_to(&build_artdmx(2, 0, &[42; 512]), addr).unwrap();
        assert!(wait_for(|| engine.buffer().get(1040) == Some(42)));
        assert!(engine.timing().is_active(2));

        receiver.stop();
        assert_eq!(receiver.state(), IngestState::Stopped);
    }

    #[test]
    fn test_stop_unblocks_idle_loop() {
        let (mut receiver, _engine, _addr) = start_receiver();
        assert!(wait_for(|| receiver.state() == IngestState::Listening));

        receiver.stop();
        assert!(!receiver.is_running());
        assert_eq!(receiver.try_event(), Some(ReceiverEvent::Stopped(StopReason::Requested)));
        assert_eq!(receiver.state(), IngestState::Stopped);
    }

    #[test]
    fn test_no_writes_after_stop() {
        let (mut receiver, engine, addr) = start_receiver();
        receiver.stop();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let _ = sender.send_to(&build_artdmx(0, 0, &[9; 512]), addr);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(engine.buffer().get(0), Some(0));
    }

    #[test]
    fn test_double_start_rejected() {
        let (mut receiver, _engine, _addr) = start_receiver();
        let socket = ArtNetSocket::open(0, Some(Ipv4Addr::LOCALHOST), 0).unwrap();
        assert!(matches!(
            receiver.start_with_socket(socket, ReceiveErrorPolicy::Resume),
            Err(Error::Network(NetworkError::AlreadyRunning))
        ));
        receiver.stop();
    }

    #[test]
    fn test_receive_error_terminates() {
        let engine = shared_engine();
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = bounded(1);
        let source = ScriptedSource::new(vec![
            Step::Fail(io::ErrorKind::ConnectionReset),
            Step::Packet(build_artdmx(0, 0, &[7; 512])),
        ]);

        ingest_loop(source, engine.clone(), running.clone(), ReceiveErrorPolicy::Terminate, tx);

        assert!(matches!(
            rx.try_recv(),
            Ok(ReceiverEvent::Stopped(StopReason::ReceiveError(_)))
        ));
        assert_eq!(engine.ingest_state(), IngestState::Stopped);
        assert_eq!(engine.stats().snapshot().receive_errors, 1);
        assert!(!running.load(Ordering::SeqCst));
        assert_eq!(engine.buffer().get(0), Some(0));
    }

    #[test]
    fn test_receive_error_resumes() {
        let engine = shared_engine();
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = bounded(1);
        let source = ScriptedSource::new(vec![
            Step::Fail(io::ErrorKind::ConnectionReset),
            Step::Fail(io::ErrorKind::Other),
            Step::Packet(build_artdmx(0, 0, &[7; 512])),
        ]);

        let handle = {
            let engine = engine.clone();
            let running = running.clone();
            thread::spawn(move || {
                ingest_loop(source, engine, running, ReceiveErrorPolicy::Resume, tx)
            })
        };

        assert!(wait_for(|| engine.buffer().get(0) == Some(7)));
        assert!(wait_for(|| engine.ingest_state() == IngestState::Listening));
        assert_eq!(engine.stats().snapshot().receive_errors, 2);
        assert!(rx.try_recv().is_err());

        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
        assert_eq!(rx.try_recv(), Ok(ReceiverEvent::Stopped(StopReason::Requested)));
        assert_eq!(engine.ingest_state(), IngestState::Stopped);
    }

    #[test]
    fn test_interrupted_always_resumes() {
        let engine = shared_engine();
        let running = Arc::new(AtomicBool::new(true));
        let (tx, _rx) = bounded(1);
        let source = ScriptedSource::new(vec![
            Step::Fail(io::ErrorKind::Interrupted),
            Step::Packet(build_artdmx(1, 0, &[3; 4])),
        ]);

        let handle = {
            let engine = engine.clone();
            let running = running.clone();
            thread::spawn(move || {
                ingest_loop(source, engine, running, ReceiveErrorPolicy::Terminate, tx)
            })
        };

        assert!(wait_for(|| engine.buffer().get(520) == Some(3)));
        assert_eq!(engine.stats().snapshot().receive_errors, 0);

        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
    }

    #[test]
    fn test_invalid_bind_address_leaves_stopped() {
        let engine = shared_engine();
        let mut receiver = ArtNetReceiver::new(engine.clone());
        let config = NetworkConfig {
            port: 0,
            bind_address: Some("10.0.0.300".into()),
            ..Default::default()
        };

        assert!(matches!(
            receiver.start(&config),
            Err(Error::Config(ConfigError::InvalidBindAddress(_)))
        ));
        assert_eq!(receiver.state(), IngestState::Stopped);
        assert!(!receiver.is_running());
    }
}
