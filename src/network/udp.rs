//! UDP transport for Art-Net
//!
//! Socket setup goes through `socket2` so address reuse, broadcast and the
//! receive buffer size are set before binding.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, UdpSocket};

use crate::error::NetworkError;

/// Bound Art-Net listening socket
pub struct ArtNetSocket {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl ArtNetSocket {
    /// Create and bind the socket.
    ///
    /// Binds `bind_ip:port`, or `0.0.0.0:port` with broadcast reception when
    /// no address is given. Port 0 picks an ephemeral port. Failures are
    /// reported as distinct errors and never retried here.
    pub fn open(
        port: u16,
        bind_ip: Option<Ipv4Addr>,
        recv_buffer_size: usize,
    ) -> Result<Self, NetworkError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(NetworkError::SocketCreate)?;

        socket
            .set_reuse_address(true)
            .map_err(|source| NetworkError::SocketOption {
                option: "SO_REUSEADDR",
                source,
            })?;

        if bind_ip.is_none() {
            socket
                .set_broadcast(true)
                .map_err(|source| NetworkError::SocketOption {
                    option: "SO_BROADCAST",
                    source,
                })?;
        }

        if recv_buffer_size > 0 {
            if let Err(e) = socket.set_recv_buffer_size(recv_buffer_size) {
                tracing::warn!("Failed to set receive buffer to {} bytes: {}", recv_buffer_size, e);
            }
        }

        let ip = bind_ip.unwrap_or(Ipv4Addr::UNSPECIFIED);
        let addr = SocketAddrV4::new(ip, port);
        socket
            .bind(&SockAddr::from(addr))
            .map_err(|e| bind_error(e, ip, port))?;

        let socket: UdpSocket = socket.into();
        let local_addr = socket.local_addr().map_err(NetworkError::BindFailed)?;

        tracing::info!("Listening for Art-Net packets on {}", local_addr);

        Ok(Self { socket, local_addr })
    }

    /// Block until a datagram arrives or the socket is closed
    pub fn receive(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that can unblock a thread parked in [`receive`](Self::receive)
    pub fn closer(&self) -> Result<TransportCloser, NetworkError> {
        let socket = self.socket.try_clone().map_err(NetworkError::SocketCreate)?;
        Ok(TransportCloser {
            socket,
            wake_addr: wake_address(self.local_addr),
        })
    }
}

fn bind_error(e: io::Error, ip: Ipv4Addr, port: u16) -> NetworkError {
    match e.kind() {
        io::ErrorKind::AddrInUse => NetworkError::AddressInUse(port),
        io::ErrorKind::PermissionDenied => NetworkError::PermissionDenied(port),
        io::ErrorKind::AddrNotAvailable => NetworkError::InvalidAddress(ip.to_string()),
        _ => NetworkError::BindFailed(e),
    }
}

/// Address a wake-up datagram must be sent to so it reaches `local`
fn wake_address(local: SocketAddr) -> SocketAddr {
    match local {
        SocketAddr::V4(v4) if v4.ip().is_unspecified() => {
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, v4.port()))
        }
        other => other,
    }
}

/// Closes the transport from the controlling thread
pub struct TransportCloser {
    socket: UdpSocket,
    wake_addr: SocketAddr,
}

impl TransportCloser {
    /// Unblock the receiving thread.
    ///
    /// Sends an empty datagram to the socket itself, then shuts it down. The
    /// receiving loop must have its running flag cleared first so the wake-up
    /// is read as a stop request.
    pub fn close(&self) {
        if let Err(e) = self.socket.send_to(&[], self.wake_addr) {
            tracing::debug!("Wake-up datagram to {} failed: {}", self.wake_addr, e);
        }
        if let Err(e) = socket2::SockRef::from(&self.socket).shutdown(Shutdown::Both) {
            tracing::trace!("Socket shutdown returned {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn open_ephemeral() -> ArtNetSocket {
        ArtNetSocket::open(0, Some(Ipv4Addr::LOCALHOST), 0).unwrap()
    }

    #[test]
    fn test_open_and_receive() {
        let socket = open_ephemeral();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"hello", socket.local_addr()).unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = socket.receive(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"hello");
        assert_eq!(from, sender.local_addr().unwrap());
    }

    #[test]
    fn test_open_all_interfaces() {
        let socket = ArtNetSocket::open(0, None, 64 * 1024).unwrap();
        assert!(socket.local_addr().ip().is_unspecified());
        assert_ne!(socket.local_addr().port(), 0);
    }

    #[test]
    fn test_unavailable_address_rejected() {
        // TEST-NET-3, never assigned to a local interface
        let result = ArtNetSocket::open(0, Some(Ipv4Addr::new(203, 0, 113, 7)), 0);
        assert!(matches!(result, Err(NetworkError::InvalidAddress(_))));
    }

    #[test]
    fn test_closer_unblocks_receive() {
        let socket = open_ephemeral();
        let closer = socket.closer().unwrap();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 64];
            socket.receive(&mut buf).map(|(len, _)| len)
        });

        thread::sleep(Duration::from_millis(20));
        closer.close();

        // Either the empty wake-up datagram or the shutdown ends the wait
        let result = handle.join().unwrap();
        assert!(matches!(result, Ok(0) | Err(_)));
    }

    #[test]
    fn test_wake_address_for_wildcard() {
        let local: SocketAddr = "0.0.0.0:6454".parse().unwrap();
        assert_eq!(wake_address(local), "127.0.0.1:6454".parse().unwrap());

        let local: SocketAddr = "10.1.2.3:6454".parse().unwrap();
        assert_eq!(wake_address(local), local);
    }
}
