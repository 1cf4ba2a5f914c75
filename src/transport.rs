// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Byte-stream endpoints used by the command session.
//!
//! A transport moves raw bytes and nothing else: framing, acknowledgment and
//! checksums are handled by [`crate::session::Session`].  Ordinary connection
//! failures do not surface as errors from [`Transport::open`]; they are
//! recorded in a sticky [`ErrorState`] which is only cleared by the next
//! `open` or an explicit [`Transport::reset_errors`].

use crate::{
    common::{bind_udp_socket, set_socket_bufsize},
    error::Error,
};
use log::{debug, warn};
use std::{
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
    time::timeout,
};

/// Default device address.
pub const DEFAULT_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 2);
/// Default device TCP command port.
pub const DEFAULT_TCP_PORT: u16 = 1024;
/// Default device UDP command port.
pub const DEFAULT_UDP_PORT: u16 = 4120;
/// Default local UDP port the device answers to.
pub const DEFAULT_UDP_HOST_PORT: u16 = 4100;
/// Largest response the device produces.
pub const MAX_BUF_SIZE: usize = 25 * 1024;

/// Opening the connection failed.
pub const ERR_IF_OPEN: u32 = 0x0001;
/// Writing to the connection failed.
pub const ERR_IF_WRITE: u32 = 0x0002;
/// Reading from the connection failed.
pub const ERR_IF_READ: u32 = 0x0004;
/// A read or write deadline elapsed.
pub const ERR_IF_TIMEOUT: u32 = 0x0008;

/// Sticky transport error code and the message of the latest failure.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorState {
    pub code: u32,
    pub message: String,
}

impl ErrorState {
    fn set(&mut self, code: u32, message: String) {
        warn!("{}", message);
        self.code |= code;
        self.message = message;
    }

    fn clear(&mut self) {
        self.code = 0;
        self.message.clear();
    }

    pub fn is_set(&self) -> bool {
        self.code != 0
    }
}

/// Ethernet endpoint configuration shared by both transports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnetConfig {
    /// Device address.
    pub ip: Ipv4Addr,
    /// Device port.
    pub port: u16,
    /// Local port, only used by the UDP transport.
    pub own_port: u16,
    /// Deadline applied to connect, read and write.
    pub timeout: Duration,
}

impl Default for EnetConfig {
    fn default() -> Self {
        EnetConfig {
            ip: DEFAULT_IP,
            port: DEFAULT_TCP_PORT,
            own_port: DEFAULT_UDP_HOST_PORT,
            timeout: Duration::from_secs(30),
        }
    }
}

impl EnetConfig {
    pub fn device_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

/// A point-to-point byte channel to the device.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Closes any previous connection, clears the error state and connects.
    /// Returns whether the transport is open afterwards.
    async fn open(&mut self) -> bool;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Writes the whole buffer and returns the number of bytes written.
    async fn write(&mut self, data: &[u8]) -> Result<usize, Error>;

    /// Performs a single read of at most `max_len` bytes.
    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>, Error>;

    fn error_state(&self) -> &ErrorState;

    fn reset_errors(&mut self);
}

fn not_open() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        "transport not open",
    ))
}

fn timed_out(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{} timed out", what))
}

/// TCP client connection to the device command port.
pub struct TcpTransport {
    config: EnetConfig,
    stream: Option<TcpStream>,
    errors: ErrorState,
}

impl TcpTransport {
    pub fn new(config: EnetConfig) -> TcpTransport {
        TcpTransport {
            config,
            stream: None,
            errors: ErrorState::default(),
        }
    }

    pub fn config(&self) -> &EnetConfig {
        &self.config
    }
}

impl Transport for TcpTransport {
    async fn open(&mut self) -> bool {
        self.close();
        self.reset_errors();

        let addr = self.config.device_addr();
        debug!("tcp connect {}", addr);

        match timeout(self.config.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                if let Err(err) = stream.set_nodelay(true) {
                    warn!("tcp nodelay failed: {}", err);
                }
                self.stream = Some(stream);
            }
            Ok(Err(err)) => self
                .errors
                .set(ERR_IF_OPEN, format!("TCP connect error: {}", err)),
            Err(_) => self.errors.set(
                ERR_IF_OPEN | ERR_IF_TIMEOUT,
                format!("TCP connect error: {}", timed_out("connect")),
            ),
        }

        self.is_open()
    }

    fn close(&mut self) {
        self.stream = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        let stream = self.stream.as_mut().ok_or_else(not_open)?;

        match timeout(self.config.timeout, stream.write_all(data)).await {
            Ok(Ok(())) => Ok(data.len()),
            Ok(Err(err)) => {
                self.errors
                    .set(ERR_IF_WRITE, format!("TCP write error: {}", err));
                Err(err.into())
            }
            Err(_) => {
                let err = timed_out("write");
                self.errors
                    .set(ERR_IF_WRITE | ERR_IF_TIMEOUT, format!("TCP write error: {}", err));
                Err(err.into())
            }
        }
    }

    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>, Error> {
        let stream = self.stream.as_mut().ok_or_else(not_open)?;
        let mut buf = vec![0; max_len];

        match timeout(self.config.timeout, stream.read(&mut buf)).await {
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(buf)
            }
            Ok(Err(err)) => {
                self.errors
                    .set(ERR_IF_READ, format!("TCP read error: {}", err));
                Err(err.into())
            }
            Err(_) => {
                let err = timed_out("read");
                self.errors
                    .set(ERR_IF_READ | ERR_IF_TIMEOUT, format!("TCP read error: {}", err));
                Err(err.into())
            }
        }
    }

    fn error_state(&self) -> &ErrorState {
        &self.errors
    }

    fn reset_errors(&mut self) {
        self.errors.clear();
    }
}

/// UDP socket bound to the local host port, exchanging datagrams with the
/// device.  A datagram may carry fewer bytes than requested, so callers
/// usually receive with short reads allowed.
pub struct UdpTransport {
    config: EnetConfig,
    socket: Option<UdpSocket>,
    peer: Option<SocketAddr>,
    errors: ErrorState,
}

impl UdpTransport {
    pub fn new(config: EnetConfig) -> UdpTransport {
        UdpTransport {
            config,
            socket: None,
            peer: None,
            errors: ErrorState::default(),
        }
    }

    pub fn config(&self) -> &EnetConfig {
        &self.config
    }

    /// Source address of the most recent datagram.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl Transport for UdpTransport {
    async fn open(&mut self) -> bool {
        self.close();
        self.reset_errors();

        let local = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.config.own_port));
        debug!("udp bind {}", local);

        match bind_udp_socket(local) {
            Ok(socket) => {
                set_socket_bufsize(&socket, 2 * MAX_BUF_SIZE);
                self.socket = Some(socket);
            }
            Err(err) => self.errors.set(
                ERR_IF_OPEN,
                format!("Error while opening UDP socket: {}", err),
            ),
        }

        self.is_open()
    }

    fn close(&mut self) {
        self.socket = None;
        self.peer = None;
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        let socket = self.socket.as_ref().ok_or_else(not_open)?;
        let addr = self.config.device_addr();

        match timeout(self.config.timeout, socket.send_to(data, addr)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(err)) => {
                self.errors
                    .set(ERR_IF_WRITE, format!("UDP write error: {}", err));
                Err(err.into())
            }
            Err(_) => {
                let err = timed_out("write");
                self.errors
                    .set(ERR_IF_WRITE | ERR_IF_TIMEOUT, format!("UDP write error: {}", err));
                Err(err.into())
            }
        }
    }

    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>, Error> {
        let socket = self.socket.as_ref().ok_or_else(not_open)?;
        let mut buf = vec![0; max_len];

        match timeout(self.config.timeout, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, addr))) => {
                self.peer = Some(addr);
                buf.truncate(n);
                Ok(buf)
            }
            Ok(Err(err)) => {
                self.errors
                    .set(ERR_IF_READ, format!("UDP read error: {}", err));
                Err(err.into())
            }
            Err(_) => {
                let err = timed_out("read");
                self.errors
                    .set(ERR_IF_READ | ERR_IF_TIMEOUT, format!("UDP read error: {}", err));
                Err(err.into())
            }
        }
    }

    fn error_state(&self) -> &ErrorState {
        &self.errors
    }

    fn reset_errors(&mut self) {
        self.errors.clear();
    }
}

/// Scripted in-memory transport for exercising the session and dispatcher.
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    pub struct MockTransport {
        pub open: bool,
        pub responses: VecDeque<Vec<u8>>,
        pub written: Vec<Vec<u8>>,
        pub errors: ErrorState,
    }

    impl MockTransport {
        pub fn new() -> MockTransport {
            MockTransport {
                open: true,
                ..Default::default()
            }
        }

        pub fn respond(&mut self, data: Vec<u8>) {
            self.responses.push_back(data);
        }
    }

    impl Transport for MockTransport {
        async fn open(&mut self) -> bool {
            self.errors.clear();
            self.open = true;
            true
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }

        async fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
            if !self.open {
                return Err(not_open());
            }
            self.written.push(data.to_vec());
            Ok(data.len())
        }

        async fn read(&mut self, max_len: usize) -> Result<Vec<u8>, Error> {
            match self.responses.pop_front() {
                Some(mut data) => {
                    data.truncate(max_len);
                    Ok(data)
                }
                None => {
                    let err = timed_out("read");
                    self.errors.set(ERR_IF_READ | ERR_IF_TIMEOUT, err.to_string());
                    Err(err.into())
                }
            }
        }

        fn error_state(&self) -> &ErrorState {
            &self.errors
        }

        fn reset_errors(&mut self) {
            self.errors.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn loopback(port: u16) -> EnetConfig {
        EnetConfig {
            ip: Ipv4Addr::LOCALHOST,
            port,
            own_port: 0,
            timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_tcp_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2];
            sock.read_exact(&mut buf).await.unwrap();
            sock.write_all(&[buf[0], buf[1], 0x00, 0x00]).await.unwrap();
        });

        let mut transport = TcpTransport::new(loopback(port));
        assert!(transport.open().await);
        assert!(transport.is_open());
        assert!(!transport.error_state().is_set());

        assert_eq!(transport.write(&[0x00, 0x01]).await.unwrap(), 2);
        let data = transport.read(16).await.unwrap();
        assert_eq!(data, vec![0x00, 0x01, 0x00, 0x00]);

        server.await.unwrap();
        transport.close();
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_tcp_open_failure_is_sticky() {
        // Grab a free port and release it so the connect is refused.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut transport = TcpTransport::new(loopback(port));
        assert!(!transport.open().await);
        assert!(!transport.is_open());
        assert_eq!(transport.error_state().code & ERR_IF_OPEN, ERR_IF_OPEN);
        assert!(transport.error_state().message.starts_with("TCP connect error"));

        assert!(matches!(
            transport.write(&[0x00]).await,
            Err(Error::Io(ref err)) if err.kind() == io::ErrorKind::NotConnected
        ));
        assert!(transport.error_state().is_set());

        transport.reset_errors();
        assert!(!transport.error_state().is_set());
    }

    #[tokio::test]
    async fn test_udp_roundtrip() {
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let device_port = device.local_addr().unwrap().port();

        let mut transport = UdpTransport::new(loopback(device_port));
        assert!(transport.open().await);

        transport.write(&[0x00, 0x03]).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, host) = device.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x00, 0x03]);
        device.send_to(&[0x00, 0x03, 0x00, 0x00], host).await.unwrap();

        let data = transport.read(64).await.unwrap();
        assert_eq!(data, vec![0x00, 0x03, 0x00, 0x00]);
        assert_eq!(transport.peer().map(|p| p.port()), Some(device_port));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_udp_host_port_reuse() {
        let own_port = std::net::UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = EnetConfig {
            own_port,
            ..loopback(DEFAULT_UDP_PORT)
        };

        let mut first = UdpTransport::new(config.clone());
        assert!(first.open().await);

        // The host port is still held by the first transport.
        let mut second = UdpTransport::new(config);
        assert!(second.open().await, "{}", second.error_state().message);

        first.close();
        assert!(first.open().await);
    }
}
