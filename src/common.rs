// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use log::warn;
use socket2::{Domain, Protocol, Socket, Type};
use std::{io, net::SocketAddr};
use tokio::net::UdpSocket;

/// Binds a non-blocking UDP socket with `SO_REUSEADDR` set, so a fixed host
/// port can be bound again right after the previous socket was closed.
pub fn bind_udp_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    UdpSocket::from_std(socket.into())
}

/// Requests a larger kernel receive buffer for the socket.  Failure is logged
/// and otherwise ignored, the socket stays usable with the default size.
#[cfg(target_os = "linux")]
pub fn set_socket_bufsize(socket: &UdpSocket, size: usize) {
    use std::os::fd::AsRawFd;

    let fd = socket.as_raw_fd();
    let size = size as libc::c_int;
    let err = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &size as *const _ as *const libc::c_void,
            std::mem::size_of_val(&size) as libc::socklen_t,
        )
    };
    if err != 0 {
        warn!(
            "setsockopt SO_RCVBUF failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_socket_bufsize(_socket: &UdpSocket, _size: usize) {}
