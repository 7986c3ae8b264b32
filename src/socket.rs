// SPDX-License-Identifier: Apache-2.0

use std::net::{Ipv6Addr, SocketAddrV6, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};

use crate::{DhcpError, DhcpV6Config, ErrorKind};

/// RFC 3315: All_DHCP_Relay_Agents_and_Servers
const ALL_DHCP_RELAY_AGENTS_AND_SERVERS: Ipv6Addr =
    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 1, 2);

const DHCPV6_CLIENT_PORT: u16 = 546;
const DHCPV6_SERVER_PORT: u16 = 547;

const RECV_BUFFER_LEN: usize = 1500;

/// Transport seam between the protocol engine and the wire. The engine
/// never opens sockets itself, so tests can drive it with a queue-backed
/// implementation.
pub(crate) trait DhcpV6Socket: std::fmt::Debug {
    fn fd(&self) -> RawFd;
    fn send_multicast(&mut self, packet: &[u8]) -> Result<(), DhcpError>;
    /// One datagram, `None` when nothing is queued.
    fn recv(&mut self) -> Result<Option<Vec<u8>>, DhcpError>;
}

#[derive(Debug)]
pub(crate) struct DhcpUdpV6Socket {
    socket: UdpSocket,
    iface_index: u32,
}

impl DhcpUdpV6Socket {
    pub(crate) fn new(config: &DhcpV6Config) -> Result<Self, DhcpError> {
        if config.need_resolve() {
            return Err(DhcpError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "Interface index or link-local address not resolved for \
                     {}, please run DhcpV6Config::resolve() or set them \
                     manually",
                    config.iface_name
                ),
            ));
        }
        let so_addr = SocketAddrV6::new(
            config.src_ip,
            DHCPV6_CLIENT_PORT,
            0,
            config.iface_index,
        );
        log::debug!(
            "Creating UDP socket on [{}]:{DHCPV6_CLIENT_PORT} on interface \
             {}(index {})",
            config.src_ip,
            config.iface_name,
            config.iface_index,
        );
        let socket = UdpSocket::bind(so_addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            iface_index: config.iface_index,
        })
    }
}

impl DhcpV6Socket for DhcpUdpV6Socket {
    fn fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    fn send_multicast(&mut self, packet: &[u8]) -> Result<(), DhcpError> {
        let dst = SocketAddrV6::new(
            ALL_DHCP_RELAY_AGENTS_AND_SERVERS,
            DHCPV6_SERVER_PORT,
            0,
            self.iface_index,
        );
        log::trace!(
            "Sending DHCP packet multicast to all DHCPv6 servers and relays"
        );
        let mut sent = 0;
        while sent < packet.len() {
            sent += self.socket.send_to(&packet[sent..], dst)?;
        }
        Ok(())
    }

    fn recv(&mut self) -> Result<Option<Vec<u8>>, DhcpError> {
        let mut buffer = [0u8; RECV_BUFFER_LEN];
        match self.socket.recv(&mut buffer) {
            Ok(received) => {
                log::trace!("Received packet: {received} bytes");
                Ok(Some(buffer[..received].to_vec()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
