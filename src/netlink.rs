// SPDX-License-Identifier: Apache-2.0

use std::net::{IpAddr, Ipv6Addr};

use futures::stream::TryStreamExt;
use rtnetlink::packet_route::{address::AddressAttribute, link::LinkAttribute};

use crate::{DhcpError, DhcpV6AddrPlumb, ErrorKind};

pub(crate) async fn get_iface_index_mac(
    iface_name: &str,
) -> Result<(u32, Vec<u8>), DhcpError> {
    let (connection, handle, _) = rtnetlink::new_connection()?;

    tokio::spawn(connection);

    let mut links = handle
        .link()
        .get()
        .match_name(iface_name.to_string())
        .execute();

    while let Some(nl_msg) = links.try_next().await? {
        for nla in nl_msg.attributes {
            if let LinkAttribute::Address(mac) = nla {
                return Ok((nl_msg.header.index, mac));
            }
        }
        return Ok((nl_msg.header.index, Vec::new()));
    }
    Err(DhcpError::new(
        ErrorKind::InvalidArgument,
        format!("Interface {iface_name} not found"),
    ))
}

pub(crate) async fn get_link_local_addr(
    iface_index: u32,
) -> Result<Ipv6Addr, DhcpError> {
    let (connection, handle, _) = rtnetlink::new_connection()?;

    tokio::spawn(connection);

    let mut addrs = handle
        .address()
        .get()
        .set_link_index_filter(iface_index)
        .execute();

    while let Some(nl_msg) = addrs.try_next().await? {
        for attr in nl_msg.attributes {
            if let AddressAttribute::Address(IpAddr::V6(ip)) = attr {
                if is_unicast_link_local(ip) {
                    return Ok(ip);
                }
            }
        }
    }
    Err(DhcpError::new(
        ErrorKind::InvalidArgument,
        format!("No IPv6 link-local address on interface index {iface_index}"),
    ))
}

const fn is_unicast_link_local(addr: Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

impl From<rtnetlink::Error> for DhcpError {
    fn from(e: rtnetlink::Error) -> Self {
        Self::new(ErrorKind::Transport, format!("Netlink error: {e}"))
    }
}

/// Address plumb backed by rtnetlink. Each call spins a current-thread
/// runtime; address churn is rare enough that this never matters.
#[derive(Debug, Default)]
pub struct NetlinkAddrPlumb;

impl NetlinkAddrPlumb {
    fn runtime() -> Result<tokio::runtime::Runtime, DhcpError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(|e| {
                DhcpError::new(
                    ErrorKind::Bug,
                    format!("Failed to build tokio runtime: {e}"),
                )
            })
    }
}

impl DhcpV6AddrPlumb for NetlinkAddrPlumb {
    fn add(
        &mut self,
        iface_name: &str,
        addr: &Ipv6Addr,
        prefix_len: u8,
        valid_sec: u32,
        preferred_sec: u32,
    ) -> Result<(), DhcpError> {
        log::info!(
            "Adding {addr}/{prefix_len} on {iface_name}, valid {valid_sec}s, \
             preferred {preferred_sec}s"
        );
        let (iface_index, _) =
            Self::runtime()?.block_on(get_iface_index_mac(iface_name))?;
        Self::runtime()?.block_on(async move {
            let (connection, handle, _) = rtnetlink::new_connection()?;
            tokio::spawn(connection);
            handle
                .address()
                .add(iface_index, IpAddr::V6(*addr), prefix_len)
                .execute()
                .await?;
            Ok(())
        })
    }

    fn remove(
        &mut self,
        iface_name: &str,
        addr: &Ipv6Addr,
    ) -> Result<(), DhcpError> {
        log::info!("Removing {addr} on {iface_name}");
        let (iface_index, _) =
            Self::runtime()?.block_on(get_iface_index_mac(iface_name))?;
        let addr = *addr;
        Self::runtime()?.block_on(async move {
            let (connection, handle, _) = rtnetlink::new_connection()?;
            tokio::spawn(connection);
            let mut addrs = handle
                .address()
                .get()
                .set_link_index_filter(iface_index)
                .execute();
            while let Some(nl_msg) = addrs.try_next().await? {
                let matches = nl_msg.attributes.iter().any(|attr| {
                    matches!(
                        attr,
                        AddressAttribute::Address(IpAddr::V6(ip))
                            if *ip == addr
                    )
                });
                if matches {
                    handle.address().del(nl_msg).execute().await?;
                    return Ok(());
                }
            }
            Ok(())
        })
    }
}
