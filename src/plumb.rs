// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv6Addr;

use crate::DhcpError;

/// Kernel DAD flags delivered with address change notifications.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct DhcpV6AddrFlags {
    /// Duplicate address detection still in progress.
    pub tentative: bool,
    /// DAD found another node using this address.
    pub duplicated: bool,
}

/// Kernel-facing address seam. The engine adds and removes its bound
/// address through this trait; DAD results come back through
/// [crate::DhcpV6Client::process_addr_change].
pub trait DhcpV6AddrPlumb: std::fmt::Debug {
    fn add(
        &mut self,
        iface_name: &str,
        addr: &Ipv6Addr,
        prefix_len: u8,
        valid_sec: u32,
        preferred_sec: u32,
    ) -> Result<(), DhcpError>;

    fn remove(
        &mut self,
        iface_name: &str,
        addr: &Ipv6Addr,
    ) -> Result<(), DhcpError>;
}

/// For supervisors that plumb addresses themselves and only consume the
/// lease notifications.
#[derive(Debug, Default)]
pub struct NoOpAddrPlumb;

impl DhcpV6AddrPlumb for NoOpAddrPlumb {
    fn add(
        &mut self,
        iface_name: &str,
        addr: &Ipv6Addr,
        prefix_len: u8,
        valid_sec: u32,
        preferred_sec: u32,
    ) -> Result<(), DhcpError> {
        log::debug!(
            "NoOpAddrPlumb: skipping add of {addr}/{prefix_len} on \
             {iface_name} valid {valid_sec}s preferred {preferred_sec}s"
        );
        Ok(())
    }

    fn remove(
        &mut self,
        iface_name: &str,
        addr: &Ipv6Addr,
    ) -> Result<(), DhcpError> {
        log::debug!("NoOpAddrPlumb: skipping remove of {addr} on {iface_name}");
        Ok(())
    }
}
