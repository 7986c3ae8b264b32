// SPDX-License-Identifier: Apache-2.0

use crate::{
    msg::{new_xid, DhcpV6MessageType},
    time::boot_time_sec,
    DhcpError, DhcpV6Client, DhcpV6State,
};

impl DhcpV6Client {
    /// RFC 3315:
    ///     Implementations SHOULD retransmit one or more times but MAY
    ///     choose to terminate the retransmission procedure early.
    /// A single RELEASE is transmitted without waiting for the server
    /// Reply, the address is removed, and the client stays torn down in
    /// the Release state.
    pub fn release(&mut self) -> Result<(), DhcpError> {
        if self.lease.is_some() {
            self.xid = new_xid();
            self.retransmit.reset(boot_time_sec());
            self.retransmit.try_count = 1;
            self.state = DhcpV6State::Release;
            if let Err(e) = self.transmit(DhcpV6MessageType::Release) {
                log::info!("Failed to transmit RELEASE, ignoring: {e}");
            }
        }
        if let Some(addr) = self.bound_addr.take() {
            if let Err(e) =
                self.plumb.remove(&self.config.iface_name, &addr)
            {
                log::warn!("Failed to remove address {addr}: {e}");
            }
        }
        self.dad_clean = false;
        self.lease = None;
        self.stateless_info = None;
        self.next_renew_sec = None;
        self.event_pool.remove_all_event();
        self.socket = None;
        self.state = DhcpV6State::Release;
        Ok(())
    }
}
