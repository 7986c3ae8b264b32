// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv6Addr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use crate::{
    duid::{iaid_from_iface_name, is_valid_duid, process_duid},
    event::DhcpEventPool,
    msg::{new_xid, DhcpV6Message, DhcpV6MessageType},
    retransmit::DhcpV6Retransmit,
    socket::{DhcpUdpV6Socket, DhcpV6Socket},
    time::boot_time_sec,
    DhcpError, DhcpV6AddrFlags, DhcpV6AddrPlumb, DhcpV6Config, DhcpV6Duid,
    DhcpV6Event, DhcpV6Lease, DhcpV6Mode, DhcpV6Option, DhcpV6OptionCode,
    DhcpV6OptionIaAddr, DhcpV6OptionIaNa, DhcpV6OptionList, DhcpV6State,
    ErrorKind,
};

/// Outbound notification to the supervisor. Delivered as the return value
/// of [DhcpV6Client::process] after the handler has run to completion, so
/// a supervisor callback can never re-enter the state machine mid-handler.
#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum DhcpV6Notification {
    /// A verified state change altered externally visible configuration;
    /// poll [DhcpV6Client::get_info].
    StatusChanged(DhcpV6State),
    /// Solicit has been retrying long enough that something upstream is
    /// likely wrong. Safe to handle synchronously, it only reads state.
    GenerateSymptom { try_count: u32 },
}

#[derive(Debug)]
pub struct DhcpV6Client {
    pub(crate) config: DhcpV6Config,
    pub(crate) event_pool: DhcpEventPool,
    pub(crate) socket: Option<Box<dyn DhcpV6Socket>>,
    pub(crate) plumb: Box<dyn DhcpV6AddrPlumb>,
    pub(crate) duid: DhcpV6Duid,
    pub(crate) iaid: u32,
    pub(crate) state: DhcpV6State,
    pub(crate) xid: u32,
    pub(crate) retransmit: DhcpV6Retransmit,
    pub(crate) lease: Option<DhcpV6Lease>,
    pub(crate) stateless_info: Option<(Vec<u8>, DhcpV6OptionList)>,
    pub(crate) bound_addr: Option<Ipv6Addr>,
    pub(crate) dad_clean: bool,
    pub(crate) link_up: bool,
    /// Boottime second the next renew/rebind is scheduled for.
    pub(crate) next_renew_sec: Option<i64>,
    pub(crate) notification: Option<DhcpV6Notification>,
}

impl AsRawFd for DhcpV6Client {
    fn as_raw_fd(&self) -> RawFd {
        self.event_pool.epoll.as_raw_fd()
    }
}

fn default_plumb() -> Box<dyn DhcpV6AddrPlumb> {
    #[cfg(feature = "netlink")]
    {
        Box::new(crate::netlink::NetlinkAddrPlumb)
    }
    #[cfg(not(feature = "netlink"))]
    {
        Box::new(crate::plumb::NoOpAddrPlumb)
    }
}

/// Wireless same-network heuristic: an unreadable SSID on either side
/// reads as a different network, forcing a full Solicit on wake. Two wired
/// interfaces (no SSID at all) count as the same network.
fn same_network(
    current: &Option<String>,
    lease_ssid: &Option<String>,
) -> bool {
    match (current, lease_ssid) {
        (Some(a), Some(b)) => a == b,
        (None, None) => true,
        _ => false,
    }
}

impl DhcpV6Client {
    pub fn init(
        config: DhcpV6Config,
        lease: Option<DhcpV6Lease>,
    ) -> Result<Self, DhcpError> {
        Self::init_with(config, lease, None, default_plumb())
    }

    /// Like [DhcpV6Client::init] with a supervisor-supplied address plumb.
    pub fn init_with_plumb(
        config: DhcpV6Config,
        lease: Option<DhcpV6Lease>,
        plumb: Box<dyn DhcpV6AddrPlumb>,
    ) -> Result<Self, DhcpError> {
        Self::init_with(config, lease, None, plumb)
    }

    pub(crate) fn init_with(
        config: DhcpV6Config,
        lease: Option<DhcpV6Lease>,
        socket: Option<Box<dyn DhcpV6Socket>>,
        plumb: Box<dyn DhcpV6AddrPlumb>,
    ) -> Result<Self, DhcpError> {
        let duid = if config.privacy {
            // Fresh identity scoped to this client, never shared.
            DhcpV6Duid::new_random()
        } else {
            process_duid(config.duid_type, config.src_mac.as_deref())
        };
        let iaid = if config.privacy {
            0
        } else {
            iaid_from_iface_name(&config.iface_name)
        };
        let mut event_pool = DhcpEventPool::new()?;
        if let Some(s) = socket.as_ref() {
            event_pool.add_socket(s.fd(), DhcpV6Event::UdpPackageIn)?;
        }
        let mut ret = Self {
            config,
            event_pool,
            socket,
            plumb,
            duid,
            iaid,
            state: DhcpV6State::Inactive,
            xid: new_xid(),
            retransmit: DhcpV6Retransmit::new(boot_time_sec()),
            lease,
            stateless_info: None,
            bound_addr: None,
            dad_clean: false,
            link_up: true,
            next_renew_sec: None,
            notification: None,
        };
        ret.start()?;
        Ok(ret)
    }

    /// (Re)start the client: reset counters, then enter Solicit (stateful)
    /// or Inform (stateless). A retained still-valid lease learned on the
    /// current network is revalidated through Confirm instead.
    pub fn start(&mut self) -> Result<Option<DhcpV6Notification>, DhcpError> {
        let now = boot_time_sec();
        self.link_up = true;
        self.retransmit.reset(now);
        if self.config.timeout_sec > 0 {
            self.event_pool.add_timer(
                Duration::from_secs(self.config.timeout_sec.into()),
                DhcpV6Event::Timeout,
            )?;
        }
        match self.config.mode {
            DhcpV6Mode::Stateless => self.enter_inform()?,
            DhcpV6Mode::Stateful => {
                let keep = self.lease.as_ref().is_some_and(|l| {
                    l.still_valid(now)
                        && same_network(&self.config.ssid, &l.ssid)
                });
                if keep {
                    self.enter_confirm()?;
                } else {
                    self.lease = None;
                    self.enter_solicit()?;
                }
            }
        }
        Ok(self.take_notification())
    }

    /// Quiesce without discarding the lease or the plumbed address, so a
    /// later [DhcpV6Client::start] can try to keep the address through
    /// Confirm. Timer cancellation and receive teardown are synchronous.
    pub fn stop(&mut self) {
        log::debug!("Stopping DHCPv6 client on {}", self.config.iface_name);
        if let Some(lease) = self.lease.as_mut() {
            lease.verified = false;
        }
        self.event_pool.remove_all_event();
        self.socket = None;
        self.next_renew_sec = None;
        self.notification = None;
        self.state = DhcpV6State::Inactive;
    }

    pub fn poll(&self, wait_time: u32) -> Result<Vec<DhcpV6Event>, DhcpError> {
        self.event_pool.poll(wait_time)
    }

    pub fn state(&self) -> DhcpV6State {
        self.state
    }

    pub fn lease(&self) -> Option<&DhcpV6Lease> {
        self.lease.as_ref()
    }

    /// The saved server message and its parsed options, `Some` only once
    /// the saved message corresponds to the obtained configuration.
    pub fn get_info(&self) -> Option<(&[u8], &DhcpV6OptionList)> {
        if let Some((raw, opts)) = self.stateless_info.as_ref() {
            return Some((raw.as_slice(), opts));
        }
        self.lease
            .as_ref()
            .filter(|l| l.verified)
            .map(|l| (l.raw_packet(), &l.options))
    }

    pub fn process(
        &mut self,
        event: DhcpV6Event,
    ) -> Result<Option<DhcpV6Notification>, DhcpError> {
        log::debug!(
            "Processing event {} in state {}",
            event,
            self.state
        );
        match event {
            DhcpV6Event::TransmitWait => self.process_transmit()?,
            DhcpV6Event::UdpPackageIn => self.process_recv()?,
            DhcpV6Event::Renew => self.process_renew_timer()?,
            DhcpV6Event::LeaseExpired => self.process_lease_expired()?,
            DhcpV6Event::Timeout => {
                return Err(DhcpError::new(
                    ErrorKind::Timeout,
                    format!(
                        "Failed to acquire DHCPv6 lease on {} within {} \
                         seconds",
                        self.config.iface_name, self.config.timeout_sec
                    ),
                ));
            }
        }
        Ok(self.take_notification())
    }

    fn process_transmit(&mut self) -> Result<(), DhcpError> {
        self.event_pool.del_timer(DhcpV6Event::TransmitWait)?;
        match self.state {
            DhcpV6State::Solicit => self.solicit_timeout(),
            DhcpV6State::Request => self.request_timeout(),
            DhcpV6State::Renew | DhcpV6State::Rebind => {
                self.renew_rebind_timeout()
            }
            DhcpV6State::Confirm => self.confirm_timeout(),
            DhcpV6State::Decline => self.decline_timeout(),
            DhcpV6State::Inform => self.inform_timeout(),
            DhcpV6State::Bound
            | DhcpV6State::Inactive
            | DhcpV6State::Release
            | DhcpV6State::Unbound
            | DhcpV6State::InformComplete => {
                log::debug!(
                    "Ignoring stale transmit timer in state {}",
                    self.state
                );
                Ok(())
            }
        }
    }

    fn process_recv(&mut self) -> Result<(), DhcpError> {
        loop {
            let packet = match self.socket.as_mut() {
                Some(socket) => socket.recv()?,
                None => return Ok(()),
            };
            match packet {
                Some(raw) => self.process_datagram(&raw)?,
                None => return Ok(()),
            }
        }
    }

    pub(crate) fn process_datagram(
        &mut self,
        raw: &[u8],
    ) -> Result<(), DhcpError> {
        let msg = match self.accept_datagram(raw) {
            Some(msg) => msg,
            None => return Ok(()),
        };
        match self.state {
            DhcpV6State::Solicit => self.process_advertise(raw, msg),
            DhcpV6State::Request => self.process_request_reply(raw, msg),
            DhcpV6State::Renew | DhcpV6State::Rebind => {
                self.process_renew_rebind_reply(raw, msg)
            }
            DhcpV6State::Confirm => self.process_confirm_reply(msg),
            DhcpV6State::Decline => self.process_decline_reply(msg),
            DhcpV6State::Inform => self.process_inform_reply(raw, msg),
            // Unreachable: these states expect no reply and the filter has
            // already dropped the datagram.
            DhcpV6State::Inactive
            | DhcpV6State::Bound
            | DhcpV6State::Release
            | DhcpV6State::Unbound
            | DhcpV6State::InformComplete => Ok(()),
        }
    }

    /// Uniform acceptance filter: expected message type for the state,
    /// transaction id match, CLIENTID byte-match against our DUID, and a
    /// well formed SERVERID. Everything else is dropped silently.
    fn accept_datagram(&self, raw: &[u8]) -> Option<DhcpV6Message> {
        let msg = match DhcpV6Message::parse(raw) {
            Ok(msg) => msg,
            Err(e) => {
                log::debug!("Dropping undecodable DHCPv6 message: {e}");
                return None;
            }
        };
        let expected = match self.state.expected_reply_type() {
            Some(t) => t,
            None => {
                log::debug!(
                    "Dropping DHCPv6 {} message, state {} expects no reply",
                    msg.msg_type,
                    self.state
                );
                return None;
            }
        };
        if msg.msg_type != expected {
            log::debug!(
                "Dropping DHCP message due to type miss-match. Expecting \
                 {}, got {}",
                expected,
                msg.msg_type
            );
            return None;
        }
        if msg.xid != self.xid {
            log::debug!(
                "Dropping DHCP message due to xid miss-match. Expecting \
                 {:#08x}, got {:#08x}",
                self.xid,
                msg.xid
            );
            return None;
        }
        match msg.options.get(DhcpV6OptionCode::ClientId) {
            Some(DhcpV6Option::ClientId(duid))
                if duid.as_slice() == self.duid.to_vec().as_slice() => {}
            _ => {
                log::debug!(
                    "Dropping DHCP message due to OPTION_CLIENTID miss-match"
                );
                return None;
            }
        }
        match msg.options.get(DhcpV6OptionCode::ServerId) {
            Some(DhcpV6Option::ServerId(duid)) if is_valid_duid(duid) => {}
            _ => {
                log::debug!(
                    "Dropping DHCP message with missing or malformed \
                     OPTION_SERVERID"
                );
                return None;
            }
        }
        Some(msg)
    }

    /// Build an outgoing message: CLIENTID, ORO and ELAPSED_TIME always,
    /// SERVERID when the message type identifies a server, then the IA_NA
    /// with zero T1/T2 and the current address with zero lifetimes.
    pub(crate) fn new_dhcp_msg(
        &self,
        msg_type: DhcpV6MessageType,
    ) -> Result<DhcpV6Message, DhcpError> {
        let elapsed_time = if self.retransmit.try_count <= 1 {
            0
        } else {
            crate::msg::elapsed_time_hundredths(
                self.retransmit.begin_sec,
                boot_time_sec(),
            )
        };
        let mut msg = DhcpV6Message::new(
            msg_type,
            self.xid,
            &self.duid,
            self.config.request_opts.as_slice(),
            elapsed_time,
        );
        if msg_type.needs_server_id() {
            match self.lease.as_ref() {
                Some(lease) => msg.add_server_id(&lease.server_duid),
                None => {
                    return Err(DhcpError::new(
                        ErrorKind::Bug,
                        format!(
                            "No saved server message for {msg_type} in state \
                             {}",
                            self.state
                        ),
                    ));
                }
            }
        }
        if msg_type != DhcpV6MessageType::InformationRequest {
            let mut ia_na = DhcpV6OptionIaNa::new(self.iaid);
            if let Some(lease) = self.lease.as_ref() {
                // Lifetimes stay zero, the server supplies real ones in
                // its Reply per RFC 3315 section 18.1.1.
                ia_na
                    .addresses
                    .push(DhcpV6OptionIaAddr::new(lease.addr, 0, 0));
            }
            msg.add_ia_na(ia_na);
        }
        Ok(msg)
    }

    /// Transmit failures never kill the exchange: link-gone errors are
    /// swallowed, everything else is logged, and the retransmission timer
    /// re-attempts either way.
    pub(crate) fn transmit(
        &mut self,
        msg_type: DhcpV6MessageType,
    ) -> Result<(), DhcpError> {
        let packet = self.new_dhcp_msg(msg_type)?.emit()?;
        let socket = self.get_socket_or_init()?;
        match socket.send_multicast(&packet) {
            Ok(()) => {
                log::debug!("Sent DHCPv6 {msg_type}");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::LinkDown => {
                log::info!("Link down while sending {msg_type}, will retry");
                Ok(())
            }
            Err(e) => {
                log::warn!("Failed to send {msg_type}: {e}");
                Ok(())
            }
        }
    }

    fn get_socket_or_init(
        &mut self,
    ) -> Result<&mut Box<dyn DhcpV6Socket>, DhcpError> {
        if self.socket.is_none() {
            let socket = DhcpUdpV6Socket::new(&self.config)?;
            self.event_pool
                .add_socket(socket.fd(), DhcpV6Event::UdpPackageIn)?;
            self.socket = Some(Box::new(socket));
        }
        // Just assigned above when it was None.
        Ok(self.socket.as_mut().unwrap())
    }

    pub(crate) fn arm_transmit(
        &mut self,
        wait_time: Duration,
    ) -> Result<(), DhcpError> {
        self.event_pool
            .add_timer(wait_time, DhcpV6Event::TransmitWait)
    }

    pub(crate) fn post_notification(&mut self, n: DhcpV6Notification) {
        if let Some(old) = self.notification.replace(n) {
            log::warn!("Overwriting undelivered notification {old:?}");
        }
    }

    fn take_notification(&mut self) -> Option<DhcpV6Notification> {
        self.notification.take()
    }

    fn process_renew_timer(&mut self) -> Result<(), DhcpError> {
        if self.state == DhcpV6State::Bound {
            self.enter_renew()
        } else {
            log::debug!("Ignoring stale T1 timer in state {}", self.state);
            Ok(())
        }
    }

    fn process_lease_expired(&mut self) -> Result<(), DhcpError> {
        if self.state.is_bound() {
            log::info!(
                "DHCPv6 lease on {} expired",
                self.config.iface_name
            );
            self.enter_unbound()
        } else {
            log::debug!(
                "Ignoring stale lease expiry timer in state {}",
                self.state
            );
            Ok(())
        }
    }

    /// Lease lost: remove the address, clear the saved message, notify and
    /// immediately solicit again.
    pub(crate) fn enter_unbound(&mut self) -> Result<(), DhcpError> {
        self.state = DhcpV6State::Unbound;
        if let Some(addr) = self.bound_addr.take() {
            if let Err(e) =
                self.plumb.remove(&self.config.iface_name, &addr)
            {
                log::warn!("Failed to remove address {addr}: {e}");
            }
        }
        self.dad_clean = false;
        self.lease = None;
        self.next_renew_sec = None;
        self.event_pool.del_timer(DhcpV6Event::Renew)?;
        self.event_pool.del_timer(DhcpV6Event::LeaseExpired)?;
        self.post_notification(DhcpV6Notification::StatusChanged(
            DhcpV6State::Unbound,
        ));
        self.enter_solicit()
    }

    /// Quiescent: cancel timers and receives, clear the saved message,
    /// remove the address, notify. Only `start()` leaves this state.
    pub(crate) fn enter_inactive(&mut self) -> Result<(), DhcpError> {
        log::info!(
            "DHCPv6 client on {} going inactive",
            self.config.iface_name
        );
        self.event_pool.remove_all_event();
        self.socket = None;
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
        self.state = DhcpV6State::Inactive;
        self.post_notification(DhcpV6Notification::StatusChanged(
            DhcpV6State::Inactive,
        ));
        Ok(())
    }

    /// Supervisor-driven link loss.
    pub fn process_link_down(
        &mut self,
    ) -> Result<Option<DhcpV6Notification>, DhcpError> {
        self.link_up = false;
        if self.state != DhcpV6State::Inactive {
            self.enter_inactive()?;
        }
        Ok(self.take_notification())
    }

    /// Supervisor-driven link up with the current SSID snapshot. A still
    /// valid lease learned on the same network is revalidated through
    /// Confirm, anything else restarts the acquisition.
    pub fn process_link_up(
        &mut self,
        ssid: Option<&str>,
    ) -> Result<Option<DhcpV6Notification>, DhcpError> {
        self.link_up = true;
        self.config.ssid = ssid.map(str::to_string);
        self.start()
    }

    /// Wake from sleep. `bssid_changed` reports an access point roam that
    /// happened while asleep. Pre-sleep renew/rebind timers still at least
    /// `wake_skew_sec` in the future are honored instead of confirming.
    pub fn process_wake(
        &mut self,
        bssid_changed: bool,
        ssid: Option<&str>,
    ) -> Result<Option<DhcpV6Notification>, DhcpError> {
        let now = boot_time_sec();
        self.config.ssid = ssid.map(str::to_string);
        if self.config.mode == DhcpV6Mode::Stateless {
            // Stateless configuration may have changed across the sleep.
            self.enter_inform()?;
            return Ok(self.take_notification());
        }
        let lease_valid =
            self.lease.as_ref().is_some_and(|l| l.still_valid(now));
        if !lease_valid {
            if self.state != DhcpV6State::Inactive {
                self.enter_unbound()?;
            }
            return Ok(self.take_notification());
        }
        let same = self
            .lease
            .as_ref()
            .is_some_and(|l| same_network(&self.config.ssid, &l.ssid));
        if !same {
            // Different (or unreadable) network, the lease is suspect.
            self.lease = None;
            self.enter_solicit()?;
        } else if bssid_changed {
            self.enter_confirm()?;
        } else if self.state == DhcpV6State::Bound
            && self
                .next_renew_sec
                .is_some_and(|t| t >= now + i64::from(self.config.wake_skew_sec))
        {
            log::debug!(
                "Honoring pre-sleep renew timer, still {}s away",
                self.next_renew_sec.unwrap_or(0) - now
            );
        } else {
            self.enter_confirm()?;
        }
        Ok(self.take_notification())
    }

    /// Roamed to another access point while awake.
    pub fn process_bssid_change(
        &mut self,
    ) -> Result<Option<DhcpV6Notification>, DhcpError> {
        let now = boot_time_sec();
        if self.lease.as_ref().is_some_and(|l| l.still_valid(now)) {
            self.enter_confirm()?;
        }
        Ok(self.take_notification())
    }

    /// Kernel address notification, forwarded by the supervisor. Drives
    /// the DAD wait in Bound: TENTATIVE keeps waiting, DUPLICATED declines
    /// the address, a clean event publishes the new configuration.
    pub fn process_addr_change(
        &mut self,
        addr: &Ipv6Addr,
        flags: DhcpV6AddrFlags,
    ) -> Result<Option<DhcpV6Notification>, DhcpError> {
        if !self.state.is_bound() || self.bound_addr != Some(*addr) {
            log::debug!(
                "Ignoring address change of {addr} in state {}",
                self.state
            );
            return Ok(None);
        }
        if flags.duplicated {
            log::warn!("Address {addr} is duplicated on the link");
            self.enter_decline()?;
        } else if flags.tentative {
            log::debug!("Address {addr} still tentative, waiting");
        } else if !self.dad_clean {
            self.dad_clean = true;
            self.arm_lease_timers(boot_time_sec())?;
            self.post_notification(DhcpV6Notification::StatusChanged(
                self.state,
            ));
        }
        Ok(self.take_notification())
    }
}
