// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv6Addr;
use std::sync::Mutex;

use crate::{DhcpV6DuidType, DhcpV6OptionCode};

#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash, Default)]
#[non_exhaustive]
pub enum DhcpV6Mode {
    /// Acquire a non-temporary address (IA_NA) and other configuration.
    #[default]
    Stateful,
    /// RFC 3736: only request configuration options via
    /// `Information-request`, addresses come from elsewhere (e.g. SLAAC).
    Stateless,
}

impl std::fmt::Display for DhcpV6Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stateful => write!(f, "stateful"),
            Self::Stateless => write!(f, "stateless"),
        }
    }
}

// The default set of options requested via OPTION_ORO.
const DEFAULT_REQUEST_OPTS: [DhcpV6OptionCode; 3] = [
    DhcpV6OptionCode::DnsServers,
    DhcpV6OptionCode::DomainList,
    DhcpV6OptionCode::CaptivePortalUrl,
];

static PROCESS_REQUEST_OPTS: Mutex<Option<Vec<DhcpV6OptionCode>>> =
    Mutex::new(None);

/// Replace the default ORO contents for every client created afterwards.
/// Meant to be called once by the supervisor before clients start.
pub fn override_process_request_opts(opts: &[u16]) {
    let mut opts: Vec<DhcpV6OptionCode> =
        opts.iter().map(|c| DhcpV6OptionCode::from(*c)).collect();
    opts.sort_unstable();
    opts.dedup();
    if let Ok(mut store) = PROCESS_REQUEST_OPTS.lock() {
        *store = Some(opts);
    }
}

fn process_request_opts() -> Vec<DhcpV6OptionCode> {
    match PROCESS_REQUEST_OPTS.lock() {
        Ok(store) => store
            .as_ref()
            .cloned()
            .unwrap_or_else(|| DEFAULT_REQUEST_OPTS.to_vec()),
        Err(_) => DEFAULT_REQUEST_OPTS.to_vec(),
    }
}

const DEFAULT_WAKE_SKEW_SEC: u32 = 30;

#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub struct DhcpV6Config {
    pub iface_name: String,
    pub iface_index: u32,
    pub mode: DhcpV6Mode,
    /// Use a fresh per-client DUID and IAID 0 instead of the process-wide
    /// identity.
    pub privacy: bool,
    pub duid_type: DhcpV6DuidType,
    /// Link-local source address the client binds to.
    pub src_ip: Ipv6Addr,
    pub(crate) src_mac: Option<Vec<u8>>,
    /// Timeout in seconds for getting/refreshing lease.
    /// 0 means infinitely.
    /// By default is wait infinitely.
    pub timeout_sec: u32,
    pub request_opts: Vec<DhcpV6OptionCode>,
    /// Grace threshold in seconds for honoring pre-sleep renew/rebind
    /// timers on wake: a timer still at least this far in the future is
    /// kept, anything closer triggers Confirm.
    pub wake_skew_sec: u32,
    /// Current SSID when the interface is wireless, for same-network
    /// detection on wake/roam. `None` reads as "different network".
    pub ssid: Option<String>,
    /// Cellular interfaces skip the initial Information-request delay.
    pub cellular: bool,
}

impl Default for DhcpV6Config {
    fn default() -> Self {
        Self {
            iface_name: String::new(),
            iface_index: 0,
            mode: DhcpV6Mode::default(),
            privacy: false,
            duid_type: DhcpV6DuidType::default(),
            src_ip: Ipv6Addr::UNSPECIFIED,
            src_mac: None,
            timeout_sec: 0,
            request_opts: process_request_opts(),
            wake_skew_sec: DEFAULT_WAKE_SKEW_SEC,
            ssid: None,
            cellular: false,
        }
    }
}

impl DhcpV6Config {
    pub fn new(iface_name: &str, mode: DhcpV6Mode) -> Self {
        Self {
            iface_name: iface_name.to_string(),
            mode,
            ..Default::default()
        }
    }

    pub fn set_iface_index(&mut self, iface_index: u32) -> &mut Self {
        self.iface_index = iface_index;
        self
    }

    /// Set the link local IP address
    pub fn set_link_local_ip(&mut self, addr: Ipv6Addr) -> &mut Self {
        self.src_ip = addr;
        self
    }

    /// Use a fresh private DUID with IAID 0, never sharing the
    /// process-wide identity.
    pub fn set_privacy(&mut self, privacy: bool) -> &mut Self {
        self.privacy = privacy;
        self
    }

    pub fn set_duid_type(&mut self, duid_type: DhcpV6DuidType) -> &mut Self {
        self.duid_type = duid_type;
        self
    }

    /// Timeout in seconds for getting/refreshing lease.
    /// 0 means infinitely.
    /// By default is wait infinitely.
    pub fn set_timeout_sec(&mut self, timeout_sec: u32) -> &mut Self {
        self.timeout_sec = timeout_sec;
        self
    }

    pub fn set_wake_skew_sec(&mut self, wake_skew_sec: u32) -> &mut Self {
        self.wake_skew_sec = wake_skew_sec;
        self
    }

    pub fn set_ssid(&mut self, ssid: Option<&str>) -> &mut Self {
        self.ssid = ssid.map(str::to_string);
        self
    }

    pub fn set_cellular(&mut self, cellular: bool) -> &mut Self {
        self.cellular = cellular;
        self
    }

    /// Specify arbitrary DHCP options to request for this client only.
    pub fn override_request_dhcp_opts(&mut self, opts: &[u16]) -> &mut Self {
        self.request_opts =
            opts.iter().map(|c| DhcpV6OptionCode::from(*c)).collect();
        self.request_opts.sort_unstable();
        self.request_opts.dedup();
        self
    }

    pub(crate) fn need_resolve(&self) -> bool {
        self.iface_index == 0 || self.src_ip.is_unspecified()
    }

    /// Get interface MAC address, IPv6 link-local address and interface
    /// index from the kernel.
    #[cfg(feature = "netlink")]
    pub async fn resolve(&mut self) -> Result<(), crate::DhcpError> {
        let (iface_index, src_mac) =
            crate::netlink::get_iface_index_mac(&self.iface_name).await?;
        self.iface_index = iface_index;
        if !src_mac.is_empty() {
            self.src_mac = Some(src_mac);
        }
        self.src_ip =
            crate::netlink::get_link_local_addr(self.iface_index).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_request_opts() {
        let config = DhcpV6Config::new("eth0", DhcpV6Mode::Stateful);
        assert!(config
            .request_opts
            .contains(&DhcpV6OptionCode::DnsServers));
        assert!(config
            .request_opts
            .contains(&DhcpV6OptionCode::DomainList));
        assert!(config
            .request_opts
            .contains(&DhcpV6OptionCode::CaptivePortalUrl));
    }
}
