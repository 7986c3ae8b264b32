// SPDX-License-Identifier: Apache-2.0

use crate::msg::DhcpV6MessageType;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[non_exhaustive]
pub enum DhcpV6State {
    /// Quiescent: timers cancelled, receive disabled, no address bound.
    #[default]
    Inactive,
    /// Multicasting `Solicit`, collecting server `Advertise` offers.
    Solicit,
    /// Requesting the selected offer, waiting server `Reply`.
    Request,
    /// Lease acquired and address plumbed, waiting on the T1 timer.
    Bound,
    /// Refreshing the lease with its provider, until T2.
    Renew,
    /// Refreshing the lease with any server, until valid lifetime expiry.
    Rebind,
    /// Revalidating a still-valid lease after wake, link-up or roam.
    Confirm,
    /// Lease handed back, terminal until torn down.
    Release,
    /// Lease lost, transient on the way back to Solicit.
    Unbound,
    /// Declining a duplicated address before soliciting again.
    Decline,
    /// Stateless configuration exchange (`Information-request`).
    Inform,
    /// Stateless configuration obtained, terminal until restarted.
    InformComplete,
}

impl std::fmt::Display for DhcpV6State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Inactive => "inactive",
                Self::Solicit => "solicit",
                Self::Request => "request",
                Self::Bound => "bound",
                Self::Renew => "renew",
                Self::Rebind => "rebind",
                Self::Confirm => "confirm",
                Self::Release => "release",
                Self::Unbound => "unbound",
                Self::Decline => "decline",
                Self::Inform => "inform",
                Self::InformComplete => "inform_complete",
            }
        )
    }
}

impl DhcpV6State {
    /// The server message type this state is waiting for. States not
    /// expecting any server traffic return `None` and drop every datagram.
    pub(crate) fn expected_reply_type(&self) -> Option<DhcpV6MessageType> {
        match self {
            Self::Solicit => Some(DhcpV6MessageType::Advertise),
            Self::Request
            | Self::Renew
            | Self::Rebind
            | Self::Confirm
            | Self::Decline
            | Self::Inform => Some(DhcpV6MessageType::Reply),
            Self::Inactive
            | Self::Bound
            | Self::Release
            | Self::Unbound
            | Self::InformComplete => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound | Self::Renew | Self::Rebind)
    }
}
