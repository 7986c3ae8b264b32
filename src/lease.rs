// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv6Addr;

use crate::{
    msg::DhcpV6Message, option_ia::DHCPV6_INFINITE_LIFETIME, DhcpError,
    DhcpV6Option, DhcpV6OptionCode, DhcpV6OptionIaNa, DhcpV6OptionList,
    ErrorKind,
};

const DEFAULT_PREFIX_LEN: u8 = 128;

/// A saved server message with its parsed option area and the lifetimes
/// computed from it. The SERVERID/IA_NA/IAADDR fields are owned copies of
/// the views into `raw`; they are replaced together whenever a new message
/// is saved.
#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub struct DhcpV6Lease {
    /// The raw datagram this lease was parsed from.
    pub(crate) raw: Vec<u8>,
    pub options: DhcpV6OptionList,
    pub server_duid: Vec<u8>,
    pub ia_na: DhcpV6OptionIaNa,
    pub addr: Ipv6Addr,
    pub prefix_len: u8,
    pub t1_sec: u32,
    pub t2_sec: u32,
    pub preferred_time_sec: u32,
    pub valid_time_sec: u32,
    /// Server preference, 0 when the option is absent.
    pub preference: u8,
    /// Boottime second the lease began.
    pub(crate) start_sec: i64,
    /// SSID the lease was learned on, for same-network detection on
    /// wireless interfaces.
    pub ssid: Option<String>,
    /// Whether this saved message corresponds to the currently obtained
    /// configuration rather than a yet unconfirmed advertisement.
    pub(crate) verified: bool,
}

impl DhcpV6Lease {
    /// Parse and normalize a saved ADVERTISE or REPLY. Returns
    /// `ErrorKind::NoLease` when the message carries no usable binding, and
    /// `ErrorKind::InvalidDhcpServerReply` on server misbehavior like
    /// T1 > T2.
    pub(crate) fn new_from_msg(
        raw: &[u8],
        msg: &DhcpV6Message,
        now_sec: i64,
        ssid: Option<&str>,
    ) -> Result<Self, DhcpError> {
        let server_duid = match msg.options.get(DhcpV6OptionCode::ServerId) {
            Some(DhcpV6Option::ServerId(v)) => v.clone(),
            _ => {
                return Err(DhcpError::new(
                    ErrorKind::InvalidDhcpServerReply,
                    format!(
                        "No OPTION_SERVERID in {} message",
                        msg.msg_type
                    ),
                ));
            }
        };
        let ia_na = match msg.options.get(DhcpV6OptionCode::IANA) {
            Some(DhcpV6Option::IANA(v)) => v.clone(),
            _ => {
                return Err(DhcpError::new(
                    ErrorKind::NoLease,
                    format!("No OPTION_IA_NA in {} message", msg.msg_type),
                ));
            }
        };
        let ia_addr = match ia_na.usable_address() {
            Some(a) => a.clone(),
            None => {
                return Err(DhcpError::new(
                    ErrorKind::NoLease,
                    format!(
                        "No usable OPTION_IAADDR in {} message",
                        msg.msg_type
                    ),
                ));
            }
        };
        let preference = match msg.options.get(DhcpV6OptionCode::Preference) {
            Some(DhcpV6Option::Preference(v)) => *v,
            _ => 0,
        };

        let mut valid = ia_addr.valid_time_sec;
        let mut preferred = ia_addr.preferred_time_sec;
        let mut t1 = ia_na.t1_sec;
        let mut t2 = ia_na.t2_sec;

        // RFC 3315 section 22.6: zero preferred lifetime means the server
        // left the choice to the client.
        if preferred == 0 {
            preferred = valid;
        }
        if valid == DHCPV6_INFINITE_LIFETIME
            || t1 == DHCPV6_INFINITE_LIFETIME
            || t2 == DHCPV6_INFINITE_LIFETIME
        {
            t1 = 0;
            t2 = 0;
            preferred = DHCPV6_INFINITE_LIFETIME;
            valid = DHCPV6_INFINITE_LIFETIME;
        } else {
            if t1 == 0 || t2 == 0 {
                // RFC 3315 section 22.4 fallback: T1 at half and T2 at 80%
                // of the preferred lifetime.
                t1 = preferred / 2;
                t2 = preferred / 5 * 4;
            }
            if t2 > valid {
                t2 = valid;
            }
            if t1 > t2 {
                return Err(DhcpError::new(
                    ErrorKind::InvalidDhcpServerReply,
                    format!(
                        "Server sent T1 {} larger than T2 {}, rejecting \
                         binding",
                        ia_na.t1_sec, ia_na.t2_sec
                    ),
                ));
            }
        }

        Ok(Self {
            raw: raw.to_vec(),
            options: msg.options.clone(),
            server_duid,
            addr: ia_addr.address,
            prefix_len: DEFAULT_PREFIX_LEN,
            ia_na,
            t1_sec: t1,
            t2_sec: t2,
            preferred_time_sec: preferred,
            valid_time_sec: valid,
            preference,
            start_sec: now_sec,
            ssid: ssid.map(str::to_string),
            verified: false,
        })
    }

    pub fn is_infinite(&self) -> bool {
        self.valid_time_sec == DHCPV6_INFINITE_LIFETIME
    }

    /// A lease is valid while (now - start) < valid lifetime. A clock that
    /// went backwards invalidates the lease.
    pub fn still_valid(&self, now_sec: i64) -> bool {
        if now_sec < self.start_sec {
            return false;
        }
        if self.is_infinite() {
            return true;
        }
        now_sec - self.start_sec < i64::from(self.valid_time_sec)
    }

    pub(crate) fn elapsed_sec(&self, now_sec: i64) -> i64 {
        now_sec.saturating_sub(self.start_sec)
    }

    /// Remaining valid lifetime, `None` once expired.
    pub(crate) fn valid_remaining(&self, now_sec: i64) -> Option<u32> {
        if !self.still_valid(now_sec) {
            return None;
        }
        if self.is_infinite() {
            return Some(DHCPV6_INFINITE_LIFETIME);
        }
        u32::try_from(
            i64::from(self.valid_time_sec) - self.elapsed_sec(now_sec),
        )
        .ok()
    }

    pub(crate) fn preferred_remaining(&self, now_sec: i64) -> u32 {
        if self.is_infinite() {
            return DHCPV6_INFINITE_LIFETIME;
        }
        u32::try_from(
            i64::from(self.preferred_time_sec) - self.elapsed_sec(now_sec),
        )
        .unwrap_or(0)
    }

    pub(crate) fn raw_packet(&self) -> &[u8] {
        self.raw.as_slice()
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;
    use crate::{
        msg::{DhcpV6MessageType, XID_MASK},
        DhcpV6Duid, DhcpV6OptionIaAddr,
    };

    fn test_msg(
        t1: u32,
        t2: u32,
        preferred: u32,
        valid: u32,
    ) -> (Vec<u8>, DhcpV6Message) {
        let mut msg = DhcpV6Message::new(
            DhcpV6MessageType::Reply,
            0x123456 & XID_MASK,
            &DhcpV6Duid::new_random(),
            &[],
            0,
        );
        msg.add_server_id(&[0x00, 0x03, 0x00, 0x01, 0xd2, 0x35]);
        let mut ia_na = DhcpV6OptionIaNa::new(77);
        ia_na.t1_sec = t1;
        ia_na.t2_sec = t2;
        ia_na.addresses.push(DhcpV6OptionIaAddr::new(
            Ipv6Addr::from_str("2001:db8::1").unwrap(),
            preferred,
            valid,
        ));
        msg.add_ia_na(ia_na);
        let raw = msg.emit().unwrap();
        let msg = DhcpV6Message::parse(&raw).unwrap();
        (raw, msg)
    }

    #[test]
    fn zero_t1_t2_fallback() -> Result<(), DhcpError> {
        let (raw, msg) = test_msg(0, 0, 200, 300);
        let lease = DhcpV6Lease::new_from_msg(&raw, &msg, 1000, None)?;
        assert_eq!(lease.t1_sec, 100);
        assert_eq!(lease.t2_sec, 160);
        assert_eq!(lease.preferred_time_sec, 200);
        assert_eq!(lease.valid_time_sec, 300);
        assert_eq!(lease.start_sec, 1000);
        Ok(())
    }

    #[test]
    fn zero_preferred_uses_valid() -> Result<(), DhcpError> {
        let (raw, msg) = test_msg(100, 160, 0, 300);
        let lease = DhcpV6Lease::new_from_msg(&raw, &msg, 0, None)?;
        assert_eq!(lease.preferred_time_sec, 300);
        Ok(())
    }

    #[test]
    fn infinite_valid_makes_lease_infinite() -> Result<(), DhcpError> {
        let (raw, msg) = test_msg(100, 160, 200, DHCPV6_INFINITE_LIFETIME);
        let lease = DhcpV6Lease::new_from_msg(&raw, &msg, 0, None)?;
        assert!(lease.is_infinite());
        assert_eq!(lease.t1_sec, 0);
        assert_eq!(lease.t2_sec, 0);
        assert_eq!(lease.preferred_time_sec, DHCPV6_INFINITE_LIFETIME);
        // valid forever
        assert!(lease.still_valid(i64::MAX));
        Ok(())
    }

    #[test]
    fn infinite_t1_makes_lease_infinite() -> Result<(), DhcpError> {
        let (raw, msg) = test_msg(DHCPV6_INFINITE_LIFETIME, 0, 200, 300);
        let lease = DhcpV6Lease::new_from_msg(&raw, &msg, 0, None)?;
        assert!(lease.is_infinite());
        assert_eq!(lease.t1_sec, 0);
        assert_eq!(lease.t2_sec, 0);
        Ok(())
    }

    #[test]
    fn t1_larger_than_t2_is_rejected() {
        let (raw, msg) = test_msg(200, 100, 200, 300);
        let e = DhcpV6Lease::new_from_msg(&raw, &msg, 0, None).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidDhcpServerReply);
    }

    #[test]
    fn preferred_larger_than_valid_is_rejected() {
        let (raw, msg) = test_msg(100, 160, 400, 300);
        let e = DhcpV6Lease::new_from_msg(&raw, &msg, 0, None).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::NoLease);
    }

    #[test]
    fn lease_expiry_and_backwards_clock() -> Result<(), DhcpError> {
        let (raw, msg) = test_msg(100, 160, 200, 300);
        let lease = DhcpV6Lease::new_from_msg(&raw, &msg, 1000, None)?;
        assert!(lease.still_valid(1000));
        assert!(lease.still_valid(1299));
        assert!(!lease.still_valid(1300));
        // clock went backwards
        assert!(!lease.still_valid(999));
        assert_eq!(lease.valid_remaining(1100), Some(200));
        assert_eq!(lease.valid_remaining(1300), None);
        Ok(())
    }
}
