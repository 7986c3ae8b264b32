// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv6Addr;

use crate::{
    buffer::{Buffer, BufferMut},
    DhcpError, DhcpV6Option, DhcpV6OptionCode, DhcpV6OptionStatus,
    ErrorContext, ErrorKind,
};

/// Lifetime value meaning "never expires" per RFC 3315 section 5.6.
pub const DHCPV6_INFINITE_LIFETIME: u32 = 0xffff_ffff;

#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[non_exhaustive]
pub struct DhcpV6OptionIaNa {
    pub iaid: u32,
    pub t1_sec: u32,
    pub t2_sec: u32,
    /// OPTION_IAADDR may repeat inside a single OPTION_IA_NA.
    pub addresses: Vec<DhcpV6OptionIaAddr>,
    pub status: Option<DhcpV6OptionStatus>,
}

impl DhcpV6OptionIaNa {
    pub(crate) const fn code() -> DhcpV6OptionCode {
        DhcpV6OptionCode::IANA
    }

    pub(crate) fn new(iaid: u32) -> Self {
        Self {
            iaid,
            ..Default::default()
        }
    }

    /// First IAADDR with a non-zero valid lifetime. An IAADDR claiming
    /// preferred > valid is a server bug; the scan stops there instead of
    /// trying later IAADDRs in the same IA_NA.
    pub(crate) fn usable_address(&self) -> Option<&DhcpV6OptionIaAddr> {
        for addr in self.addresses.as_slice() {
            if addr.preferred_time_sec > addr.valid_time_sec {
                log::info!(
                    "Ignoring IAADDR {} with preferred lifetime {} larger \
                     than valid lifetime {}",
                    addr.address,
                    addr.preferred_time_sec,
                    addr.valid_time_sec
                );
                return None;
            }
            if addr.valid_time_sec != 0 {
                return Some(addr);
            }
        }
        None
    }

    pub(crate) fn parse(buf: &mut Buffer) -> Result<Self, DhcpError> {
        let mut payload = buf
            .take_option(Self::code().into())
            .context("Invalid DHCPv6 OPTION_IA_NA")?;
        let mut ret = Self {
            iaid: payload
                .take_u32()
                .context("Invalid DHCPv6 OPTION_IA_NA IAID")?,
            t1_sec: payload
                .take_u32()
                .context("Invalid DHCPv6 OPTION_IA_NA T1")?,
            t2_sec: payload
                .take_u32()
                .context("Invalid DHCPv6 OPTION_IA_NA T2")?,
            ..Default::default()
        };

        // It could be either OPTION_IAADDR or OPTION_STATUS_CODE
        while !payload.is_empty() {
            let opt = DhcpV6Option::parse(&mut payload)?;
            match opt {
                DhcpV6Option::StatusCode(v) => {
                    ret.status = Some(v);
                }
                DhcpV6Option::IAAddr(v) => {
                    ret.addresses.push(v);
                }
                _ => {
                    return Err(DhcpError::new(
                        ErrorKind::InvalidDhcpMessage,
                        format!(
                            "Expecting OPTION_IAADDR or OPTION_STATUS_CODE in \
                             OPTION_IA_NA option field, but got {}",
                            opt.code()
                        ),
                    ));
                }
            }
        }
        Ok(ret)
    }

    pub(crate) fn emit(&self, buf: &mut BufferMut) {
        buf.put_option(Self::code().into(), |w| {
            w.put_u32(self.iaid);
            w.put_u32(self.t1_sec);
            w.put_u32(self.t2_sec);
            for address in self.addresses.as_slice() {
                address.emit(w);
            }
            if let Some(status) = self.status.as_ref() {
                status.emit(w);
            }
        });
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub struct DhcpV6OptionIaAddr {
    pub address: Ipv6Addr,
    pub preferred_time_sec: u32,
    pub valid_time_sec: u32,
    pub status: Option<DhcpV6OptionStatus>,
}

impl Default for DhcpV6OptionIaAddr {
    fn default() -> Self {
        Self {
            address: Ipv6Addr::UNSPECIFIED,
            preferred_time_sec: 0,
            valid_time_sec: 0,
            status: None,
        }
    }
}

impl DhcpV6OptionIaAddr {
    pub fn new(
        address: Ipv6Addr,
        preferred_time_sec: u32,
        valid_time_sec: u32,
    ) -> Self {
        Self {
            address,
            preferred_time_sec,
            valid_time_sec,
            ..Default::default()
        }
    }

    pub(crate) const fn code() -> DhcpV6OptionCode {
        DhcpV6OptionCode::IAAddr
    }

    pub(crate) fn parse(buf: &mut Buffer) -> Result<Self, DhcpError> {
        let mut payload = buf
            .take_option(Self::code().into())
            .context("Invalid DHCPv6 OPTION_IAADDR")?;
        Ok(Self {
            address: payload
                .take_ipv6()
                .context("Invalid DHCPv6 OPTION_IAADDR address")?,
            preferred_time_sec: payload.take_u32().context(
                "Invalid DHCPv6 OPTION_IAADDR preferred time",
            )?,
            valid_time_sec: payload
                .take_u32()
                .context("Invalid DHCPv6 OPTION_IAADDR valid time")?,
            status: {
                if payload.is_empty() {
                    None
                } else {
                    Some(DhcpV6OptionStatus::parse(&mut payload)?)
                }
            },
        })
    }

    pub(crate) fn emit(&self, buf: &mut BufferMut) {
        buf.put_option(Self::code().into(), |w| {
            w.put_ipv6(self.address);
            w.put_u32(self.preferred_time_sec);
            w.put_u32(self.valid_time_sec);
            if let Some(status) = self.status.as_ref() {
                status.emit(w);
            }
        });
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    // code 3, length 40: IAID 0x00aa10cc, T1 120, T2 192, one IAADDR
    // (2001:db8:0:5::1e, preferred 240, valid 480)
    const IA_NA_ONE_ADDR: [u8; 44] = [
        0x00, 0x03, 0x00, 0x28, 0x00, 0xaa, 0x10, 0xcc, 0x00, 0x00, 0x00,
        0x78, 0x00, 0x00, 0x00, 0xc0, 0x00, 0x05, 0x00, 0x18, 0x20, 0x01,
        0x0d, 0xb8, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x1e, 0x00, 0x00, 0x00, 0xf0, 0x00, 0x00, 0x01, 0xe0,
    ];

    #[test]
    fn parse_iana() -> Result<(), DhcpError> {
        let mut buf = Buffer::new(&IA_NA_ONE_ADDR);

        let opt = DhcpV6Option::parse(&mut buf)?;

        assert_eq!(
            opt,
            DhcpV6Option::IANA(DhcpV6OptionIaNa {
                iaid: 0x00aa10cc,
                t1_sec: 120,
                t2_sec: 192,
                addresses: vec![DhcpV6OptionIaAddr {
                    preferred_time_sec: 240,
                    valid_time_sec: 480,
                    address: Ipv6Addr::from_str("2001:db8:0:5::1e").unwrap(),
                    status: None,
                }],
                status: None,
            })
        );

        let mut buf = BufferMut::new();
        opt.emit(&mut buf);

        assert_eq!(buf.data.as_slice(), &IA_NA_ONE_ADDR);
        Ok(())
    }

    #[test]
    fn iana_with_repeated_iaaddr_round_trips() -> Result<(), DhcpError> {
        let mut ia_na = DhcpV6OptionIaNa::new(7);
        ia_na.addresses.push(DhcpV6OptionIaAddr::new(
            Ipv6Addr::from_str("2001:db8::21").unwrap(),
            60,
            90,
        ));
        ia_na.addresses.push(DhcpV6OptionIaAddr::new(
            Ipv6Addr::from_str("2001:db8::22").unwrap(),
            120,
            180,
        ));

        let mut buf = BufferMut::new();
        ia_na.emit(&mut buf);
        let mut read = Buffer::new(buf.data.as_slice());
        let parsed = DhcpV6OptionIaNa::parse(&mut read)?;
        assert_eq!(parsed.addresses.len(), 2);
        assert_eq!(parsed, ia_na);
        Ok(())
    }

    #[test]
    fn usable_address_skips_zero_valid() {
        let ia_na = DhcpV6OptionIaNa {
            iaid: 1,
            addresses: vec![
                DhcpV6OptionIaAddr::new(
                    Ipv6Addr::from_str("2001:db8::1").unwrap(),
                    0,
                    0,
                ),
                DhcpV6OptionIaAddr::new(
                    Ipv6Addr::from_str("2001:db8::2").unwrap(),
                    200,
                    300,
                ),
            ],
            ..Default::default()
        };
        assert_eq!(
            ia_na.usable_address().map(|a| a.address),
            Some(Ipv6Addr::from_str("2001:db8::2").unwrap())
        );
    }

    #[test]
    fn usable_address_rejects_preferred_larger_than_valid() {
        // The scan stops at the buggy IAADDR, it does not try the next one.
        let ia_na = DhcpV6OptionIaNa {
            iaid: 1,
            addresses: vec![
                DhcpV6OptionIaAddr::new(
                    Ipv6Addr::from_str("2001:db8::1").unwrap(),
                    400,
                    300,
                ),
                DhcpV6OptionIaAddr::new(
                    Ipv6Addr::from_str("2001:db8::2").unwrap(),
                    200,
                    300,
                ),
            ],
            ..Default::default()
        };
        assert_eq!(ia_na.usable_address(), None);
    }
}
