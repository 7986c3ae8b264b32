// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv6Addr;

use crate::{
    buffer::{Buffer, BufferMut},
    DhcpError, DhcpV6OptionIaAddr, DhcpV6OptionIaNa, DhcpV6OptionStatus,
    DhcpV6OptionStatusCode, ErrorContext,
};

const OPT_CODE_CLIENT_ID: u16 = 1;
const OPT_CODE_SERVER_ID: u16 = 2;
const OPT_CODE_IA_NA: u16 = 3;
const OPT_CODE_IAADDR: u16 = 5;
const OPT_CODE_ORO: u16 = 6;
const OPT_CODE_PREFERENCE: u16 = 7;
const OPT_CODE_ELAPSED_TIME: u16 = 8;
const OPT_CODE_RELAY_MSG: u16 = 9;
const OPT_CODE_AUTH: u16 = 11;
const OPT_CODE_UNICAST: u16 = 12;
const OPT_CODE_STATUS_CODE: u16 = 13;
const OPT_CODE_RAPID_COMMIT: u16 = 14;
const OPT_CODE_USER_CLASS: u16 = 15;
const OPT_CODE_VENDOR_CLASS: u16 = 16;
const OPT_CODE_VENDOR_OPTS: u16 = 17;
const OPT_CODE_INTERFACE_ID: u16 = 18;
const OPT_CODE_RECONF_MSG: u16 = 19;
const OPT_CODE_RECONF_ACCEPT: u16 = 20;
const OPT_CODE_DNS_SERVERS: u16 = 23;
const OPT_CODE_DOMAIN_LIST: u16 = 24;
const OPT_CODE_CAPTIVE_PORTAL_URL: u16 = 103;

#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum DhcpV6OptionCode {
    ClientId,
    ServerId,
    IANA,
    IAAddr,
    OptionRequestOption,
    Preference,
    ElapsedTime,
    RelayMsg,
    Authentication,
    ServerUnicast,
    StatusCode,
    RapidCommit,
    UserClass,
    VendorClass,
    VendorOpts,
    InterfaceId,
    ReconfMsg,
    ReconfAccept,
    DnsServers,
    DomainList,
    CaptivePortalUrl,
    Other(u16),
}

impl From<u16> for DhcpV6OptionCode {
    fn from(d: u16) -> Self {
        match d {
            OPT_CODE_CLIENT_ID => Self::ClientId,
            OPT_CODE_SERVER_ID => Self::ServerId,
            OPT_CODE_IA_NA => Self::IANA,
            OPT_CODE_IAADDR => Self::IAAddr,
            OPT_CODE_ORO => Self::OptionRequestOption,
            OPT_CODE_PREFERENCE => Self::Preference,
            OPT_CODE_ELAPSED_TIME => Self::ElapsedTime,
            OPT_CODE_RELAY_MSG => Self::RelayMsg,
            OPT_CODE_AUTH => Self::Authentication,
            OPT_CODE_UNICAST => Self::ServerUnicast,
            OPT_CODE_STATUS_CODE => Self::StatusCode,
            OPT_CODE_RAPID_COMMIT => Self::RapidCommit,
            OPT_CODE_USER_CLASS => Self::UserClass,
            OPT_CODE_VENDOR_CLASS => Self::VendorClass,
            OPT_CODE_VENDOR_OPTS => Self::VendorOpts,
            OPT_CODE_INTERFACE_ID => Self::InterfaceId,
            OPT_CODE_RECONF_MSG => Self::ReconfMsg,
            OPT_CODE_RECONF_ACCEPT => Self::ReconfAccept,
            OPT_CODE_DNS_SERVERS => Self::DnsServers,
            OPT_CODE_DOMAIN_LIST => Self::DomainList,
            OPT_CODE_CAPTIVE_PORTAL_URL => Self::CaptivePortalUrl,
            _ => Self::Other(d),
        }
    }
}

impl From<DhcpV6OptionCode> for u16 {
    fn from(v: DhcpV6OptionCode) -> u16 {
        match v {
            DhcpV6OptionCode::ClientId => OPT_CODE_CLIENT_ID,
            DhcpV6OptionCode::ServerId => OPT_CODE_SERVER_ID,
            DhcpV6OptionCode::IANA => OPT_CODE_IA_NA,
            DhcpV6OptionCode::IAAddr => OPT_CODE_IAADDR,
            DhcpV6OptionCode::OptionRequestOption => OPT_CODE_ORO,
            DhcpV6OptionCode::Preference => OPT_CODE_PREFERENCE,
            DhcpV6OptionCode::ElapsedTime => OPT_CODE_ELAPSED_TIME,
            DhcpV6OptionCode::RelayMsg => OPT_CODE_RELAY_MSG,
            DhcpV6OptionCode::Authentication => OPT_CODE_AUTH,
            DhcpV6OptionCode::ServerUnicast => OPT_CODE_UNICAST,
            DhcpV6OptionCode::StatusCode => OPT_CODE_STATUS_CODE,
            DhcpV6OptionCode::RapidCommit => OPT_CODE_RAPID_COMMIT,
            DhcpV6OptionCode::UserClass => OPT_CODE_USER_CLASS,
            DhcpV6OptionCode::VendorClass => OPT_CODE_VENDOR_CLASS,
            DhcpV6OptionCode::VendorOpts => OPT_CODE_VENDOR_OPTS,
            DhcpV6OptionCode::InterfaceId => OPT_CODE_INTERFACE_ID,
            DhcpV6OptionCode::ReconfMsg => OPT_CODE_RECONF_MSG,
            DhcpV6OptionCode::ReconfAccept => OPT_CODE_RECONF_ACCEPT,
            DhcpV6OptionCode::DnsServers => OPT_CODE_DNS_SERVERS,
            DhcpV6OptionCode::DomainList => OPT_CODE_DOMAIN_LIST,
            DhcpV6OptionCode::CaptivePortalUrl => OPT_CODE_CAPTIVE_PORTAL_URL,
            DhcpV6OptionCode::Other(d) => d,
        }
    }
}

impl std::fmt::Display for DhcpV6OptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientId => write!(f, "OPTION_CLIENTID"),
            Self::ServerId => write!(f, "OPTION_SERVERID"),
            Self::IANA => write!(f, "OPTION_IA_NA"),
            Self::IAAddr => write!(f, "OPTION_IAADDR"),
            Self::OptionRequestOption => write!(f, "OPTION_ORO"),
            Self::Preference => write!(f, "OPTION_PREFERENCE"),
            Self::ElapsedTime => write!(f, "OPTION_ELAPSED_TIME"),
            Self::RelayMsg => write!(f, "OPTION_RELAY_MSG"),
            Self::Authentication => write!(f, "OPTION_AUTH"),
            Self::ServerUnicast => write!(f, "OPTION_UNICAST"),
            Self::StatusCode => write!(f, "OPTION_STATUS_CODE"),
            Self::RapidCommit => write!(f, "OPTION_RAPID_COMMIT"),
            Self::UserClass => write!(f, "OPTION_USER_CLASS"),
            Self::VendorClass => write!(f, "OPTION_VENDOR_CLASS"),
            Self::VendorOpts => write!(f, "OPTION_VENDOR_OPTS"),
            Self::InterfaceId => write!(f, "OPTION_INTERFACE_ID"),
            Self::ReconfMsg => write!(f, "OPTION_RECONF_MSG"),
            Self::ReconfAccept => write!(f, "OPTION_RECONF_ACCEPT"),
            Self::DnsServers => write!(f, "OPTION_DNS_SERVERS"),
            Self::DomainList => write!(f, "OPTION_DOMAIN_LIST"),
            Self::CaptivePortalUrl => write!(f, "OPTION_CAPTIVE_PORTAL_URL"),
            Self::Other(d) => write!(f, "OPTION_UNKNOWN({d})"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum DhcpV6Option {
    ClientId(Vec<u8>),
    ServerId(Vec<u8>),
    IANA(DhcpV6OptionIaNa),
    IAAddr(DhcpV6OptionIaAddr),
    OptionRequestOption(Vec<DhcpV6OptionCode>),
    Preference(u8),
    ElapsedTime(u16),
    ServerUnicast(Ipv6Addr),
    StatusCode(DhcpV6OptionStatus),
    RapidCommit,
    DnsServers(Vec<Ipv6Addr>),
    /// DNS search list in DNS wire format, carried without interpretation.
    DomainList(Vec<u8>),
    CaptivePortalUrl(String),
    Unknown(DhcpV6OptionUnknown),
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub struct DhcpV6OptionUnknown {
    pub code: u16,
    pub data: Vec<u8>,
}

impl DhcpV6Option {
    pub fn code(&self) -> DhcpV6OptionCode {
        match self {
            Self::ClientId(_) => DhcpV6OptionCode::ClientId,
            Self::ServerId(_) => DhcpV6OptionCode::ServerId,
            Self::IANA(_) => DhcpV6OptionCode::IANA,
            Self::IAAddr(_) => DhcpV6OptionCode::IAAddr,
            Self::OptionRequestOption(_) => {
                DhcpV6OptionCode::OptionRequestOption
            }
            Self::Preference(_) => DhcpV6OptionCode::Preference,
            Self::ElapsedTime(_) => DhcpV6OptionCode::ElapsedTime,
            Self::ServerUnicast(_) => DhcpV6OptionCode::ServerUnicast,
            Self::StatusCode(_) => DhcpV6OptionCode::StatusCode,
            Self::RapidCommit => DhcpV6OptionCode::RapidCommit,
            Self::DnsServers(_) => DhcpV6OptionCode::DnsServers,
            Self::DomainList(_) => DhcpV6OptionCode::DomainList,
            Self::CaptivePortalUrl(_) => DhcpV6OptionCode::CaptivePortalUrl,
            Self::Unknown(v) => DhcpV6OptionCode::from(v.code),
        }
    }

    pub(crate) fn parse(buf: &mut Buffer) -> Result<Self, DhcpError> {
        let code = buf.peek_u16().context("Invalid DHCPv6 option code")?;
        match DhcpV6OptionCode::from(code) {
            DhcpV6OptionCode::IANA => {
                Ok(Self::IANA(DhcpV6OptionIaNa::parse(buf)?))
            }
            DhcpV6OptionCode::IAAddr => {
                Ok(Self::IAAddr(DhcpV6OptionIaAddr::parse(buf)?))
            }
            DhcpV6OptionCode::StatusCode => {
                Ok(Self::StatusCode(DhcpV6OptionStatus::parse(buf)?))
            }
            code => Self::parse_flat(buf, code),
        }
    }

    // Options whose payload is a flat value without nested options.
    fn parse_flat(
        buf: &mut Buffer,
        code: DhcpV6OptionCode,
    ) -> Result<Self, DhcpError> {
        let mut payload = buf
            .take_option(code.into())
            .context("Invalid DHCPv6 option")?;
        match code {
            DhcpV6OptionCode::ClientId => {
                Ok(Self::ClientId(payload.take_bytes(payload.len())?.to_vec()))
            }
            DhcpV6OptionCode::ServerId => {
                Ok(Self::ServerId(payload.take_bytes(payload.len())?.to_vec()))
            }
            DhcpV6OptionCode::OptionRequestOption => {
                let mut codes = Vec::new();
                while !payload.is_empty() {
                    codes.push(DhcpV6OptionCode::from(
                        payload
                            .take_u16()
                            .context("Invalid DHCPv6 OPTION_ORO code")?,
                    ));
                }
                Ok(Self::OptionRequestOption(codes))
            }
            DhcpV6OptionCode::Preference => Ok(Self::Preference(
                payload
                    .take_u8()
                    .context("Invalid DHCPv6 OPTION_PREFERENCE")?,
            )),
            DhcpV6OptionCode::ElapsedTime => Ok(Self::ElapsedTime(
                payload
                    .take_u16()
                    .context("Invalid DHCPv6 OPTION_ELAPSED_TIME")?,
            )),
            DhcpV6OptionCode::ServerUnicast => Ok(Self::ServerUnicast(
                payload
                    .take_ipv6()
                    .context("Invalid DHCPv6 OPTION_UNICAST")?,
            )),
            DhcpV6OptionCode::RapidCommit => Ok(Self::RapidCommit),
            DhcpV6OptionCode::DnsServers => {
                let mut srvs = Vec::new();
                while !payload.is_empty() {
                    srvs.push(
                        payload
                            .take_ipv6()
                            .context("Invalid DHCPv6 OPTION_DNS_SERVERS")?,
                    );
                }
                Ok(Self::DnsServers(srvs))
            }
            DhcpV6OptionCode::DomainList => Ok(Self::DomainList(
                payload.take_bytes(payload.len())?.to_vec(),
            )),
            DhcpV6OptionCode::CaptivePortalUrl => Ok(Self::CaptivePortalUrl(
                payload
                    .take_string(payload.len())
                    .context("Invalid DHCPv6 OPTION_CAPTIVE_PORTAL_URL")?,
            )),
            // Remaining codes are accepted and carried, never interpreted.
            code => Ok(Self::Unknown(DhcpV6OptionUnknown {
                code: code.into(),
                data: payload.take_bytes(payload.len())?.to_vec(),
            })),
        }
    }

    pub(crate) fn emit(&self, buf: &mut BufferMut) {
        let code = u16::from(self.code());
        match self {
            Self::ClientId(v) | Self::ServerId(v) | Self::DomainList(v) => {
                buf.put_option(code, |w| w.put_bytes(v))
            }
            Self::IANA(v) => v.emit(buf),
            Self::IAAddr(v) => v.emit(buf),
            Self::OptionRequestOption(codes) => buf.put_option(code, |w| {
                for c in codes {
                    w.put_u16((*c).into());
                }
            }),
            Self::Preference(v) => buf.put_option(code, |w| w.put_u8(*v)),
            Self::ElapsedTime(v) => buf.put_option(code, |w| w.put_u16(*v)),
            Self::ServerUnicast(v) => {
                buf.put_option(code, |w| w.put_ipv6(*v))
            }
            Self::StatusCode(v) => v.emit(buf),
            Self::RapidCommit => buf.put_option(code, |_| ()),
            Self::DnsServers(srvs) => buf.put_option(code, |w| {
                for srv in srvs {
                    w.put_ipv6(*srv);
                }
            }),
            Self::CaptivePortalUrl(v) => {
                buf.put_option(code, |w| w.put_str(v))
            }
            Self::Unknown(v) => {
                buf.put_option(v.code, |w| w.put_bytes(v.data.as_slice()))
            }
        }
    }
}

/// Parsed option area of a DHCPv6 message, preserving wire order so
/// duplicate options can be enumerated.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct DhcpV6OptionList {
    opts: Vec<DhcpV6Option>,
}

impl DhcpV6OptionList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn parse_all(buf: &mut Buffer) -> Result<Self, DhcpError> {
        let mut opts = Vec::new();
        while !buf.is_empty() {
            opts.push(DhcpV6Option::parse(buf)?);
        }
        Ok(Self { opts })
    }

    pub(crate) fn insert(&mut self, opt: DhcpV6Option) {
        self.opts.push(opt);
    }

    /// First occurrence of `code`.
    pub fn get(&self, code: DhcpV6OptionCode) -> Option<&DhcpV6Option> {
        self.opts.iter().find(|o| o.code() == code)
    }

    /// Enumerate duplicates: returns the first occurrence of `code` at or
    /// after `*start`, leaving `*start` one past the match.
    pub fn get_from(
        &self,
        code: DhcpV6OptionCode,
        start: &mut usize,
    ) -> Option<&DhcpV6Option> {
        while *start < self.opts.len() {
            let index = *start;
            *start += 1;
            if self.opts[index].code() == code {
                return Some(&self.opts[index]);
            }
        }
        None
    }

    /// A message without OPTION_STATUS_CODE is a success per RFC 3315
    /// section 22.13.
    pub fn status(&self) -> DhcpV6OptionStatusCode {
        match self.get(DhcpV6OptionCode::StatusCode) {
            Some(DhcpV6Option::StatusCode(v)) => v.status,
            _ => DhcpV6OptionStatusCode::Success,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DhcpV6Option> {
        self.opts.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.opts.is_empty()
    }

    pub(crate) fn emit(&self, buf: &mut BufferMut) {
        for opt in self.opts.as_slice() {
            opt.emit(buf);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn option_list_duplicate_enumeration() -> Result<(), DhcpError> {
        let mut opts = DhcpV6OptionList::new();
        opts.insert(DhcpV6Option::Preference(1));
        opts.insert(DhcpV6Option::ElapsedTime(0));
        opts.insert(DhcpV6Option::Preference(9));

        let mut start = 0;
        assert_eq!(
            opts.get_from(DhcpV6OptionCode::Preference, &mut start),
            Some(&DhcpV6Option::Preference(1))
        );
        assert_eq!(
            opts.get_from(DhcpV6OptionCode::Preference, &mut start),
            Some(&DhcpV6Option::Preference(9))
        );
        assert_eq!(
            opts.get_from(DhcpV6OptionCode::Preference, &mut start),
            None
        );
        Ok(())
    }

    #[test]
    fn missing_status_code_means_success() {
        let opts = DhcpV6OptionList::new();
        assert_eq!(opts.status(), DhcpV6OptionStatusCode::Success);
    }

    #[test]
    fn unknown_option_round_trip() -> Result<(), DhcpError> {
        let raw = &[0x00, 0xf0, 0x00, 0x03, 0x01, 0x02, 0x03];
        let mut buf = Buffer::new(raw);
        let opt = DhcpV6Option::parse(&mut buf)?;
        assert_eq!(
            opt,
            DhcpV6Option::Unknown(DhcpV6OptionUnknown {
                code: 0xf0,
                data: vec![1, 2, 3],
            })
        );
        let mut out = BufferMut::new();
        opt.emit(&mut out);
        assert_eq!(out.data.as_slice(), raw);
        Ok(())
    }

    #[test]
    fn option_length_beyond_buffer_is_rejected() {
        let raw = &[0x00, 0x06, 0x00, 0x08, 0x00, 0x17];
        let mut buf = Buffer::new(raw);
        assert!(DhcpV6Option::parse(&mut buf).is_err());
    }
}
