// SPDX-License-Identifier: Apache-2.0

use crate::{
    buffer::{Buffer, BufferMut},
    DhcpError, DhcpV6Duid, DhcpV6Option, DhcpV6OptionCode, DhcpV6OptionIaNa,
    DhcpV6OptionList, ErrorContext, ErrorKind,
};

/// MTU sized send buffer.
pub(crate) const DHCPV6_SEND_BUFFER_LEN: usize = 1500;

const DHCPV6_HEADER_LEN: usize = 4;

pub(crate) const XID_MASK: u32 = 0x00ff_ffff;

/// Transaction id: the low 24 bits of a freshly drawn 32-bit random number.
pub(crate) fn new_xid() -> u32 {
    rand::random::<u32>() & XID_MASK
}

const MSG_TYPE_SOLICIT: u8 = 1;
const MSG_TYPE_ADVERTISE: u8 = 2;
const MSG_TYPE_REQUEST: u8 = 3;
const MSG_TYPE_CONFIRM: u8 = 4;
const MSG_TYPE_RENEW: u8 = 5;
const MSG_TYPE_REBIND: u8 = 6;
const MSG_TYPE_REPLY: u8 = 7;
const MSG_TYPE_RELEASE: u8 = 8;
const MSG_TYPE_DECLINE: u8 = 9;
const MSG_TYPE_INFORMATION_REQUEST: u8 = 11;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum DhcpV6MessageType {
    Solicit,
    Advertise,
    Request,
    Confirm,
    Renew,
    Rebind,
    Reply,
    Release,
    Decline,
    InformationRequest,
}

impl TryFrom<u8> for DhcpV6MessageType {
    type Error = DhcpError;
    fn try_from(d: u8) -> Result<Self, DhcpError> {
        match d {
            MSG_TYPE_SOLICIT => Ok(Self::Solicit),
            MSG_TYPE_ADVERTISE => Ok(Self::Advertise),
            MSG_TYPE_REQUEST => Ok(Self::Request),
            MSG_TYPE_CONFIRM => Ok(Self::Confirm),
            MSG_TYPE_RENEW => Ok(Self::Renew),
            MSG_TYPE_REBIND => Ok(Self::Rebind),
            MSG_TYPE_REPLY => Ok(Self::Reply),
            MSG_TYPE_RELEASE => Ok(Self::Release),
            MSG_TYPE_DECLINE => Ok(Self::Decline),
            MSG_TYPE_INFORMATION_REQUEST => Ok(Self::InformationRequest),
            _ => Err(DhcpError::new(
                ErrorKind::InvalidDhcpMessage,
                format!("Unsupported DHCPv6 message type {d}"),
            )),
        }
    }
}

impl From<DhcpV6MessageType> for u8 {
    fn from(v: DhcpV6MessageType) -> u8 {
        match v {
            DhcpV6MessageType::Solicit => MSG_TYPE_SOLICIT,
            DhcpV6MessageType::Advertise => MSG_TYPE_ADVERTISE,
            DhcpV6MessageType::Request => MSG_TYPE_REQUEST,
            DhcpV6MessageType::Confirm => MSG_TYPE_CONFIRM,
            DhcpV6MessageType::Renew => MSG_TYPE_RENEW,
            DhcpV6MessageType::Rebind => MSG_TYPE_REBIND,
            DhcpV6MessageType::Reply => MSG_TYPE_REPLY,
            DhcpV6MessageType::Release => MSG_TYPE_RELEASE,
            DhcpV6MessageType::Decline => MSG_TYPE_DECLINE,
            DhcpV6MessageType::InformationRequest => {
                MSG_TYPE_INFORMATION_REQUEST
            }
        }
    }
}

impl std::fmt::Display for DhcpV6MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Solicit => "solicit",
                Self::Advertise => "advertise",
                Self::Request => "request",
                Self::Confirm => "confirm",
                Self::Renew => "renew",
                Self::Rebind => "rebind",
                Self::Reply => "reply",
                Self::Release => "release",
                Self::Decline => "decline",
                Self::InformationRequest => "information_request",
            }
        )
    }
}

impl DhcpV6MessageType {
    /// RFC 3315: REQUEST, RENEW, RELEASE and DECLINE identify the server;
    /// SOLICIT, CONFIRM, REBIND and INFORMATION_REQUEST must not.
    pub(crate) fn needs_server_id(&self) -> bool {
        matches!(
            self,
            Self::Request | Self::Renew | Self::Release | Self::Decline
        )
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub struct DhcpV6Message {
    pub msg_type: DhcpV6MessageType,
    /// Low 24 bits only.
    pub xid: u32,
    pub options: DhcpV6OptionList,
}

impl DhcpV6Message {
    /// New client message carrying the mandatory leading options in wire
    /// order: CLIENTID, ORO, ELAPSED_TIME. SERVERID and IA_NA are appended
    /// by the caller when the message type requires them.
    pub(crate) fn new(
        msg_type: DhcpV6MessageType,
        xid: u32,
        client_duid: &DhcpV6Duid,
        request_opts: &[DhcpV6OptionCode],
        elapsed_time: u16,
    ) -> Self {
        let mut options = DhcpV6OptionList::new();
        options.insert(DhcpV6Option::ClientId(client_duid.to_vec()));
        options
            .insert(DhcpV6Option::OptionRequestOption(request_opts.to_vec()));
        options.insert(DhcpV6Option::ElapsedTime(elapsed_time));
        Self {
            msg_type,
            xid: xid & XID_MASK,
            options,
        }
    }

    pub(crate) fn add_server_id(&mut self, server_duid: &[u8]) {
        self.options
            .insert(DhcpV6Option::ServerId(server_duid.to_vec()));
    }

    pub(crate) fn add_ia_na(&mut self, ia_na: DhcpV6OptionIaNa) {
        self.options.insert(DhcpV6Option::IANA(ia_na));
    }

    pub(crate) fn emit(&self) -> Result<Vec<u8>, DhcpError> {
        let mut buf = BufferMut::new();
        let type_and_xid =
            (u32::from(u8::from(self.msg_type)) << 24) | (self.xid & XID_MASK);
        buf.put_u32(type_and_xid);
        self.options.emit(&mut buf);
        if buf.len() > DHCPV6_SEND_BUFFER_LEN {
            return Err(DhcpError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "DHCPv6 message length {} exceeds send buffer {}",
                    buf.len(),
                    DHCPV6_SEND_BUFFER_LEN
                ),
            ));
        }
        Ok(buf.data)
    }

    pub(crate) fn parse(payload: &[u8]) -> Result<Self, DhcpError> {
        if payload.len() < DHCPV6_HEADER_LEN {
            return Err(DhcpError::new(
                ErrorKind::InvalidDhcpMessage,
                format!(
                    "DHCPv6 message too short: {} bytes",
                    payload.len()
                ),
            ));
        }
        let mut buf = Buffer::new(payload);
        let type_and_xid = buf
            .take_u32()
            .context("Invalid DHCPv6 message header")?;
        let msg_type = DhcpV6MessageType::try_from((type_and_xid >> 24) as u8)?;
        let options = DhcpV6OptionList::parse_all(&mut buf)
            .context("Invalid DHCPv6 message option area")?;
        Ok(Self {
            msg_type,
            xid: type_and_xid & XID_MASK,
            options,
        })
    }
}

/// OPTION_ELAPSED_TIME payload: hundredths of a second since the exchange
/// began, 0 on the first transmit, saturating at u16::MAX.
pub(crate) fn elapsed_time_hundredths(
    exchange_begin_sec: i64,
    now_sec: i64,
) -> u16 {
    let elapsed = now_sec.saturating_sub(exchange_begin_sec);
    if elapsed <= 0 {
        0
    } else {
        u16::try_from(elapsed.saturating_mul(100)).unwrap_or(u16::MAX)
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv6Addr;
    use std::str::FromStr;

    use super::*;
    use crate::DhcpV6OptionIaAddr;

    #[test]
    fn solicit_round_trip() -> Result<(), DhcpError> {
        let duid = DhcpV6Duid::new_random();
        let request_opts = [
            DhcpV6OptionCode::DnsServers,
            DhcpV6OptionCode::DomainList,
            DhcpV6OptionCode::CaptivePortalUrl,
        ];
        let mut msg = DhcpV6Message::new(
            DhcpV6MessageType::Solicit,
            0x2af0c9,
            &duid,
            &request_opts,
            0,
        );
        let mut ia_na = DhcpV6OptionIaNa::new(0xfd2abc8e);
        ia_na.addresses.push(DhcpV6OptionIaAddr::new(
            Ipv6Addr::from_str("2001:db8::1").unwrap(),
            0,
            0,
        ));
        msg.add_ia_na(ia_na);

        let raw = msg.emit()?;
        let parsed = DhcpV6Message::parse(&raw)?;

        assert_eq!(parsed.msg_type, DhcpV6MessageType::Solicit);
        assert_eq!(parsed.xid, 0x2af0c9);
        assert_eq!(
            parsed.options.get(DhcpV6OptionCode::ClientId),
            Some(&DhcpV6Option::ClientId(duid.to_vec()))
        );
        assert_eq!(
            parsed.options.get(DhcpV6OptionCode::OptionRequestOption),
            Some(&DhcpV6Option::OptionRequestOption(request_opts.to_vec()))
        );
        assert_eq!(
            parsed.options.get(DhcpV6OptionCode::ElapsedTime),
            Some(&DhcpV6Option::ElapsedTime(0))
        );
        if let Some(DhcpV6Option::IANA(ia_na)) =
            parsed.options.get(DhcpV6OptionCode::IANA)
        {
            assert_eq!(ia_na.iaid, 0xfd2abc8e);
            assert_eq!(ia_na.t1_sec, 0);
            assert_eq!(ia_na.t2_sec, 0);
            assert_eq!(ia_na.addresses.len(), 1);
            assert_eq!(ia_na.addresses[0].preferred_time_sec, 0);
            assert_eq!(ia_na.addresses[0].valid_time_sec, 0);
        } else {
            panic!("OPTION_IA_NA missing in {parsed:?}");
        }
        Ok(())
    }

    #[test]
    fn xid_is_24_bits() {
        let duid = DhcpV6Duid::new_random();
        let msg = DhcpV6Message::new(
            DhcpV6MessageType::Solicit,
            0xff00_0001,
            &duid,
            &[],
            0,
        );
        assert_eq!(msg.xid, 0x0000_0001);
    }

    #[test]
    fn elapsed_time_formula() {
        assert_eq!(elapsed_time_hundredths(100, 100), 0);
        assert_eq!(elapsed_time_hundredths(100, 103), 300);
        // caps at u16::MAX
        assert_eq!(elapsed_time_hundredths(0, 0x10000), u16::MAX);
        // time went backwards
        assert_eq!(elapsed_time_hundredths(100, 50), 0);
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert!(DhcpV6Message::parse(&[0x01, 0x00]).is_err());
    }
}
