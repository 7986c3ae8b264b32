// SPDX-License-Identifier: Apache-2.0

use crate::{
    buffer::{Buffer, BufferMut},
    DhcpError, DhcpV6OptionCode, ErrorContext,
};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DhcpV6OptionStatus {
    pub status: DhcpV6OptionStatusCode,
    pub message: String,
}

impl DhcpV6OptionStatus {
    pub(crate) const fn code() -> DhcpV6OptionCode {
        DhcpV6OptionCode::StatusCode
    }

    pub(crate) fn parse(buf: &mut Buffer) -> Result<Self, DhcpError> {
        let mut payload = buf
            .take_option(Self::code().into())
            .context("Invalid DHCPv6 OPTION_STATUS_CODE")?;
        let status = payload
            .take_u16()
            .context("Invalid DHCPv6 OPTION_STATUS_CODE status-code")?
            .into();
        // Whatever follows the code is the human readable message.
        let message = payload
            .take_string(payload.len())
            .context("Invalid DHCPv6 OPTION_STATUS_CODE message")?;
        Ok(Self { status, message })
    }

    pub(crate) fn emit(&self, buf: &mut BufferMut) {
        buf.put_option(Self::code().into(), |w| {
            w.put_u16(self.status.into());
            w.put_str(&self.message);
        });
    }
}

// RFC 3315 section 24.4 Status Codes
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
pub enum DhcpV6OptionStatusCode {
    Success,
    UnspecFail,
    NoAddrsAvail,
    NoBinding,
    NotOnLink,
    UseMulticast,
    Other(u16),
}

impl From<u16> for DhcpV6OptionStatusCode {
    fn from(d: u16) -> Self {
        match d {
            0 => Self::Success,
            1 => Self::UnspecFail,
            2 => Self::NoAddrsAvail,
            3 => Self::NoBinding,
            4 => Self::NotOnLink,
            5 => Self::UseMulticast,
            _ => Self::Other(d),
        }
    }
}

impl From<DhcpV6OptionStatusCode> for u16 {
    fn from(v: DhcpV6OptionStatusCode) -> u16 {
        match v {
            DhcpV6OptionStatusCode::Success => 0,
            DhcpV6OptionStatusCode::UnspecFail => 1,
            DhcpV6OptionStatusCode::NoAddrsAvail => 2,
            DhcpV6OptionStatusCode::NoBinding => 3,
            DhcpV6OptionStatusCode::NotOnLink => 4,
            DhcpV6OptionStatusCode::UseMulticast => 5,
            DhcpV6OptionStatusCode::Other(d) => d,
        }
    }
}

impl std::fmt::Display for DhcpV6OptionStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::UnspecFail => "unspec-fail",
            Self::NoAddrsAvail => "no-addrs-avail",
            Self::NoBinding => "no-binding",
            Self::NotOnLink => "not-on-link",
            Self::UseMulticast => "use-multicast",
            Self::Other(d) => return write!(f, "status-{d}"),
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::DhcpV6Option;

    // code 13, length 12, status 3 (NoBinding), "no binding"
    const NO_BINDING: [u8; 16] = [
        0x00, 0x0d, 0x00, 0x0c, 0x00, 0x03, 0x6e, 0x6f, 0x20, 0x62, 0x69,
        0x6e, 0x64, 0x69, 0x6e, 0x67,
    ];

    #[test]
    fn parse_status_no_binding() -> Result<(), DhcpError> {
        let mut buf = Buffer::new(&NO_BINDING);

        let opt = DhcpV6Option::parse(&mut buf)?;

        assert_eq!(
            opt,
            DhcpV6Option::StatusCode(DhcpV6OptionStatus {
                status: DhcpV6OptionStatusCode::NoBinding,
                message: "no binding".into(),
            })
        );

        let mut buf = BufferMut::new();
        opt.emit(&mut buf);

        assert_eq!(buf.data.as_slice(), &NO_BINDING);
        Ok(())
    }

    #[test]
    fn empty_message_and_unassigned_code() -> Result<(), DhcpError> {
        let raw = &[0x00, 0x0d, 0x00, 0x02, 0x00, 0x63];
        let mut buf = Buffer::new(raw);
        let status = DhcpV6OptionStatus::parse(&mut buf)?;
        assert_eq!(status.status, DhcpV6OptionStatusCode::Other(99));
        assert_eq!(status.message, "");
        assert_eq!(status.status.to_string(), "status-99");
        Ok(())
    }

    #[test]
    fn parse_status_truncated() {
        // Declared length 0x20, only four payload bytes present.
        let raw = &[0x00, 0x0d, 0x00, 0x20, 0x00, 0x03, 0x6e, 0x6f];
        let mut buf = Buffer::new(raw);
        assert!(DhcpV6Option::parse(&mut buf).is_err());
    }
}
