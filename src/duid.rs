// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::{
    buffer::{Buffer, BufferMut},
    DhcpError, ErrorContext, ErrorKind,
};

// RFC 3315 section 9.1: DUID is an opaque value of at most 128 octets plus
// the 2-octet type field.
const DUID_MAX_LEN: usize = 130;
const DUID_MIN_LEN: usize = 2;

#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum DhcpV6Duid {
    /// DUID Based on Link-Layer Address Plus Time
    LinkLayerAddressPlusTime(DhcpV6DuidLinkLayerAddrPlusTime),
    /// DUID Assigned by Vendor Based on Enterprise Number
    EnterpriseNumber(DhcpV6DuidEnterpriseNumber),
    /// DUID Based on Link-Layer Address
    LinkLayerAddress(DhcpV6DuidLinkLayerAddr),
    /// DUID Based on Universally Unique Identifier
    UUID(DhcpV6DuidUuid),
    /// Opaque byte array
    Raw(Vec<u8>),
}

impl Default for DhcpV6Duid {
    fn default() -> Self {
        Self::new_random()
    }
}

const DUID_TYPE_LLT: u16 = 1;
const DUID_TYPE_EN: u16 = 2;
const DUID_TYPE_LL: u16 = 3;
const DUID_TYPE_UUID: u16 = 4;

impl DhcpV6Duid {
    /// Random opaque DUID. Used for privacy mode where a client must not
    /// share the process-wide identity.
    pub fn new_random() -> Self {
        let mut rand_data = [0u8; 16];
        rand::fill(&mut rand_data);
        rand_data[0] = 0;
        rand_data[1] = 255;
        Self::Raw(rand_data.to_vec())
    }

    pub(crate) fn parse(
        buf: &mut Buffer,
        len: usize,
    ) -> Result<Self, DhcpError> {
        let raw = buf.take_bytes(len).context("Invalid DHCPv6 DUID")?;
        let mut duid = Buffer::new(raw);
        let id_type =
            duid.take_u16().context("Invalid DHCPv6 DUID type")?;
        // RFC 3315, 9. DHCP Unique Identifier (DUID)
        //   Clients and servers MUST treat DUIDs as opaque values and MUST
        //   only compare DUIDs for equality.
        //
        // Hence a malformed typed DUID is not a parse error, it falls back
        // to an opaque byte array.
        let parsed = match id_type {
            DUID_TYPE_LLT => DhcpV6DuidLinkLayerAddrPlusTime::parse(&mut duid)
                .map(Self::LinkLayerAddressPlusTime),
            DUID_TYPE_EN => DhcpV6DuidEnterpriseNumber::parse(&mut duid)
                .map(Self::EnterpriseNumber),
            DUID_TYPE_LL => DhcpV6DuidLinkLayerAddr::parse(&mut duid)
                .map(Self::LinkLayerAddress),
            DUID_TYPE_UUID => {
                DhcpV6DuidUuid::parse(&mut duid).map(Self::UUID)
            }
            _ => Ok(Self::Raw(raw.to_vec())),
        };
        Ok(parsed.unwrap_or_else(|_| Self::Raw(raw.to_vec())))
    }

    pub(crate) fn emit(&self, buf: &mut BufferMut) {
        match self {
            Self::LinkLayerAddressPlusTime(v) => v.emit(buf),
            Self::EnterpriseNumber(v) => v.emit(buf),
            Self::LinkLayerAddress(v) => v.emit(buf),
            Self::UUID(v) => v.emit(buf),
            Self::Raw(v) => buf.put_bytes(v.as_slice()),
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = BufferMut::new();
        self.emit(&mut buf);
        buf.data
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::Raw(Vec::new())
    }
}

/// Whether raw SERVERID bytes look like a DUID. The content is opaque per
/// RFC 3315, so this checks the length bounds and that the typed forms
/// decode.
pub(crate) fn is_valid_duid(raw: &[u8]) -> bool {
    if raw.len() < DUID_MIN_LEN || raw.len() > DUID_MAX_LEN {
        return false;
    }
    let mut buf = Buffer::new(raw);
    DhcpV6Duid::parse(&mut buf, raw.len()).is_ok()
}

// RFC 3315 9.2.  DUID Based on Link-Layer Address Plus Time (DUID-LLT)
// Indicate the base time is midnight (UTC), January 1, 2000
const BASE_TIME: Duration = Duration::new(946684800, 0);

// Type 1
#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub struct DhcpV6DuidLinkLayerAddrPlusTime {
    pub hardware_type: u16,
    pub time: u32,
    pub link_layer_address: Vec<u8>,
}

impl DhcpV6DuidLinkLayerAddrPlusTime {
    pub fn new(hardware_type: u16, link_layer_address: &[u8]) -> Self {
        let time: u32 = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .ok()
            .and_then(|s| s.checked_sub(BASE_TIME))
            .map(|t| t.as_secs())
            .map(|t| t as u32)
            .unwrap_or_default();

        Self {
            hardware_type,
            time,
            link_layer_address: link_layer_address.to_vec(),
        }
    }

    pub(crate) fn parse(buf: &mut Buffer) -> Result<Self, DhcpError> {
        Ok(Self {
            hardware_type: buf
                .take_u16()
                .context("Invalid DHCPv6 DUID LLT hardware type")?,
            time: buf.take_u32().context("Invalid DHCPv6 DUID LLT time")?,
            link_layer_address: buf
                .take_bytes(buf.len())
                .context("Invalid DHCPv6 DUID LLT link layer address")?
                .to_vec(),
        })
    }

    pub(crate) fn emit(&self, buf: &mut BufferMut) {
        buf.put_u16(DUID_TYPE_LLT);
        buf.put_u16(self.hardware_type);
        buf.put_u32(self.time);
        buf.put_bytes(self.link_layer_address.as_slice());
    }
}

// Type 2
#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub struct DhcpV6DuidEnterpriseNumber {
    pub enterprise_number: u32,
    pub identifier: Vec<u8>,
}

impl DhcpV6DuidEnterpriseNumber {
    pub fn new(enterprise_number: u32, identifier: &[u8]) -> Self {
        Self {
            enterprise_number,
            identifier: identifier.to_vec(),
        }
    }

    pub(crate) fn parse(buf: &mut Buffer) -> Result<Self, DhcpError> {
        Ok(Self {
            enterprise_number: buf
                .take_u32()
                .context("Invalid DHCPv6 DUID EN enterprise number")?,
            identifier: buf
                .take_bytes(buf.len())
                .context("Invalid DHCPv6 DUID EN identifier")?
                .to_vec(),
        })
    }

    pub(crate) fn emit(&self, buf: &mut BufferMut) {
        buf.put_u16(DUID_TYPE_EN);
        buf.put_u32(self.enterprise_number);
        buf.put_bytes(self.identifier.as_slice());
    }
}

// Type 3
#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub struct DhcpV6DuidLinkLayerAddr {
    pub hardware_type: u16,
    pub link_layer_address: Vec<u8>,
}

impl DhcpV6DuidLinkLayerAddr {
    pub fn new(hardware_type: u16, link_layer_address: &[u8]) -> Self {
        Self {
            hardware_type,
            link_layer_address: link_layer_address.to_vec(),
        }
    }

    pub(crate) fn parse(buf: &mut Buffer) -> Result<Self, DhcpError> {
        Ok(Self {
            hardware_type: buf
                .take_u16()
                .context("Invalid DHCPv6 DUID LL hardware type")?,
            link_layer_address: buf
                .take_bytes(buf.len())
                .context("Invalid DHCPv6 DUID LL link layer address")?
                .to_vec(),
        })
    }

    pub(crate) fn emit(&self, buf: &mut BufferMut) {
        buf.put_u16(DUID_TYPE_LL);
        buf.put_u16(self.hardware_type);
        buf.put_bytes(self.link_layer_address.as_slice());
    }
}

// Type 4
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub struct DhcpV6DuidUuid {
    pub uuid: u128,
}

impl DhcpV6DuidUuid {
    pub fn new(uuid: u128) -> Self {
        Self { uuid }
    }

    pub(crate) fn parse(buf: &mut Buffer) -> Result<Self, DhcpError> {
        if buf.len() != 16 {
            return Err(DhcpError::new(
                ErrorKind::InvalidDhcpMessage,
                format!(
                    "Invalid DHCPv6 DUID UUID, expecting 16 bytes, got {}",
                    buf.len()
                ),
            ));
        }
        Ok(Self {
            uuid: buf.take_u128().context("Invalid DHCPv6 DUID UUID")?,
        })
    }

    pub(crate) fn emit(&self, buf: &mut BufferMut) {
        buf.put_u16(DUID_TYPE_UUID);
        buf.put_u128(self.uuid);
    }
}

/// Algorithm selector for the process-wide DUID.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[non_exhaustive]
pub enum DhcpV6DuidType {
    #[default]
    LinkLayerAddressPlusTime,
    LinkLayerAddress,
    Uuid,
    Random,
}

static PROCESS_DUID: Mutex<Option<DhcpV6Duid>> = Mutex::new(None);

// https://www.iana.org/assignments/arp-parameters/arp-parameters.xhtml
const ARP_HW_TYPE_ETHERNET: u16 = 1;

/// The process-wide DUID shared by every non-privacy client. Established
/// with `duid_type` on first use; later callers get the stored value no
/// matter which type they pass.
pub(crate) fn process_duid(
    duid_type: DhcpV6DuidType,
    mac: Option<&[u8]>,
) -> DhcpV6Duid {
    let mut store = match PROCESS_DUID.lock() {
        Ok(s) => s,
        Err(e) => {
            log::error!("BUG: process_duid() lock poisoned: {e}");
            return DhcpV6Duid::new_random();
        }
    };
    if let Some(duid) = store.as_ref() {
        return duid.clone();
    }
    let duid = match (duid_type, mac) {
        (DhcpV6DuidType::LinkLayerAddressPlusTime, Some(mac)) => {
            DhcpV6Duid::LinkLayerAddressPlusTime(
                DhcpV6DuidLinkLayerAddrPlusTime::new(
                    ARP_HW_TYPE_ETHERNET,
                    mac,
                ),
            )
        }
        (DhcpV6DuidType::LinkLayerAddress, Some(mac)) => {
            DhcpV6Duid::LinkLayerAddress(DhcpV6DuidLinkLayerAddr::new(
                ARP_HW_TYPE_ETHERNET,
                mac,
            ))
        }
        (DhcpV6DuidType::Uuid, _) => {
            DhcpV6Duid::UUID(DhcpV6DuidUuid::new(rand::random()))
        }
        _ => DhcpV6Duid::new_random(),
    };
    log::info!("Established process-wide DUID {duid:?}");
    *store = Some(duid.clone());
    duid
}

/// Stable 32-bit IAID derived from the interface name, FNV-1a folded.
/// Privacy-mode clients use IAID 0 instead.
pub(crate) fn iaid_from_iface_name(iface_name: &str) -> u32 {
    const FNV_OFFSET: u32 = 0x811c9dc5;
    const FNV_PRIME: u32 = 0x01000193;
    let mut hash = FNV_OFFSET;
    for byte in iface_name.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn duid_llt_round_trip() -> Result<(), DhcpError> {
        // Type 1, ethernet, time 0x30a1b2c3, MAC 6a:..:05
        let raw = &[
            0x00, 0x01, 0x00, 0x01, 0x30, 0xa1, 0xb2, 0xc3, 0x6a, 0x0b,
            0x27, 0x81, 0xee, 0x05,
        ];
        let mut buf = Buffer::new(raw);
        let duid = DhcpV6Duid::parse(&mut buf, raw.len())?;
        assert_eq!(
            duid,
            DhcpV6Duid::LinkLayerAddressPlusTime(
                DhcpV6DuidLinkLayerAddrPlusTime {
                    hardware_type: 1,
                    time: 0x30a1b2c3,
                    link_layer_address: vec![
                        0x6a, 0x0b, 0x27, 0x81, 0xee, 0x05
                    ],
                }
            )
        );
        assert_eq!(duid.to_vec().as_slice(), raw);
        Ok(())
    }

    #[test]
    fn unknown_duid_type_is_opaque() -> Result<(), DhcpError> {
        let raw = &[0x00, 0xff, 0xde, 0xad, 0xbe, 0xef];
        let mut buf = Buffer::new(raw);
        let duid = DhcpV6Duid::parse(&mut buf, raw.len())?;
        assert_eq!(duid, DhcpV6Duid::Raw(raw.to_vec()));
        Ok(())
    }

    #[test]
    fn malformed_uuid_duid_is_opaque() -> Result<(), DhcpError> {
        // Type 4 but only 4 bytes of UUID payload.
        let raw = &[0x00, 0x04, 0x01, 0x02, 0x03, 0x04];
        let mut buf = Buffer::new(raw);
        let duid = DhcpV6Duid::parse(&mut buf, raw.len())?;
        assert_eq!(duid, DhcpV6Duid::Raw(raw.to_vec()));
        Ok(())
    }

    #[test]
    fn iaid_is_stable_and_name_scoped() {
        assert_eq!(
            iaid_from_iface_name("eth0"),
            iaid_from_iface_name("eth0")
        );
        assert_ne!(
            iaid_from_iface_name("eth0"),
            iaid_from_iface_name("eth1")
        );
    }

    #[test]
    fn private_duids_differ() {
        assert_ne!(DhcpV6Duid::new_random(), DhcpV6Duid::new_random());
    }

    #[test]
    fn serverid_length_bounds() {
        assert!(!is_valid_duid(&[0x00]));
        assert!(is_valid_duid(&[0x00, 0x03]));
        assert!(is_valid_duid(&[0x00, 0x03, 0x00, 0x01, 0xaa, 0xbb]));
        assert!(!is_valid_duid(&[0u8; 131]));
    }
}
