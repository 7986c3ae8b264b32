// SPDX-License-Identifier: Apache-2.0

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::Ipv6Addr;
use std::os::fd::AsFd;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;
use std::str::FromStr;

use nix::sys::eventfd::EventFd;

use crate::{
    msg::{DhcpV6Message, DhcpV6MessageType},
    socket::DhcpV6Socket,
    DhcpError, DhcpV6AddrPlumb, DhcpV6Client, DhcpV6Config, DhcpV6Lease,
    DhcpV6Mode, DhcpV6Option, DhcpV6OptionIaAddr, DhcpV6OptionIaNa,
    DhcpV6OptionList, DhcpV6OptionStatus, DhcpV6OptionStatusCode,
};

pub(crate) const TEST_IFACE: &str = "dhcp6test0";
pub(crate) const TEST_IFACE_INDEX: u32 = 101;

pub(crate) const SERVER_DUID: [u8; 10] =
    [0x00, 0x03, 0x00, 0x01, 0xd2, 0x35, 0x4e, 0x9c, 0x3a, 0x01];

pub(crate) fn test_addr() -> Ipv6Addr {
    Ipv6Addr::from_str("2001:db8::1").unwrap()
}

pub(crate) fn other_addr() -> Ipv6Addr {
    Ipv6Addr::from_str("2001:db8::2").unwrap()
}

#[derive(Debug, Default)]
pub(crate) struct MockWire {
    pub(crate) sent: Vec<Vec<u8>>,
    pub(crate) inbox: VecDeque<Vec<u8>>,
}

/// Queue backed transport: transmits land in `sent`, injected datagrams
/// are drained from `inbox`. The eventfd only exists so the event pool has
/// a real fd to register.
#[derive(Debug)]
pub(crate) struct MockSocket {
    wire: Rc<RefCell<MockWire>>,
    event_fd: EventFd,
}

impl MockSocket {
    fn new(wire: Rc<RefCell<MockWire>>) -> Self {
        Self {
            wire,
            event_fd: EventFd::new().unwrap(),
        }
    }
}

impl DhcpV6Socket for MockSocket {
    fn fd(&self) -> RawFd {
        self.event_fd.as_fd().as_raw_fd()
    }

    fn send_multicast(&mut self, packet: &[u8]) -> Result<(), DhcpError> {
        self.wire.borrow_mut().sent.push(packet.to_vec());
        Ok(())
    }

    fn recv(&mut self) -> Result<Option<Vec<u8>>, DhcpError> {
        Ok(self.wire.borrow_mut().inbox.pop_front())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) enum PlumbOp {
    Add {
        addr: Ipv6Addr,
        prefix_len: u8,
        valid_sec: u32,
        preferred_sec: u32,
    },
    Remove {
        addr: Ipv6Addr,
    },
}

#[derive(Debug)]
pub(crate) struct MockPlumb {
    ops: Rc<RefCell<Vec<PlumbOp>>>,
}

impl DhcpV6AddrPlumb for MockPlumb {
    fn add(
        &mut self,
        _iface_name: &str,
        addr: &Ipv6Addr,
        prefix_len: u8,
        valid_sec: u32,
        preferred_sec: u32,
    ) -> Result<(), DhcpError> {
        self.ops.borrow_mut().push(PlumbOp::Add {
            addr: *addr,
            prefix_len,
            valid_sec,
            preferred_sec,
        });
        Ok(())
    }

    fn remove(
        &mut self,
        _iface_name: &str,
        addr: &Ipv6Addr,
    ) -> Result<(), DhcpError> {
        self.ops
            .borrow_mut()
            .push(PlumbOp::Remove { addr: *addr });
        Ok(())
    }
}

pub(crate) struct TestEnv {
    pub(crate) wire: Rc<RefCell<MockWire>>,
    pub(crate) plumb_ops: Rc<RefCell<Vec<PlumbOp>>>,
}

impl TestEnv {
    pub(crate) fn inject(&self, packet: Vec<u8>) {
        self.wire.borrow_mut().inbox.push_back(packet);
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.wire.borrow().sent.clone()
    }

    pub(crate) fn last_sent(&self) -> DhcpV6Message {
        let wire = self.wire.borrow();
        DhcpV6Message::parse(wire.sent.last().expect("nothing transmitted"))
            .expect("transmitted garbage")
    }

    pub(crate) fn plumb_ops(&self) -> Vec<PlumbOp> {
        self.plumb_ops.borrow().clone()
    }
}

pub(crate) fn new_test_client(
    mode: DhcpV6Mode,
    lease: Option<DhcpV6Lease>,
) -> (DhcpV6Client, TestEnv) {
    let mut config = DhcpV6Config::new(TEST_IFACE, mode);
    config
        .set_iface_index(TEST_IFACE_INDEX)
        .set_link_local_ip(Ipv6Addr::from_str("fe80::1").unwrap());
    let wire = Rc::new(RefCell::new(MockWire::default()));
    let plumb_ops = Rc::new(RefCell::new(Vec::new()));
    let client = DhcpV6Client::init_with(
        config,
        lease,
        Some(Box::new(MockSocket::new(wire.clone()))),
        Box::new(MockPlumb {
            ops: plumb_ops.clone(),
        }),
    )
    .unwrap();
    (client, TestEnv { wire, plumb_ops })
}

/// Server message skeleton passing the acceptance filter of `client`.
pub(crate) fn server_msg(
    client: &DhcpV6Client,
    msg_type: DhcpV6MessageType,
) -> DhcpV6Message {
    let mut options = DhcpV6OptionList::new();
    options.insert(DhcpV6Option::ClientId(client.duid.to_vec()));
    options.insert(DhcpV6Option::ServerId(SERVER_DUID.to_vec()));
    DhcpV6Message {
        msg_type,
        xid: client.xid,
        options,
    }
}

pub(crate) fn test_ia_na(
    iaid: u32,
    t1_sec: u32,
    t2_sec: u32,
    addr: Ipv6Addr,
    preferred_sec: u32,
    valid_sec: u32,
) -> DhcpV6OptionIaNa {
    DhcpV6OptionIaNa {
        iaid,
        t1_sec,
        t2_sec,
        addresses: vec![DhcpV6OptionIaAddr::new(
            addr,
            preferred_sec,
            valid_sec,
        )],
        status: None,
    }
}

pub(crate) fn ia_na_with_status(
    iaid: u32,
    status: DhcpV6OptionStatusCode,
) -> DhcpV6OptionIaNa {
    DhcpV6OptionIaNa {
        iaid,
        t1_sec: 0,
        t2_sec: 0,
        addresses: Vec::new(),
        status: Some(DhcpV6OptionStatus {
            status,
            message: String::new(),
        }),
    }
}

/// Drive the happy path to Bound with a DAD-clean address. Returns the
/// Solicit and Request transaction ids.
pub(crate) fn acquire_lease(
    client: &mut DhcpV6Client,
    env: &TestEnv,
    t1_sec: u32,
    t2_sec: u32,
    preferred_sec: u32,
    valid_sec: u32,
) -> (u32, u32) {
    use crate::{DhcpV6AddrFlags, DhcpV6Event, DhcpV6State};

    assert_eq!(client.state(), DhcpV6State::Solicit);
    let solicit_xid = client.xid;
    // Initial SOL_MAX_DELAY timer fires, first SOLICIT goes out.
    client.process(DhcpV6Event::TransmitWait).unwrap();

    let mut advertise = server_msg(client, DhcpV6MessageType::Advertise);
    advertise.options.insert(DhcpV6Option::IANA(test_ia_na(
        client.iaid,
        t1_sec,
        t2_sec,
        test_addr(),
        preferred_sec,
        valid_sec,
    )));
    env.inject(advertise.emit().unwrap());
    client.process(DhcpV6Event::UdpPackageIn).unwrap();
    assert_eq!(client.state(), DhcpV6State::Solicit);

    // Next retransmit timeout finds the saved Advertise and moves on.
    client.process(DhcpV6Event::TransmitWait).unwrap();
    assert_eq!(client.state(), DhcpV6State::Request);
    let request_xid = client.xid;
    client.process(DhcpV6Event::TransmitWait).unwrap();

    let mut reply = server_msg(client, DhcpV6MessageType::Reply);
    reply.options.insert(DhcpV6Option::IANA(test_ia_na(
        client.iaid,
        t1_sec,
        t2_sec,
        test_addr(),
        preferred_sec,
        valid_sec,
    )));
    env.inject(reply.emit().unwrap());
    client.process(DhcpV6Event::UdpPackageIn).unwrap();
    assert_eq!(client.state(), DhcpV6State::Bound);

    // Kernel DAD finished cleanly.
    client
        .process_addr_change(&test_addr(), DhcpV6AddrFlags::default())
        .unwrap();

    (solicit_xid, request_xid)
}
