// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv6Addr;
use std::str::FromStr;

use super::mock::{new_test_client, server_msg};
use crate::{
    msg::DhcpV6MessageType, DhcpV6Event, DhcpV6Mode, DhcpV6Notification,
    DhcpV6Option, DhcpV6OptionCode, DhcpV6State,
};

#[test]
fn stateless_information_request() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateless, None);
    assert_eq!(cli.state(), DhcpV6State::Inform);

    cli.process(DhcpV6Event::TransmitWait).unwrap();
    let inform = env.last_sent();
    assert_eq!(inform.msg_type, DhcpV6MessageType::InformationRequest);
    // Stateless never asks for an address nor names a server.
    assert!(inform.options.get(DhcpV6OptionCode::IANA).is_none());
    assert!(inform.options.get(DhcpV6OptionCode::ServerId).is_none());
    assert!(inform
        .options
        .get(DhcpV6OptionCode::OptionRequestOption)
        .is_some());

    let dns = Ipv6Addr::from_str("2001:db8::53").unwrap();
    let mut reply = server_msg(&cli, DhcpV6MessageType::Reply);
    reply
        .options
        .insert(DhcpV6Option::DnsServers(vec![dns]));
    env.inject(reply.emit().unwrap());
    let notification = cli.process(DhcpV6Event::UdpPackageIn).unwrap();

    assert_eq!(cli.state(), DhcpV6State::InformComplete);
    assert_eq!(
        notification,
        Some(DhcpV6Notification::StatusChanged(
            DhcpV6State::InformComplete
        ))
    );
    let (_, options) = cli.get_info().unwrap();
    assert_eq!(
        options.get(DhcpV6OptionCode::DnsServers),
        Some(&DhcpV6Option::DnsServers(vec![dns]))
    );
    // No address business in stateless mode.
    assert_eq!(env.plumb_ops(), Vec::new());
}

#[test]
fn inform_complete_ignores_duplicates() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateless, None);
    cli.process(DhcpV6Event::TransmitWait).unwrap();
    let reply = server_msg(&cli, DhcpV6MessageType::Reply);
    env.inject(reply.emit().unwrap());
    cli.process(DhcpV6Event::UdpPackageIn).unwrap();
    assert_eq!(cli.state(), DhcpV6State::InformComplete);

    // A duplicate of the same Reply is filtered in the terminal state.
    let duplicate = server_msg(&cli, DhcpV6MessageType::Reply);
    env.inject(duplicate.emit().unwrap());
    let notification = cli.process(DhcpV6Event::UdpPackageIn).unwrap();
    assert_eq!(notification, None);
    assert_eq!(cli.state(), DhcpV6State::InformComplete);
}

#[test]
fn inform_keeps_waiting_on_foreign_reply() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateless, None);
    cli.process(DhcpV6Event::TransmitWait).unwrap();

    let mut reply = server_msg(&cli, DhcpV6MessageType::Reply);
    reply.xid = cli.xid ^ 0xffff;
    env.inject(reply.emit().unwrap());
    let notification = cli.process(DhcpV6Event::UdpPackageIn).unwrap();
    assert_eq!(notification, None);
    assert_eq!(cli.state(), DhcpV6State::Inform);
    assert!(cli.get_info().is_none());
}
