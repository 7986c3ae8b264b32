// SPDX-License-Identifier: Apache-2.0

use super::mock::{
    new_test_client, server_msg, test_addr, test_ia_na, TestEnv,
};
use crate::{
    msg::DhcpV6MessageType, DhcpV6Client, DhcpV6Event, DhcpV6Mode,
    DhcpV6Option, DhcpV6OptionList, DhcpV6State,
};

fn client_in_request_state() -> (DhcpV6Client, TestEnv) {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    cli.process(DhcpV6Event::TransmitWait).unwrap();
    let mut advertise = server_msg(&cli, DhcpV6MessageType::Advertise);
    advertise.options.insert(DhcpV6Option::Preference(255));
    advertise.options.insert(DhcpV6Option::IANA(test_ia_na(
        cli.iaid,
        100,
        160,
        test_addr(),
        200,
        300,
    )));
    env.inject(advertise.emit().unwrap());
    cli.process(DhcpV6Event::UdpPackageIn).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Request);
    (cli, env)
}

fn assert_unchanged(cli: &mut DhcpV6Client, env: &TestEnv, raw: Vec<u8>) {
    let state = cli.state();
    let xid = cli.xid;
    let saved_addr = cli.lease.as_ref().map(|l| l.addr);
    let sent_count = env.sent().len();

    env.inject(raw);
    let notification = cli.process(DhcpV6Event::UdpPackageIn).unwrap();

    assert_eq!(notification, None);
    assert_eq!(cli.state(), state);
    assert_eq!(cli.xid, xid);
    assert_eq!(cli.lease.as_ref().map(|l| l.addr), saved_addr);
    assert_eq!(env.sent().len(), sent_count);
}

#[test]
fn wrong_xid_is_dropped() {
    let (mut cli, env) = client_in_request_state();
    let mut reply = server_msg(&cli, DhcpV6MessageType::Reply);
    reply.xid = cli.xid ^ 1;
    reply.options.insert(DhcpV6Option::IANA(test_ia_na(
        cli.iaid,
        100,
        160,
        test_addr(),
        200,
        300,
    )));
    assert_unchanged(&mut cli, &env, reply.emit().unwrap());
}

#[test]
fn wrong_msg_type_is_dropped() {
    let (mut cli, env) = client_in_request_state();
    // Request expects Reply, not another Advertise.
    let mut advertise = server_msg(&cli, DhcpV6MessageType::Advertise);
    advertise.options.insert(DhcpV6Option::IANA(test_ia_na(
        cli.iaid,
        100,
        160,
        test_addr(),
        200,
        300,
    )));
    assert_unchanged(&mut cli, &env, advertise.emit().unwrap());
}

#[test]
fn wrong_client_id_is_dropped() {
    let (mut cli, env) = client_in_request_state();
    let mut reply = server_msg(&cli, DhcpV6MessageType::Reply);
    let mut options = DhcpV6OptionList::new();
    for opt in reply.options.iter() {
        match opt {
            DhcpV6Option::ClientId(_) => options.insert(
                DhcpV6Option::ClientId(vec![0x00, 0x01, 0xde, 0xad]),
            ),
            o => options.insert(o.clone()),
        }
    }
    reply.options = options;
    reply.options.insert(DhcpV6Option::IANA(test_ia_na(
        cli.iaid,
        100,
        160,
        test_addr(),
        200,
        300,
    )));
    assert_unchanged(&mut cli, &env, reply.emit().unwrap());
}

#[test]
fn missing_server_id_is_dropped() {
    let (mut cli, env) = client_in_request_state();
    let mut options = DhcpV6OptionList::new();
    options.insert(DhcpV6Option::ClientId(cli.duid.to_vec()));
    options.insert(DhcpV6Option::IANA(test_ia_na(
        cli.iaid,
        100,
        160,
        test_addr(),
        200,
        300,
    )));
    let reply = crate::msg::DhcpV6Message {
        msg_type: DhcpV6MessageType::Reply,
        xid: cli.xid,
        options,
    };
    assert_unchanged(&mut cli, &env, reply.emit().unwrap());
}

#[test]
fn malformed_server_id_is_dropped() {
    let (mut cli, env) = client_in_request_state();
    let mut options = DhcpV6OptionList::new();
    options.insert(DhcpV6Option::ClientId(cli.duid.to_vec()));
    // A single byte cannot even hold the DUID type field.
    options.insert(DhcpV6Option::ServerId(vec![0x03]));
    options.insert(DhcpV6Option::IANA(test_ia_na(
        cli.iaid,
        100,
        160,
        test_addr(),
        200,
        300,
    )));
    let reply = crate::msg::DhcpV6Message {
        msg_type: DhcpV6MessageType::Reply,
        xid: cli.xid,
        options,
    };
    assert_unchanged(&mut cli, &env, reply.emit().unwrap());
}

#[test]
fn undecodable_datagram_is_dropped() {
    let (mut cli, env) = client_in_request_state();
    assert_unchanged(&mut cli, &env, vec![0x07, 0x00]);
}

#[test]
fn reply_in_bound_state_is_dropped() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    super::mock::acquire_lease(&mut cli, &env, 100, 160, 200, 300);
    assert_eq!(cli.state(), DhcpV6State::Bound);
    let mut reply = server_msg(&cli, DhcpV6MessageType::Reply);
    reply.options.insert(DhcpV6Option::IANA(test_ia_na(
        cli.iaid,
        100,
        160,
        test_addr(),
        200,
        300,
    )));
    assert_unchanged(&mut cli, &env, reply.emit().unwrap());
}
