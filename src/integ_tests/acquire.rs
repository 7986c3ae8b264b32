// SPDX-License-Identifier: Apache-2.0

use super::mock::{
    ia_na_with_status, new_test_client, other_addr, server_msg, test_addr,
    test_ia_na, TestEnv,
};
use super::mock::PlumbOp;
use crate::{
    msg::DhcpV6MessageType, DhcpV6AddrFlags, DhcpV6Event, DhcpV6Mode,
    DhcpV6Notification, DhcpV6Option, DhcpV6OptionCode,
    DhcpV6OptionStatusCode, DhcpV6State,
};

#[test]
fn stateful_acquire_happy_path() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    assert_eq!(cli.state(), DhcpV6State::Solicit);
    let solicit_xid = cli.xid;

    cli.process(DhcpV6Event::TransmitWait).unwrap();
    let solicit = env.last_sent();
    assert_eq!(solicit.msg_type, DhcpV6MessageType::Solicit);
    assert_eq!(solicit.xid, solicit_xid);
    assert_eq!(
        solicit.options.get(DhcpV6OptionCode::ClientId),
        Some(&DhcpV6Option::ClientId(cli.duid.to_vec()))
    );
    assert_eq!(
        solicit.options.get(DhcpV6OptionCode::ElapsedTime),
        Some(&DhcpV6Option::ElapsedTime(0))
    );
    assert!(solicit
        .options
        .get(DhcpV6OptionCode::OptionRequestOption)
        .is_some());
    // SOLICIT identifies no server and asks with an empty IA_NA.
    assert!(solicit.options.get(DhcpV6OptionCode::ServerId).is_none());
    match solicit.options.get(DhcpV6OptionCode::IANA) {
        Some(DhcpV6Option::IANA(ia_na)) => {
            assert_eq!(ia_na.iaid, cli.iaid);
            assert_eq!(ia_na.t1_sec, 0);
            assert_eq!(ia_na.t2_sec, 0);
            assert!(ia_na.addresses.is_empty());
        }
        v => panic!("Expecting OPTION_IA_NA in SOLICIT, got {v:?}"),
    }

    let mut advertise = server_msg(&cli, DhcpV6MessageType::Advertise);
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

    cli.process(DhcpV6Event::TransmitWait).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Request);
    let request_xid = cli.xid;
    assert_ne!(request_xid, solicit_xid);

    cli.process(DhcpV6Event::TransmitWait).unwrap();
    let request = env.last_sent();
    assert_eq!(request.msg_type, DhcpV6MessageType::Request);
    assert_eq!(request.xid, request_xid);
    assert!(request.options.get(DhcpV6OptionCode::ServerId).is_some());
    match request.options.get(DhcpV6OptionCode::IANA) {
        Some(DhcpV6Option::IANA(ia_na)) => {
            assert_eq!(
                ia_na.addresses.first().map(|a| a.address),
                Some(test_addr())
            );
            // The server supplies real lifetimes in its Reply.
            assert_eq!(ia_na.addresses[0].valid_time_sec, 0);
            assert_eq!(ia_na.addresses[0].preferred_time_sec, 0);
        }
        v => panic!("Expecting OPTION_IA_NA in REQUEST, got {v:?}"),
    }

    let mut reply = server_msg(&cli, DhcpV6MessageType::Reply);
    reply.options.insert(DhcpV6Option::IANA(test_ia_na(
        cli.iaid,
        100,
        160,
        test_addr(),
        200,
        300,
    )));
    env.inject(reply.emit().unwrap());
    let notification = cli.process(DhcpV6Event::UdpPackageIn).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Bound);
    // No notification until the DAD verdict comes back.
    assert_eq!(notification, None);
    match env.plumb_ops().as_slice() {
        [PlumbOp::Add {
            addr,
            prefix_len,
            valid_sec,
            preferred_sec,
        }] => {
            assert_eq!(*addr, test_addr());
            assert_eq!(*prefix_len, 128);
            // Remaining lifetimes, the clock may have ticked once.
            assert!((299..=300).contains(valid_sec), "{valid_sec}");
            assert!((199..=200).contains(preferred_sec), "{preferred_sec}");
        }
        ops => panic!("Expecting a single address add, got {ops:?}"),
    }
    assert!(cli.get_info().is_some());

    let notification = cli
        .process_addr_change(&test_addr(), DhcpV6AddrFlags::default())
        .unwrap();
    assert_eq!(
        notification,
        Some(DhcpV6Notification::StatusChanged(DhcpV6State::Bound))
    );
    // Renew timer armed for roughly T1.
    let delay = cli.next_renew_sec.unwrap()
        - crate::time::boot_time_sec();
    assert!((98..=102).contains(&delay), "renew delay {delay}");
}

#[test]
fn tentative_addr_keeps_waiting() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_solicit_request(&mut cli, &env);
    let notification = cli
        .process_addr_change(
            &test_addr(),
            DhcpV6AddrFlags {
                tentative: true,
                duplicated: false,
            },
        )
        .unwrap();
    assert_eq!(notification, None);
    assert_eq!(cli.state(), DhcpV6State::Bound);
    assert!(cli.next_renew_sec.is_none());
}

fn acquire_solicit_request(
    cli: &mut crate::DhcpV6Client,
    env: &TestEnv,
) {
    cli.process(DhcpV6Event::TransmitWait).unwrap();
    let mut advertise = server_msg(cli, DhcpV6MessageType::Advertise);
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
    cli.process(DhcpV6Event::TransmitWait).unwrap();
    cli.process(DhcpV6Event::TransmitWait).unwrap();
    let mut reply = server_msg(cli, DhcpV6MessageType::Reply);
    reply.options.insert(DhcpV6Option::IANA(test_ia_na(
        cli.iaid,
        100,
        160,
        test_addr(),
        200,
        300,
    )));
    env.inject(reply.emit().unwrap());
    cli.process(DhcpV6Event::UdpPackageIn).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Bound);
}

#[test]
fn max_preference_preempts_wait() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    cli.process(DhcpV6Event::TransmitWait).unwrap();

    let mut first = server_msg(&cli, DhcpV6MessageType::Advertise);
    first.options.insert(DhcpV6Option::IANA(test_ia_na(
        cli.iaid,
        100,
        160,
        test_addr(),
        200,
        300,
    )));
    env.inject(first.emit().unwrap());
    cli.process(DhcpV6Event::UdpPackageIn).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Solicit);

    let mut second = server_msg(&cli, DhcpV6MessageType::Advertise);
    second.options.insert(DhcpV6Option::Preference(255));
    second.options.insert(DhcpV6Option::IANA(test_ia_na(
        cli.iaid,
        100,
        160,
        other_addr(),
        200,
        300,
    )));
    env.inject(second.emit().unwrap());
    cli.process(DhcpV6Event::UdpPackageIn).unwrap();
    // Preference 255 terminates the Solicit wait immediately.
    assert_eq!(cli.state(), DhcpV6State::Request);

    cli.process(DhcpV6Event::TransmitWait).unwrap();
    let request = env.last_sent();
    match request.options.get(DhcpV6OptionCode::IANA) {
        Some(DhcpV6Option::IANA(ia_na)) => {
            assert_eq!(
                ia_na.addresses.first().map(|a| a.address),
                Some(other_addr())
            );
        }
        v => panic!("Expecting OPTION_IA_NA in REQUEST, got {v:?}"),
    }
}

#[test]
fn advertise_selection_keeps_best_preference() {
    for (first_pref, second_pref, expect_first) in
        [(1u8, 9u8, false), (9, 1, true)]
    {
        let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
        cli.process(DhcpV6Event::TransmitWait).unwrap();

        let mut first = server_msg(&cli, DhcpV6MessageType::Advertise);
        first.options.insert(DhcpV6Option::Preference(first_pref));
        first.options.insert(DhcpV6Option::IANA(test_ia_na(
            cli.iaid,
            100,
            160,
            test_addr(),
            200,
            300,
        )));
        let mut second = server_msg(&cli, DhcpV6MessageType::Advertise);
        second.options.insert(DhcpV6Option::Preference(second_pref));
        second.options.insert(DhcpV6Option::IANA(test_ia_na(
            cli.iaid,
            100,
            160,
            other_addr(),
            200,
            300,
        )));
        env.inject(first.emit().unwrap());
        env.inject(second.emit().unwrap());
        cli.process(DhcpV6Event::UdpPackageIn).unwrap();

        let saved = cli.lease.as_ref().unwrap();
        assert_eq!(saved.preference, std::cmp::max(first_pref, second_pref));
        let expected_addr = if expect_first {
            test_addr()
        } else {
            other_addr()
        };
        assert_eq!(saved.addr, expected_addr);
    }
}

#[test]
fn advertise_no_addrs_avail_is_ignored() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    cli.process(DhcpV6Event::TransmitWait).unwrap();

    let mut advertise = server_msg(&cli, DhcpV6MessageType::Advertise);
    advertise.options.insert(DhcpV6Option::StatusCode(
        crate::DhcpV6OptionStatus {
            status: DhcpV6OptionStatusCode::NoAddrsAvail,
            message: "out of addresses".to_string(),
        },
    ));
    env.inject(advertise.emit().unwrap());
    cli.process(DhcpV6Event::UdpPackageIn).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Solicit);
    assert!(cli.lease.is_none());
}

#[test]
fn not_on_link_rolls_back_to_solicit() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    cli.process(DhcpV6Event::TransmitWait).unwrap();
    let mut advertise = server_msg(&cli, DhcpV6MessageType::Advertise);
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
    cli.process(DhcpV6Event::TransmitWait).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Request);
    let request_xid = cli.xid;
    cli.process(DhcpV6Event::TransmitWait).unwrap();

    let mut reply = server_msg(&cli, DhcpV6MessageType::Reply);
    reply.options.insert(DhcpV6Option::IANA(ia_na_with_status(
        cli.iaid,
        DhcpV6OptionStatusCode::NotOnLink,
    )));
    env.inject(reply.emit().unwrap());
    cli.process(DhcpV6Event::UdpPackageIn).unwrap();

    assert_eq!(cli.state(), DhcpV6State::Solicit);
    assert_ne!(cli.xid, request_xid);
    // No address was ever plumbed.
    assert_eq!(env.plumb_ops(), Vec::new());
}

#[test]
fn request_exhaustion_falls_back_to_solicit() {
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

    // REQ_MAX_RC transmits without any Reply, then rollback.
    for _ in 0..10 {
        cli.process(DhcpV6Event::TransmitWait).unwrap();
        assert_eq!(cli.state(), DhcpV6State::Request);
    }
    cli.process(DhcpV6Event::TransmitWait).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Solicit);
    let requests = env
        .sent()
        .iter()
        .filter(|raw| {
            crate::msg::DhcpV6Message::parse(raw)
                .map(|m| m.msg_type == DhcpV6MessageType::Request)
                .unwrap_or(false)
        })
        .count();
    assert_eq!(requests, 10);
}

#[test]
fn solicit_reentry_draws_new_xid() {
    let (mut cli, _env) = new_test_client(DhcpV6Mode::Stateful, None);
    let first_xid = cli.xid;
    cli.process_link_up(None).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Solicit);
    assert_ne!(cli.xid, first_xid);
}

#[test]
fn solicit_retry_emits_symptom() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    let mut symptom = None;
    // Initial delay plus five fruitless retransmits, the sixth transmit
    // raises the symptom.
    for _ in 0..6 {
        if let Some(n) = cli.process(DhcpV6Event::TransmitWait).unwrap() {
            symptom = Some(n);
        }
    }
    assert_eq!(
        symptom,
        Some(DhcpV6Notification::GenerateSymptom { try_count: 6 })
    );
    assert_eq!(env.sent().len(), 6);
}
