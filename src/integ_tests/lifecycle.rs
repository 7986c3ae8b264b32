// SPDX-License-Identifier: Apache-2.0

use super::mock::{
    acquire_lease, new_test_client, server_msg, test_addr, test_ia_na,
    PlumbOp,
};
use crate::{
    msg::DhcpV6MessageType, time::boot_time_sec, DhcpV6AddrFlags,
    DhcpV6Event, DhcpV6Lease, DhcpV6Mode, DhcpV6Notification, DhcpV6Option,
    DhcpV6OptionCode, DhcpV6State, DHCPV6_INFINITE_LIFETIME,
};

#[test]
fn duplicated_addr_declines_then_solicits() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    let (_, request_xid) = acquire_lease(&mut cli, &env, 100, 160, 200, 300);

    cli.process_addr_change(
        &test_addr(),
        DhcpV6AddrFlags {
            tentative: false,
            duplicated: true,
        },
    )
    .unwrap();
    assert_eq!(cli.state(), DhcpV6State::Decline);
    assert!(env
        .plumb_ops()
        .contains(&PlumbOp::Remove { addr: test_addr() }));

    // DEC_MAX_RC transmits of DECLINE, then Solicit regardless.
    for _ in 0..5 {
        cli.process(DhcpV6Event::TransmitWait).unwrap();
        assert_eq!(cli.state(), DhcpV6State::Decline);
        let decline = env.last_sent();
        assert_eq!(decline.msg_type, DhcpV6MessageType::Decline);
        assert!(decline.options.get(DhcpV6OptionCode::ServerId).is_some());
        match decline.options.get(DhcpV6OptionCode::IANA) {
            Some(DhcpV6Option::IANA(ia_na)) => {
                assert_eq!(
                    ia_na.addresses.first().map(|a| a.address),
                    Some(test_addr())
                );
            }
            v => panic!("Expecting OPTION_IA_NA in DECLINE, got {v:?}"),
        }
    }
    cli.process(DhcpV6Event::TransmitWait).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Solicit);
    assert_ne!(cli.xid, request_xid);
    assert!(cli.get_info().is_none());
}

#[test]
fn decline_stops_on_server_reply() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_lease(&mut cli, &env, 100, 160, 200, 300);
    cli.process_addr_change(
        &test_addr(),
        DhcpV6AddrFlags {
            tentative: false,
            duplicated: true,
        },
    )
    .unwrap();
    cli.process(DhcpV6Event::TransmitWait).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Decline);

    let reply = server_msg(&cli, DhcpV6MessageType::Reply);
    env.inject(reply.emit().unwrap());
    cli.process(DhcpV6Event::UdpPackageIn).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Solicit);
}

#[test]
fn bssid_roam_confirms_without_replumb() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_lease(&mut cli, &env, 100, 160, 200, 300);
    let plumb_ops_before = env.plumb_ops().len();

    cli.process_wake(true, None).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Confirm);
    // Unverified until the server answers.
    assert!(cli.get_info().is_none());

    cli.process(DhcpV6Event::TransmitWait).unwrap();
    let confirm = env.last_sent();
    assert_eq!(confirm.msg_type, DhcpV6MessageType::Confirm);
    assert!(confirm.options.get(DhcpV6OptionCode::ServerId).is_none());

    let reply = server_msg(&cli, DhcpV6MessageType::Reply);
    env.inject(reply.emit().unwrap());
    let notification = cli.process(DhcpV6Event::UdpPackageIn).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Bound);
    assert_eq!(
        notification,
        Some(DhcpV6Notification::StatusChanged(DhcpV6State::Bound))
    );
    assert!(cli.get_info().is_some());
    // Same address stayed plumbed the whole time.
    assert_eq!(env.plumb_ops().len(), plumb_ops_before);
}

#[test]
fn confirm_not_on_link_goes_unbound() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_lease(&mut cli, &env, 100, 160, 200, 300);
    cli.process_wake(true, None).unwrap();
    cli.process(DhcpV6Event::TransmitWait).unwrap();

    let mut reply = server_msg(&cli, DhcpV6MessageType::Reply);
    reply.options.insert(DhcpV6Option::StatusCode(
        crate::DhcpV6OptionStatus {
            status: crate::DhcpV6OptionStatusCode::NotOnLink,
            message: "wrong link".to_string(),
        },
    ));
    env.inject(reply.emit().unwrap());
    let notification = cli.process(DhcpV6Event::UdpPackageIn).unwrap();
    assert_eq!(
        notification,
        Some(DhcpV6Notification::StatusChanged(DhcpV6State::Unbound))
    );
    assert_eq!(cli.state(), DhcpV6State::Solicit);
    assert!(env
        .plumb_ops()
        .contains(&PlumbOp::Remove { addr: test_addr() }));
}

#[test]
fn wake_honors_far_renew_timer() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_lease(&mut cli, &env, 100, 160, 200, 300);
    assert_eq!(cli.state(), DhcpV6State::Bound);

    // T1 is ~100s away, far beyond the default 30s wake skew.
    cli.process_wake(false, None).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Bound);

    // Pretend the renew was about to fire when we went to sleep.
    cli.next_renew_sec = Some(boot_time_sec() + 5);
    cli.process_wake(false, None).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Confirm);
}

#[test]
fn wake_on_unknown_network_solicits() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_lease(&mut cli, &env, 100, 160, 200, 300);

    // Lease was learned without an SSID; waking up on a named network
    // reads as a different network.
    cli.process_wake(false, Some("coffeeshop")).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Solicit);
    assert!(cli.lease.is_none());
}

#[test]
fn rebind_after_t2_then_expiry() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_lease(&mut cli, &env, 100, 160, 200, 300);

    // Advance the clock past T2.
    cli.lease.as_mut().unwrap().start_sec -= 200;
    cli.process(DhcpV6Event::Renew).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Renew);
    let renew_xid = cli.xid;

    cli.process(DhcpV6Event::TransmitWait).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Rebind);
    assert_ne!(cli.xid, renew_xid);
    let rebind = env.last_sent();
    assert_eq!(rebind.msg_type, DhcpV6MessageType::Rebind);
    // REBIND goes to any server, never naming one.
    assert!(rebind.options.get(DhcpV6OptionCode::ServerId).is_none());

    // Advance past the valid lifetime with no server in sight.
    cli.lease.as_mut().unwrap().start_sec -= 200;
    let notification = cli.process(DhcpV6Event::TransmitWait).unwrap();
    assert_eq!(
        notification,
        Some(DhcpV6Notification::StatusChanged(DhcpV6State::Unbound))
    );
    assert_eq!(cli.state(), DhcpV6State::Solicit);
    assert!(env
        .plumb_ops()
        .contains(&PlumbOp::Remove { addr: test_addr() }));
    assert!(cli.lease.is_none());
}

#[test]
fn renew_transmits_to_lease_server() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_lease(&mut cli, &env, 100, 160, 200, 300);

    cli.process(DhcpV6Event::Renew).unwrap();
    assert_eq!(cli.state(), DhcpV6State::Renew);
    cli.process(DhcpV6Event::TransmitWait).unwrap();
    let renew = env.last_sent();
    assert_eq!(renew.msg_type, DhcpV6MessageType::Renew);
    assert!(renew.options.get(DhcpV6OptionCode::ServerId).is_some());

    // Server extends the lease.
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
    assert_eq!(
        notification,
        Some(DhcpV6Notification::StatusChanged(DhcpV6State::Bound))
    );
}

#[test]
fn infinite_lease_arms_no_renewal() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_lease(
        &mut cli,
        &env,
        100,
        160,
        200,
        DHCPV6_INFINITE_LIFETIME,
    );
    assert_eq!(cli.state(), DhcpV6State::Bound);
    assert_eq!(cli.next_renew_sec, None);
    assert!(cli.lease.as_ref().unwrap().still_valid(i64::MAX));
}

#[test]
fn link_down_goes_inactive() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_lease(&mut cli, &env, 100, 160, 200, 300);

    let notification = cli.process_link_down().unwrap();
    assert_eq!(
        notification,
        Some(DhcpV6Notification::StatusChanged(DhcpV6State::Inactive))
    );
    assert_eq!(cli.state(), DhcpV6State::Inactive);
    assert!(env
        .plumb_ops()
        .contains(&PlumbOp::Remove { addr: test_addr() }));
    assert!(cli.get_info().is_none());
}

#[test]
fn release_transmits_once_and_tears_down() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_lease(&mut cli, &env, 100, 160, 200, 300);

    cli.release().unwrap();
    assert_eq!(cli.state(), DhcpV6State::Release);
    let release = env.last_sent();
    assert_eq!(release.msg_type, DhcpV6MessageType::Release);
    assert!(release.options.get(DhcpV6OptionCode::ServerId).is_some());
    assert!(env
        .plumb_ops()
        .contains(&PlumbOp::Remove { addr: test_addr() }));
    assert!(cli.get_info().is_none());
    assert!(cli.lease.is_none());
}

#[test]
fn stop_then_start_confirms_retained_lease() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_lease(&mut cli, &env, 100, 160, 200, 300);

    cli.stop();
    assert_eq!(cli.state(), DhcpV6State::Inactive);
    // Stopped without discarding: the saved message is no longer verified.
    assert!(cli.get_info().is_none());
    assert!(cli.lease.is_some());

    cli.start().unwrap();
    assert_eq!(cli.state(), DhcpV6State::Confirm);
}

#[test]
fn init_with_retained_lease_confirms() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_lease(&mut cli, &env, 100, 160, 200, 300);
    let lease: DhcpV6Lease = cli.lease.as_ref().unwrap().clone();

    let (cli2, _env2) =
        new_test_client(DhcpV6Mode::Stateful, Some(lease));
    assert_eq!(cli2.state(), DhcpV6State::Confirm);
}

#[test]
fn expired_retained_lease_solicits() {
    let (mut cli, env) = new_test_client(DhcpV6Mode::Stateful, None);
    acquire_lease(&mut cli, &env, 100, 160, 200, 300);
    let mut lease: DhcpV6Lease = cli.lease.as_ref().unwrap().clone();
    lease.start_sec -= 400;

    let (cli2, _env2) =
        new_test_client(DhcpV6Mode::Stateful, Some(lease));
    assert_eq!(cli2.state(), DhcpV6State::Solicit);
}
