//! Integration tests for data transfer: ordering, stream chunking, flow
//! control, buffer overload, link congestion and multicast


use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use test_helpers::*;
use tipc_sock_rust::tipc_proto::{
    TipcHdr, TipcMsg, NAMED_H_SIZE, TIPC_ERR_NO_NAME, TIPC_ERR_NO_PORT, TIPC_ERR_OVERLOAD,
    TIPC_LOW_IMPORTANCE, TIPC_NAMED_MSG,
};
use tipc_sock_rust::{
    Binding, ErrorInfo, PeerCaps, PollEvents, RecvFlags, Scope, SendFlags, ServiceRange,
    SockAddr, SockConfig, SockError, SockOpt, SockType, TipcAddr, TipcSock,
};

fn publish(sk: &TipcSock, lower: u32, upper: u32) {
    sk.bind(Binding::Publish {
        range: ServiceRange::new(SVC, lower, upper),
        scope: Scope::Cluster,
    })
    .unwrap();
}

// ============================================================================
// Test 1: Ordering
// ============================================================================

#[test]
fn connection_preserves_order() {
    let c = cluster();
    let p = connected_pair(&c, SockType::SeqPacket);

    for i in 0..50u32 {
        p.client.send(None, &i.to_be_bytes(), SendFlags::empty()).unwrap();
    }
    for i in 0..50u32 {
        let (data, info) = recv_now(&p.child, 16).unwrap();
        assert_eq!(data, i.to_be_bytes());
        assert!(!info.truncated);
    }
    assert_eq!(recv_now(&p.child, 16).err(), Some(SockError::WouldBlock));
}

#[test]
fn datagram_truncation_is_reported() {
    let c = cluster();
    let rx = TipcSock::create(&c.n2, SockType::Rdm).unwrap();
    let tx = TipcSock::create(&c.n1, SockType::Rdm).unwrap();

    tx.send(Some(&SockAddr::Id(rx.own_addr())), &[9u8; 100], SendFlags::empty())
        .unwrap();
    let (data, info) = recv_now(&rx, 10).unwrap();
    assert_eq!(data, vec![9u8; 10]);
    assert!(info.truncated);
    // The rest of the datagram is gone
    assert_eq!(recv_now(&rx, 10).err(), Some(SockError::WouldBlock));
}

#[test]
fn peek_leaves_the_message_queued() {
    let c = cluster();
    let p = connected_pair(&c, SockType::SeqPacket);
    p.client.send(None, b"peek", SendFlags::empty()).unwrap();

    let mut buf = [0u8; 16];
    let info = p.child.recv(&mut buf, RecvFlags::PEEK | RecvFlags::DONTWAIT).unwrap();
    assert_eq!(&buf[..info.len], b"peek");
    let (data, _) = recv_now(&p.child, 16).unwrap();
    assert_eq!(data, b"peek");
}

#[test]
fn empty_receive_buffer_is_rejected() {
    let c = cluster();
    let p = connected_pair(&c, SockType::Stream);
    assert_eq!(p.child.recv(&mut [], RecvFlags::DONTWAIT), Err(SockError::InvalidArgument));
}

#[test]
fn oversized_message_is_rejected() {
    let c = cluster();
    let p = connected_pair(&c, SockType::SeqPacket);
    let big = vec![0u8; c.n1.config().max_user_msg_size + 1];
    assert_eq!(p.client.send(None, &big, SendFlags::empty()), Err(SockError::MessageTooLarge));
}

// ============================================================================
// Test 2: Stream Chunking
// ============================================================================

#[test]
fn stream_is_cut_at_the_link_mtu() {
    let c = cluster();
    let p = connected_pair(&c, SockType::Stream);
    let payload: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();

    c.fabric.start_capture();
    assert_eq!(p.client.send(None, &payload, SendFlags::empty()), Ok(5000));
    let chunks: Vec<usize> = c.fabric.take_captured().iter().map(|m| m.data_len()).collect();
    assert_eq!(chunks, vec![1476, 1476, 1476, 572]);

    let mut buf = vec![0u8; 5000];
    let info = p.child.recv(&mut buf, RecvFlags::WAITALL).unwrap();
    assert_eq!(info.len, 5000);
    assert_eq!(buf, payload);
}

#[test]
fn stream_reads_across_message_boundaries() {
    let c = cluster();
    let p = connected_pair(&c, SockType::Stream);
    p.client.send(None, b"abc", SendFlags::empty()).unwrap();
    p.client.send(None, b"defgh", SendFlags::empty()).unwrap();

    let (data, _) = recv_now(&p.child, 5).unwrap();
    assert_eq!(data, b"abcde");
    let (data, _) = recv_now(&p.child, 16).unwrap();
    assert_eq!(data, b"fgh");
}

#[test]
fn stream_empty_send_is_one_empty_message() {
    let c = cluster();
    let p = connected_pair(&c, SockType::Stream);
    c.fabric.start_capture();
    assert_eq!(p.client.send(None, &[], SendFlags::empty()), Ok(0));
    assert_eq!(c.fabric.take_captured().len(), 1);
    // Nothing readable surfaces from it
    assert_eq!(recv_now(&p.child, 16).err(), Some(SockError::WouldBlock));
}

// ============================================================================
// Test 3: Flow Control
// ============================================================================

#[test]
fn ack_after_a_quarter_window() {
    let c = cluster();
    let p = connected_pair(&c, SockType::SeqPacket);

    // 900 bytes plus header is one block; the window is 128 blocks
    for _ in 0..32 {
        p.client.send(None, &[1u8; 900], SendFlags::empty()).unwrap();
    }
    assert_eq!(p.client.stats().snt_unacked, 32);

    c.fabric.start_capture();
    for _ in 0..31 {
        recv_now(&p.child, 1000).unwrap();
    }
    assert!(acks(&c.fabric.take_captured()).is_empty());

    recv_now(&p.child, 1000).unwrap();
    let captured = c.fabric.take_captured();
    let acks = acks(&captured);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].hdr.conn_ack, 32);
    assert_eq!(acks[0].hdr.adv_win, 512);

    let stats = p.client.stats();
    assert_eq!(stats.snt_unacked, 0);
    assert_eq!(stats.snd_win, 512);
}

#[test]
fn legacy_peer_is_limited_by_message_window() {
    let cfg = SockConfig {
        flowctl_msg_win: 4,
        ..SockConfig::default()
    };
    let c = cluster_with(cfg);
    c.fabric.set_capabilities(N1, PeerCaps::empty());
    c.fabric.set_capabilities(N2, PeerCaps::empty());
    let p = connected_pair(&c, SockType::SeqPacket);

    for _ in 0..5 {
        p.client.send(None, &[0u8; 60_000], SendFlags::empty()).unwrap();
    }
    assert_eq!(p.client.stats().snt_unacked, 5);
    assert_eq!(p.client.send(None, b"x", SendFlags::DONTWAIT), Err(SockError::WouldBlock));
    assert!(!p.client.poll().contains(PollEvents::OUT));

    // Every consumed message is acked at this window size
    recv_now(&p.child, 60_000).unwrap();
    assert_eq!(p.client.stats().snt_unacked, 4);
    assert_eq!(p.client.send(None, b"x", SendFlags::DONTWAIT), Ok(1));
}

#[test]
fn blocked_writer_resumes_on_ack() {
    let cfg = SockConfig {
        flowctl_msg_win: 4,
        ..SockConfig::default()
    };
    let c = cluster_with(cfg);
    c.fabric.set_capabilities(N1, PeerCaps::empty());
    c.fabric.set_capabilities(N2, PeerCaps::empty());
    let p = connected_pair(&c, SockType::SeqPacket);

    for _ in 0..5 {
        p.client.send(None, b"fill", SendFlags::empty()).unwrap();
    }
    let writer = {
        let client = p.client.clone();
        thread::spawn(move || client.send(None, b"late", SendFlags::empty()))
    };
    thread::sleep(Duration::from_millis(20));
    recv_now(&p.child, 16).unwrap();
    assert_eq!(writer.join().unwrap(), Ok(4));
}

// ============================================================================
// Test 4: Receive Buffer Overload
// ============================================================================

#[test]
fn overload_returns_message_to_sender() {
    let c = cluster();
    let rx = TipcSock::create(&c.n2, SockType::Rdm).unwrap();
    rx.setsockopt(SockOpt::RcvBuf(1)).unwrap();
    let tx = TipcSock::create(&c.n1, SockType::Rdm).unwrap();
    tx.setsockopt(SockOpt::DestDroppable(false)).unwrap();

    tx.send(Some(&SockAddr::Id(rx.own_addr())), b"too much", SendFlags::empty())
        .unwrap();
    assert_eq!(rx.stats().drops, 1);
    assert_eq!(recv_now(&rx, 64).err(), Some(SockError::WouldBlock));

    let (data, info) = recv_now(&tx, 64).unwrap();
    assert!(data.is_empty());
    assert_eq!(
        info.meta.error,
        Some(ErrorInfo {
            code: TIPC_ERR_OVERLOAD,
            data_len: 8
        })
    );
    assert_eq!(info.meta.returned, b"too much");
    assert_eq!(info.meta.origin, Some(rx.own_addr()));
}

#[test]
fn burst_beyond_the_buffer_is_partly_returned() {
    let c = cluster();
    let rx = TipcSock::create(&c.n2, SockType::Rdm).unwrap();
    rx.setsockopt(SockOpt::RcvBuf(4000)).unwrap();
    let tx = TipcSock::create(&c.n1, SockType::Rdm).unwrap();
    tx.setsockopt(SockOpt::DestDroppable(false)).unwrap();

    // Each message charges 1288 bytes: three fit under 4000
    let dest = SockAddr::Id(rx.own_addr());
    for i in 0..10u8 {
        tx.send(Some(&dest), &[i; 1000], SendFlags::empty()).unwrap();
    }

    for i in 0..3u8 {
        let (data, info) = recv_now(&rx, 2000).unwrap();
        assert_eq!(data, vec![i; 1000]);
        assert_eq!(info.meta.error, None);
    }
    assert_eq!(recv_now(&rx, 2000).err(), Some(SockError::WouldBlock));
    assert_eq!(rx.stats().drops, 7);

    for i in 3..10u8 {
        let (_, info) = recv_now(&tx, 2000).unwrap();
        assert_matches!(info.meta.error, Some(ErrorInfo { code, .. }) if code == TIPC_ERR_OVERLOAD);
        assert_eq!(info.meta.returned, vec![i; 1000]);
    }
    assert_eq!(recv_now(&tx, 2000).err(), Some(SockError::WouldBlock));
}

#[test]
fn droppable_message_vanishes_on_overload() {
    let c = cluster();
    let rx = TipcSock::create(&c.n2, SockType::Rdm).unwrap();
    rx.setsockopt(SockOpt::RcvBuf(1)).unwrap();
    let tx = TipcSock::create(&c.n1, SockType::Rdm).unwrap();

    tx.send(Some(&SockAddr::Id(rx.own_addr())), b"lost", SendFlags::empty())
        .unwrap();
    assert_eq!(rx.stats().drops, 1);
    assert_eq!(recv_now(&tx, 64).err(), Some(SockError::WouldBlock));
}

#[test]
fn message_to_missing_port_comes_back() {
    let c = cluster();
    let tx = TipcSock::create(&c.n1, SockType::Rdm).unwrap();
    tx.setsockopt(SockOpt::DestDroppable(false)).unwrap();

    tx.send(Some(&SockAddr::Id(TipcAddr::new(N2, 777))), b"anyone?", SendFlags::empty())
        .unwrap();
    let (_, info) = recv_now(&tx, 64).unwrap();
    assert_matches!(info.meta.error, Some(ErrorInfo { code, .. }) if code == TIPC_ERR_NO_PORT);
}

fn stale_named_msg(from: TipcAddr, instance: u32) -> TipcMsg {
    let mut hdr = TipcHdr::new(
        TIPC_LOW_IMPORTANCE,
        TIPC_NAMED_MSG,
        NAMED_H_SIZE,
        from,
        TipcAddr::new(N2, 999),
    );
    hdr.name_type = SVC;
    hdr.name_lower = instance;
    hdr.name_upper = instance;
    TipcMsg::new(hdr, b"stale".to_vec())
}

#[test]
fn named_message_to_stale_port_is_rerouted() {
    let c = cluster();
    let rx = TipcSock::create(&c.n2, SockType::Rdm).unwrap();
    publish(&rx, 1, 10);
    let tx = TipcSock::create(&c.n1, SockType::Rdm).unwrap();

    c.n2.rcv(stale_named_msg(tx.own_addr(), 4));
    let (data, info) = recv_now(&rx, 64).unwrap();
    assert_eq!(data, b"stale");
    assert_eq!(info.meta.origin, Some(tx.own_addr()));
}

#[test]
fn named_message_without_instance_comes_back() {
    let c = cluster();
    let tx = TipcSock::create(&c.n1, SockType::Rdm).unwrap();

    c.n2.rcv(stale_named_msg(tx.own_addr(), 4));
    let (_, info) = recv_now(&tx, 64).unwrap();
    assert_matches!(info.meta.error, Some(ErrorInfo { code, .. }) if code == TIPC_ERR_NO_NAME);
}

// ============================================================================
// Test 5: Link Congestion
// ============================================================================

#[test]
fn congested_link_blocks_until_wakeup() {
    let c = cluster();
    let rx = TipcSock::create(&c.n2, SockType::Rdm).unwrap();
    let tx = TipcSock::create(&c.n1, SockType::Rdm).unwrap();
    let dest = SockAddr::Id(rx.own_addr());

    c.fabric.set_congested(N2);
    // The send that hits congestion still succeeds
    assert_eq!(tx.send(Some(&dest), b"one", SendFlags::empty()), Ok(3));
    assert_eq!(tx.stats().cong_link_cnt, 1);
    assert!(!tx.poll().contains(PollEvents::OUT));
    assert_eq!(tx.send(Some(&dest), b"two", SendFlags::DONTWAIT), Err(SockError::WouldBlock));

    // Other links are unaffected
    let local = TipcSock::create(&c.n1, SockType::Rdm).unwrap();
    assert_eq!(
        tx.send(Some(&SockAddr::Id(local.own_addr())), b"here", SendFlags::DONTWAIT),
        Ok(4)
    );

    c.fabric.relieve_congestion(N2);
    assert_eq!(tx.stats().cong_link_cnt, 0);
    assert!(tx.poll().contains(PollEvents::OUT));
    assert_eq!(tx.send(Some(&dest), b"two", SendFlags::DONTWAIT), Ok(3));

    let (data, _) = recv_now(&rx, 8).unwrap();
    assert_eq!(data, b"one");
    let (data, _) = recv_now(&rx, 8).unwrap();
    assert_eq!(data, b"two");
}

#[test]
fn multicast_congestion_clears_on_wakeup() {
    let c = cluster();
    let rx = TipcSock::create(&c.n2, SockType::Rdm).unwrap();
    publish(&rx, 0, 10);
    let tx = TipcSock::create(&c.n1, SockType::Rdm).unwrap();
    let mcast = SockAddr::Mcast(ServiceRange::new(SVC, 0, 10));

    c.fabric.set_congested(N2);
    assert_eq!(tx.send(Some(&mcast), b"one", SendFlags::empty()), Ok(3));
    assert_eq!(tx.stats().cong_link_cnt, 1);
    assert!(!tx.poll().contains(PollEvents::OUT));
    assert_eq!(tx.send(Some(&mcast), b"two", SendFlags::DONTWAIT), Err(SockError::WouldBlock));

    c.fabric.relieve_congestion(N2);
    assert_eq!(tx.stats().cong_link_cnt, 0);
    assert!(tx.poll().contains(PollEvents::OUT));
    assert_eq!(tx.send(Some(&mcast), b"two", SendFlags::DONTWAIT), Ok(3));

    let (data, _) = recv_now(&rx, 8).unwrap();
    assert_eq!(data, b"one");
    let (data, _) = recv_now(&rx, 8).unwrap();
    assert_eq!(data, b"two");
}

#[test]
fn send_timeout_on_congested_link() {
    let c = cluster();
    let rx = TipcSock::create(&c.n2, SockType::Rdm).unwrap();
    let tx = TipcSock::create(&c.n1, SockType::Rdm).unwrap();
    tx.setsockopt(SockOpt::SndTimeout(Some(Duration::from_millis(20)))).unwrap();
    let dest = SockAddr::Id(rx.own_addr());

    c.fabric.set_congested(N2);
    tx.send(Some(&dest), b"one", SendFlags::empty()).unwrap();
    assert_eq!(tx.send(Some(&dest), b"two", SendFlags::empty()), Err(SockError::TimedOut));
}

// ============================================================================
// Test 6: Multicast
// ============================================================================

#[test]
fn multicast_reaches_every_overlapping_binding() {
    let c = cluster();
    let a = TipcSock::create(&c.n2, SockType::Rdm).unwrap();
    let b = TipcSock::create(&c.n2, SockType::Rdm).unwrap();
    let local = TipcSock::create(&c.n1, SockType::Rdm).unwrap();
    let outside = TipcSock::create(&c.n2, SockType::Rdm).unwrap();
    publish(&a, 0, 10);
    publish(&b, 5, 5);
    publish(&local, 8, 20);
    publish(&outside, 50, 60);

    let tx = TipcSock::create(&c.n1, SockType::Rdm).unwrap();
    let range = ServiceRange::new(SVC, 0, 9);
    tx.send(Some(&SockAddr::Mcast(range)), b"all", SendFlags::empty()).unwrap();
    assert_eq!(c.fabric.mcast_count(), 1);

    for sk in [&a, &b, &local] {
        let (data, info) = recv_now(sk, 8).unwrap();
        assert_eq!(data, b"all");
        assert_eq!(info.meta.dest_name, Some(range));
        assert_eq!(info.meta.origin, Some(tx.own_addr()));
    }
    assert_eq!(recv_now(&outside, 8).err(), Some(SockError::WouldBlock));
}

#[test]
fn multicast_without_destinations_is_unreachable() {
    let c = cluster();
    let tx = TipcSock::create(&c.n1, SockType::Rdm).unwrap();
    let range = ServiceRange::new(SVC, 100, 200);
    assert_eq!(
        tx.send(Some(&SockAddr::Mcast(range)), b"void", SendFlags::empty()),
        Err(SockError::HostUnreachable)
    );
    assert_eq!(c.fabric.mcast_count(), 0);
}

#[test]
fn node_scope_binding_is_invisible_to_other_nodes() {
    let c = cluster();
    let hidden = TipcSock::create(&c.n2, SockType::Rdm).unwrap();
    hidden
        .bind(Binding::Publish {
            range: ServiceRange::new(SVC, 1, 1),
            scope: Scope::Node,
        })
        .unwrap();

    let tx = TipcSock::create(&c.n1, SockType::Rdm).unwrap();
    let mcast = SockAddr::Mcast(ServiceRange::new(SVC, 1, 1));
    assert_eq!(tx.send(Some(&mcast), b"x", SendFlags::empty()), Err(SockError::HostUnreachable));
}

// ============================================================================
// Test 7: Blocking Receive
// ============================================================================

#[test]
fn blocked_reader_wakes_on_arrival() {
    let c = cluster();
    let p = connected_pair(&c, SockType::SeqPacket);
    let reader = {
        let child = p.child.clone();
        thread::spawn(move || {
            let mut buf = [0u8; 16];
            child.recv(&mut buf, RecvFlags::empty()).map(|info| buf[..info.len].to_vec())
        })
    };
    thread::sleep(Duration::from_millis(20));
    p.client.send(None, b"wake", SendFlags::empty()).unwrap();
    assert_eq!(reader.join().unwrap(), Ok(b"wake".to_vec()));
}

#[test]
fn receive_timeout_and_interrupt() {
    let c = cluster();
    let p = connected_pair(&c, SockType::SeqPacket);
    let mut buf = [0u8; 16];

    p.child.setsockopt(SockOpt::RcvTimeout(Some(Duration::from_millis(10)))).unwrap();
    assert_eq!(p.child.recv(&mut buf, RecvFlags::empty()), Err(SockError::TimedOut));

    p.child.setsockopt(SockOpt::RcvTimeout(None)).unwrap();
    p.child.interrupt();
    assert_eq!(p.child.recv(&mut buf, RecvFlags::empty()), Err(SockError::Interrupted));
}

#[test]
fn unbounded_receive_timeout_waits_for_data() {
    let c = cluster();
    let p = connected_pair(&c, SockType::SeqPacket);
    p.child.setsockopt(SockOpt::RcvTimeout(Some(Duration::MAX))).unwrap();

    let reader = {
        let child = p.child.clone();
        thread::spawn(move || {
            let mut buf = [0u8; 16];
            child.recv(&mut buf, RecvFlags::empty()).map(|info| buf[..info.len].to_vec())
        })
    };
    thread::sleep(Duration::from_millis(20));
    p.client.send(None, b"late", SendFlags::empty()).unwrap();
    assert_eq!(reader.join().unwrap(), Ok(b"late".to_vec()));
}
