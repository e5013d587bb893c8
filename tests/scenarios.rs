use lamport_mutex::{
    message::{Kind, Message},
    run_simulation,
    transport::{build, Transport},
};

#[tokio::test(flavor = "multi_thread")]
async fn two_peers_concurrent_request_serializes_through_the_critical_section() {
    let transport = run_simulation(2, 50).await.unwrap();
    let cs_log = transport.critical_section_log();
    assert!(cs_log.len() >= 2, "both peers should get a turn before the time horizon");
    assert_eq!(cs_log[0].peer_id, 0, "peer 0's earlier-timestamped request enters first");
    assert_eq!(cs_log[1].peer_id, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn ring_propagation_enters_critical_section_in_initiation_order() {
    let transport = run_simulation(3, 1_000).await.unwrap();
    let cs_log = transport.critical_section_log();
    assert!(cs_log.len() >= 3, "the ring should complete at least one full lap");
    // the permission predicate only ever admits the queue head, and the
    // queue is kept in extended Lamport order, so completion order must
    // follow the ring's causal chain: 0 requests, then forwards to 1, then 2
    assert_eq!(cs_log[0].peer_id, 0);
    assert_eq!(cs_log[1].peer_id, 1);
    assert_eq!(cs_log[2].peer_id, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn tie_break_favors_lower_peer_id_at_equal_timestamps() {
    let (transport, mut peers) = build(3, 1_000);
    // force peers 1 and 2 to land on the same timestamp by preloading
    // identical clock values before either issues its REQUEST
    peers[1].seed_clock(4);
    peers[2].seed_clock(4);
    peers[1].request_critical_section().unwrap();
    peers[2].request_critical_section().unwrap();
    Transport::run(peers).await.unwrap();
    let cs_log = transport.critical_section_log();
    let rank_of = |peer_id| cs_log.iter().position(|record| record.peer_id == peer_id).unwrap();
    assert!(
        rank_of(1) < rank_of(2),
        "peer 1 should win the timestamp tie over peer 2"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn release_from_non_head_peer_aborts_the_simulation() {
    let (transport, mut peers) = build(3, 1_000);
    // peer 1 has an outstanding request, so its own id sits at the head of
    // its queue; a RELEASE claiming to be from peer 2 is a mismatch
    peers[1].request_critical_section().unwrap();
    transport.send(Message::release(2, 1)).unwrap();
    let result = Transport::run(peers).await;
    assert!(
        result.is_err(),
        "a RELEASE from a peer that isn't the queue head must abort the run"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn time_horizon_terminates_the_simulation() {
    let transport = run_simulation(4, 10).await.unwrap();
    for delivery in transport.sorted_audit_log() {
        assert!(
            delivery.timestamp < 10,
            "no message at or past the time horizon should ever be delivered"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn every_request_is_matched_by_a_release() {
    let transport = run_simulation(3, 300).await.unwrap();
    let log = transport.sorted_audit_log();
    let requests = log.iter().filter(|d| d.kind == Kind::Request).count();
    let releases = log.iter().filter(|d| d.kind == Kind::Release).count();
    assert_eq!(requests, releases);
}

#[tokio::test(flavor = "multi_thread")]
async fn stress_eight_peers_never_violate_mutual_exclusion() {
    // `Transport::critical_section` panics the task on re-entrance, so simply
    // completing without panicking already certifies property 1; this also
    // checks the log bookkeeping stays internally consistent at this scale.
    let transport = run_simulation(8, 10_000).await.unwrap();
    let cs_log = transport.critical_section_log();
    for window in cs_log.windows(2) {
        assert_eq!(window[1].operation, window[0].operation + 1);
    }
    for delivery in transport.sorted_audit_log() {
        assert!(delivery.timestamp < 10_000);
    }
}
