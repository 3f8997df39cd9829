use super::*;

fn pair(router: &mut PacketRouter, policy: LinkPolicy) -> (PortHandle, PortHandle, ConnId) {
    let fmt = ValueFormat::video_rgba8(2, 2);
    let src = router.register_port(0, Direction::Source, 0, fmt);
    let dst = router.register_port(1, Direction::Sink, 0, fmt);
    let conn = router.connect(src, dst, policy).unwrap();
    (src, dst, conn)
}

fn pkt(seq: u64) -> Packet {
    Packet::tick(ValueFormat::Order, seq)
}

#[test]
fn connect_validates_direction_and_registration() {
    let mut router = PacketRouter::new();
    let a = router.register_port(0, Direction::Source, 0, ValueFormat::Order);
    let b = router.register_port(1, Direction::Sink, 0, ValueFormat::Order);
    assert!(matches!(
        router.connect(b, a, LinkPolicy::default()),
        Err(GraphError::Validation(_))
    ));
    let ghost = PortHandle {
        index: 42,
        atom: 7,
        port: 0,
        direction: Direction::Sink,
    };
    assert!(router.connect(a, ghost, LinkPolicy::default()).is_err());
    let zero = LinkPolicy {
        credits: 1,
        queue: 0,
    };
    assert!(router.connect(a, b, zero).is_err());
    assert!(router.connect(a, b, LinkPolicy::default()).is_ok());
    assert_eq!(router.find_port(1, Direction::Sink, 0), Some(b));
    assert_eq!(router.find_port(1, Direction::Source, 0), None);
}

#[test]
fn request_route_ack_cycle() {
    let mut router = PacketRouter::new();
    let (src, _dst, conn) = pair(
        &mut router,
        LinkPolicy {
            credits: 2,
            queue: 4,
        },
    );
    assert_eq!(router.available_credits(src), 2);
    let granted = router.request_credits(src, 5).unwrap();
    assert_eq!(granted, 2);
    assert_eq!(router.available_credits(src), 0);
    assert!(router.has_outstanding(src));

    assert_eq!(router.route(src, pkt(0)).unwrap(), 1);
    assert_eq!(router.route(src, pkt(1)).unwrap(), 1);
    assert!(matches!(
        router.route(src, pkt(2)),
        Err(GraphError::Credit(_))
    ));
    router.ack_credits(src, granted).unwrap();
    assert_eq!(router.available_credits(src), 2);
    assert!(!router.has_outstanding(src));

    assert_eq!(router.queued(conn), 2);
    assert_eq!(router.pop(conn).unwrap().seq, 0);
    assert_eq!(router.pop(conn).unwrap().seq, 1);
    assert!(router.pop(conn).is_none());
    assert_eq!(router.routed(conn), 2);
}

#[test]
fn second_request_before_ack_is_a_credit_error() {
    let mut router = PacketRouter::new();
    let (src, _, _) = pair(&mut router, LinkPolicy::default());
    assert_eq!(router.request_credits(src, 1).unwrap(), 1);
    assert!(matches!(
        router.request_credits(src, 1),
        Err(GraphError::Credit(_))
    ));
    assert!(matches!(
        router.ack_credits(src, 2),
        Err(GraphError::Credit(_))
    ));
    router.ack_credits(src, 1).unwrap();
    assert!(matches!(
        router.ack_credits(src, 1),
        Err(GraphError::Credit(_))
    ));
    assert_eq!(router.request_credits(src, 1).unwrap(), 1);
}

#[test]
fn full_queue_grants_nothing() {
    let mut router = PacketRouter::new();
    let (src, _, conn) = pair(
        &mut router,
        LinkPolicy {
            credits: 1,
            queue: 1,
        },
    );
    let c = router.request_credits(src, 1).unwrap();
    router.route(src, pkt(0)).unwrap();
    router.ack_credits(src, c).unwrap();

    // Consumer has not drained: no room, no grant, and no ack owed.
    assert_eq!(router.request_credits(src, 1).unwrap(), 0);
    assert!(!router.has_outstanding(src));
    assert!(router.route(src, pkt(1)).is_err());

    router.pop(conn).unwrap();
    assert_eq!(router.request_credits(src, 1).unwrap(), 1);
}

#[test]
fn sink_ports_hold_no_credits() {
    let mut router = PacketRouter::new();
    let (_, dst, _) = pair(&mut router, LinkPolicy::default());
    assert!(matches!(
        router.request_credits(dst, 1),
        Err(GraphError::Credit(_))
    ));
}

#[test]
fn fan_out_clones_to_every_active_connection() {
    let mut router = PacketRouter::new();
    let fmt = ValueFormat::Order;
    let src = router.register_port(0, Direction::Source, 0, fmt);
    let a = router.register_port(1, Direction::Sink, 0, fmt);
    let b = router.register_port(2, Direction::Sink, 0, fmt);
    let ca = router.connect(src, a, LinkPolicy::default()).unwrap();
    let cb = router.connect(src, b, LinkPolicy::default()).unwrap();

    let c = router.request_credits(src, 1).unwrap();
    assert_eq!(router.route(src, pkt(9)).unwrap(), 2);
    router.ack_credits(src, c).unwrap();
    assert_eq!(router.pop(ca).unwrap().seq, 9);
    assert_eq!(router.pop(cb).unwrap().seq, 9);

    router.disconnect(cb).unwrap();
    assert!(!router.is_active(cb));
    assert_eq!(router.outgoing(src), vec![ca]);
    assert_eq!(router.incoming(b), Vec::<ConnId>::new());
    let c = router.request_credits(src, 1).unwrap();
    assert_eq!(router.route(src, pkt(10)).unwrap(), 1);
    router.ack_credits(src, c).unwrap();
    assert_eq!(router.queued(cb), 0);
}

#[test]
fn disconnect_drops_queued_packets() {
    let mut router = PacketRouter::new();
    let (src, _, conn) = pair(&mut router, LinkPolicy::default());
    let c = router.request_credits(src, 1).unwrap();
    router.route(src, pkt(0)).unwrap();
    router.ack_credits(src, c).unwrap();
    router.disconnect(conn).unwrap();
    assert_eq!(router.queued(conn), 0);
    assert!(router.pop(conn).is_none());
    // A second disconnect is harmless.
    router.disconnect(conn).unwrap();
    assert!(router.disconnect(ConnId(99)).is_err());
    assert!(router.dump_connections().contains("inactive"));
}

#[test]
fn dumps_list_ports_and_connections() {
    let mut router = PacketRouter::new();
    let (src, _, _) = pair(&mut router, LinkPolicy::default());
    let c = router.request_credits(src, 1).unwrap();
    router.route(src, pkt(0)).unwrap();

    let topo = router.dump_topology();
    assert!(topo.contains("atoms: 2"));
    assert!(topo.contains("ports: 2"));
    assert!(topo.contains("connections: 1"));
    assert!(topo.contains("SRC atom=0"));
    assert!(topo.contains("SNK atom=1"));
    assert!(topo.contains("port 0 -> port 1 (routed 1)"));

    let ports = router.dump_ports();
    assert!(ports.contains("port 0: credits=0 requested=1 acked=0 outstanding=1"));

    router.ack_credits(src, c).unwrap();
    let conns = router.dump_connections();
    assert!(conns.contains("[0] 0 -> 1 (active, queued=1/2, routed=1, dropped=0)"));
    assert_eq!(router.port_count(), 2);
    assert_eq!(router.connection_count(), 1);
}

#[cfg(target_pointer_width = "64")]
#[test]
fn queue_room_beyond_u32_saturates_instead_of_wrapping() {
    let mut router = PacketRouter::new();
    let (src, _, _) = pair(
        &mut router,
        LinkPolicy {
            credits: 3,
            queue: (1usize << 32) + 1,
        },
    );
    assert_eq!(router.request_credits(src, 3).unwrap(), 3);
    router.ack_credits(src, 3).unwrap();
}
