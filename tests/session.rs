//! End-to-end session tests over loopback.
//!
//! Each test stands up a real server on an OS-assigned port and drives
//! both sides by stepping their frames from this thread, the same way a
//! host program would. No test spawns a thread.

use std::cell::RefCell;
use std::net::TcpStream;
use std::rc::Rc;
use std::time::Duration;

use framelink::core::{NetCallback, NetConfig};
use framelink::server::SendTarget;
use framelink::transport::{DenyReason, FrameError, PacketBody};
use framelink::{Client, NetError, Netmode, Netstate, Server};

const FRAME_DELAY: Duration = Duration::from_millis(5);

/// Honor `RUST_LOG` when debugging a failing scenario.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn start_server(netmode: Netmode, max_clients: usize, timeout: Duration) -> Server {
    init_tracing();
    let config = NetConfig::builder()
        .port(0)
        .netmode(netmode)
        .max_clients(max_clients)
        .timeout(timeout)
        .build();
    Server::start(config).expect("server failed to bind loopback")
}

fn connect_client(server: &Server, name: &str, timeout: Duration) -> Client {
    let port = server.local_addr().unwrap().port();
    let config = NetConfig::builder().port(port).timeout(timeout).build();
    let mut client = Client::new(config, name);
    client.connect("127.0.0.1").expect("loopback connect failed");
    client
}

/// Step the server and every client for up to `frames` frames, stopping
/// early once `done` holds.
fn pump(
    server: &mut Server,
    clients: &mut [&mut Client],
    frames: usize,
    mut done: impl FnMut(&Server, &mut [&mut Client]) -> bool,
) {
    for _ in 0..frames {
        server.frame().unwrap();
        for client in clients.iter_mut() {
            client.frame().unwrap();
        }
        if done(server, clients) {
            return;
        }
        std::thread::sleep(FRAME_DELAY);
    }
}

fn pump_until_authorized(server: &mut Server, client: &mut Client) {
    pump(server, &mut [client], 200, |_, clients| {
        clients[0].is_authorized()
    });
}

#[test]
fn test_handshake_grants_slot_one() {
    let mut server = start_server(Netmode::Green, 8, Duration::from_secs(30));
    let mut client = connect_client(&server, "alice", Duration::from_secs(30));
    assert_eq!(client.netstate(), Netstate::NeedAuth);

    pump_until_authorized(&mut server, &mut client);

    assert_eq!(client.netstate(), Netstate::Authorized);
    assert_eq!(client.my_slot(), Some(1));
    assert_eq!(server.num_connected(), 1);
    assert_eq!(server.drain_joined(), vec![(1, "alice".to_owned())]);
}

#[test]
fn test_yellow_refuses_new_connections() {
    let mut server = start_server(Netmode::Yellow, 8, Duration::from_secs(30));
    let mut client = connect_client(&server, "alice", Duration::from_secs(30));

    pump(&mut server, &mut [&mut client], 200, |_, clients| {
        clients[0].last_deny_reason().is_some()
    });

    assert_eq!(client.last_deny_reason(), Some(DenyReason::NotAccepting));
    assert_eq!(client.netstate(), Netstate::NoConnect);
    assert_eq!(server.num_connected(), 0);
}

#[test]
fn test_full_server_denies_then_reuses_freed_slot() {
    let mut server = start_server(Netmode::Green, 2, Duration::from_secs(30));
    let mut first = connect_client(&server, "alice", Duration::from_secs(30));
    let mut second = connect_client(&server, "bob", Duration::from_secs(30));

    pump(&mut server, &mut [&mut first, &mut second], 200, |_, clients| {
        clients.iter().all(|client| client.is_authorized())
    });
    assert_eq!(first.my_slot(), Some(1));
    assert_eq!(second.my_slot(), Some(2));

    // A third attempt against a full registry is refused with the reason.
    let mut third = connect_client(&server, "carol", Duration::from_secs(30));
    pump(
        &mut server,
        &mut [&mut first, &mut second, &mut third],
        200,
        |_, clients| clients[2].last_deny_reason().is_some(),
    );
    assert_eq!(third.last_deny_reason(), Some(DenyReason::ServerFull));

    // Vacating slot 1 makes it the next slot handed out.
    server.drop_client(1);
    assert_eq!(server.drain_dropped(), vec![1]);

    let mut fourth = connect_client(&server, "dave", Duration::from_secs(30));
    pump(
        &mut server,
        &mut [&mut second, &mut fourth],
        200,
        |_, clients| clients[1].is_authorized(),
    );
    assert_eq!(fourth.my_slot(), Some(1));
}

#[test]
fn test_drop_is_broadcast_to_remaining_clients() {
    let mut server = start_server(Netmode::Green, 8, Duration::from_secs(30));
    let mut first = connect_client(&server, "alice", Duration::from_secs(30));
    let mut second = connect_client(&server, "bob", Duration::from_secs(30));

    pump(&mut server, &mut [&mut first, &mut second], 200, |_, clients| {
        clients.iter().all(|client| client.is_authorized())
    });
    let second_slot = second.my_slot().unwrap();

    server.drop_client(second_slot);
    let mut announced = Vec::new();
    pump(&mut server, &mut [&mut first], 200, |_, clients| {
        announced.extend(clients[0].drain_dropped());
        !announced.is_empty()
    });

    assert_eq!(announced, vec![second_slot]);
    assert!(first.is_authorized(), "the remaining client must stay up");
    assert_eq!(server.num_connected(), 1);
}

#[test]
fn test_silent_client_is_evicted_and_announced() {
    let timeout = Duration::from_millis(200);
    let mut server = start_server(Netmode::Green, 8, timeout);
    let mut talker = connect_client(&server, "alice", timeout);
    let mut mute = connect_client(&server, "bob", timeout);

    pump(&mut server, &mut [&mut talker, &mut mute], 200, |_, clients| {
        clients.iter().all(|client| client.is_authorized())
    });
    let mute_slot = mute.my_slot().unwrap();

    // Only the talker keeps framing; its keepalives hold its slot while
    // the mute client falls past the timeout.
    let mut announced = Vec::new();
    pump(&mut server, &mut [&mut talker], 400, |_, clients| {
        announced.extend(clients[0].drain_dropped());
        announced.contains(&mute_slot)
    });

    assert!(
        announced.contains(&mute_slot),
        "drop of the silent client was never announced"
    );
    assert!(talker.is_authorized(), "the live client must survive eviction");
    assert_eq!(server.num_connected(), 1);
}

#[test]
fn test_drop_client_twice_records_one_drop() {
    let mut server = start_server(Netmode::Green, 8, Duration::from_secs(30));
    let mut client = connect_client(&server, "alice", Duration::from_secs(30));
    pump_until_authorized(&mut server, &mut client);

    let slot = client.my_slot().unwrap();
    server.drop_client(slot);
    server.drop_client(slot);

    assert_eq!(server.drain_dropped(), vec![slot]);
    assert_eq!(server.num_connected(), 0);
}

#[test]
fn test_red_terminates_existing_connections() {
    let mut server = start_server(Netmode::Green, 8, Duration::from_secs(30));
    let mut client = connect_client(&server, "alice", Duration::from_secs(30));
    pump_until_authorized(&mut server, &mut client);

    server.set_netmode(Netmode::Red);
    assert_eq!(server.num_connected(), 0);

    pump(&mut server, &mut [&mut client], 200, |_, clients| {
        clients[0].netstate() == Netstate::NoConnect
    });
    assert_eq!(client.netstate(), Netstate::NoConnect);
    assert_eq!(client.my_slot(), None);
}

#[test]
fn test_game_packets_arrive_in_order_exactly_once() {
    let mut server = start_server(Netmode::Green, 8, Duration::from_secs(30));
    let mut client = connect_client(&server, "alice", Duration::from_secs(30));
    pump_until_authorized(&mut server, &mut client);
    let slot = client.my_slot().unwrap();

    let received: Rc<RefCell<Vec<(u8, Vec<u8>)>>> = Rc::default();
    let sink = Rc::clone(&received);
    client
        .callbacks()
        .add(NetCallback::DeserializeFromServer(Box::new(
            move |kind, data| {
                sink.borrow_mut().push((kind, data.to_vec()));
            },
        )));

    for n in 0..3u8 {
        server
            .queue_packet(
                PacketBody::Game {
                    kind: 0x10 + n,
                    data: vec![n],
                },
                SendTarget::Client(slot),
            )
            .unwrap();
    }

    pump(&mut server, &mut [&mut client], 200, |_, _| {
        received.borrow().len() == 3
    });

    assert_eq!(
        *received.borrow(),
        vec![
            (0x10, vec![0]),
            (0x11, vec![1]),
            (0x12, vec![2]),
        ]
    );
}

#[test]
fn test_client_game_packet_reaches_server_hook() {
    let mut server = start_server(Netmode::Green, 8, Duration::from_secs(30));
    let mut client = connect_client(&server, "alice", Duration::from_secs(30));
    pump_until_authorized(&mut server, &mut client);
    let slot = client.my_slot().unwrap();

    let received: Rc<RefCell<Vec<(i32, u8, Vec<u8>)>>> = Rc::default();
    let sink = Rc::clone(&received);
    server
        .callbacks()
        .add(NetCallback::DeserializeFromClient(Box::new(
            move |from, kind, data| {
                sink.borrow_mut().push((from, kind, data.to_vec()));
            },
        )));

    client
        .queue_packet(PacketBody::Game {
            kind: 0x20,
            data: b"state".to_vec(),
        })
        .unwrap();

    pump(&mut server, &mut [&mut client], 200, |_, _| {
        !received.borrow().is_empty()
    });

    assert_eq!(*received.borrow(), vec![(slot, 0x20, b"state".to_vec())]);
}

#[test]
fn test_hook_packet_payload_is_built_at_send_time() {
    let mut server = start_server(Netmode::Green, 8, Duration::from_secs(30));
    let mut client = connect_client(&server, "alice", Duration::from_secs(30));
    pump_until_authorized(&mut server, &mut client);

    client
        .callbacks()
        .add(NetCallback::SerializeToServer(Box::new(|kind| {
            vec![kind, 0xAA]
        })));

    let received: Rc<RefCell<Vec<Vec<u8>>>> = Rc::default();
    let sink = Rc::clone(&received);
    server
        .callbacks()
        .add(NetCallback::DeserializeFromClient(Box::new(
            move |_, _, data| {
                sink.borrow_mut().push(data.to_vec());
            },
        )));

    client.queue_hook_packet(0x30).unwrap();

    pump(&mut server, &mut [&mut client], 200, |_, _| {
        !received.borrow().is_empty()
    });

    assert_eq!(*received.borrow(), vec![vec![0x30, 0xAA]]);
}

#[test]
fn test_empty_game_payload_is_sent_literally() {
    let mut server = start_server(Netmode::Green, 8, Duration::from_secs(30));
    let mut client = connect_client(&server, "alice", Duration::from_secs(30));
    pump_until_authorized(&mut server, &mut client);
    let slot = client.my_slot().unwrap();

    let received: Rc<RefCell<Vec<(u8, Vec<u8>)>>> = Rc::default();
    let sink = Rc::clone(&received);
    client
        .callbacks()
        .add(NetCallback::DeserializeFromServer(Box::new(
            move |kind, data| {
                sink.borrow_mut().push((kind, data.to_vec()));
            },
        )));

    // No serialize hook registered anywhere: an empty payload must arrive
    // as exactly that, not be treated as a fill request.
    server
        .queue_packet(
            PacketBody::Game {
                kind: 0x40,
                data: Vec::new(),
            },
            SendTarget::Client(slot),
        )
        .unwrap();

    pump(&mut server, &mut [&mut client], 200, |_, _| {
        !received.borrow().is_empty()
    });

    assert_eq!(*received.borrow(), vec![(0x40, Vec::new())]);
}

#[test]
fn test_oversized_game_packet_is_refused_locally() {
    let mut server = start_server(Netmode::Green, 8, Duration::from_secs(30));
    let mut client = connect_client(&server, "alice", Duration::from_secs(30));
    pump_until_authorized(&mut server, &mut client);
    let slot = client.my_slot().unwrap();

    let oversized = PacketBody::Game {
        kind: 0x10,
        data: vec![0; 16 * 1024 + 1],
    };
    assert!(matches!(
        server.queue_packet(oversized.clone(), SendTarget::Client(slot)),
        Err(NetError::Frame(FrameError::PayloadTooLarge { .. }))
    ));
    assert!(matches!(
        client.queue_packet(oversized),
        Err(NetError::Frame(FrameError::PayloadTooLarge { .. }))
    ));

    // The refusal stayed local; nothing reached the wire, so the session
    // is untouched.
    pump(&mut server, &mut [&mut client], 10, |_, _| false);
    assert!(client.is_authorized());
    assert_eq!(server.num_connected(), 1);
}

#[test]
fn test_overlong_name_is_refused_before_connecting() {
    let server = start_server(Netmode::Green, 8, Duration::from_secs(30));
    let port = server.local_addr().unwrap().port();
    let config = NetConfig::builder()
        .port(port)
        .timeout(Duration::from_secs(30))
        .build();

    let mut client = Client::new(config, "x".repeat(65));
    assert!(matches!(
        client.connect("127.0.0.1"),
        Err(NetError::Frame(FrameError::Malformed(_)))
    ));
    assert_eq!(client.netstate(), Netstate::NoConnect);
}

#[test]
fn test_vanishing_peer_does_not_fail_the_frame() {
    let mut server = start_server(Netmode::Green, 8, Duration::from_secs(30));
    let mut client = connect_client(&server, "alice", Duration::from_secs(30));
    pump_until_authorized(&mut server, &mut client);

    // A peer that connects and immediately goes away must cost at most its
    // own slot, never the frame.
    let port = server.local_addr().unwrap().port();
    let ghost = TcpStream::connect(("127.0.0.1", port)).unwrap();
    drop(ghost);

    for _ in 0..20 {
        server.frame().expect("a bad accept must not fail the frame");
        client.frame().unwrap();
        std::thread::sleep(FRAME_DELAY);
    }
    assert!(client.is_authorized(), "established sessions must survive");
}

#[test]
fn test_broadcast_except_skips_the_named_slot() {
    let mut server = start_server(Netmode::Green, 8, Duration::from_secs(30));
    let mut first = connect_client(&server, "alice", Duration::from_secs(30));
    let mut second = connect_client(&server, "bob", Duration::from_secs(30));
    let mut third = connect_client(&server, "carol", Duration::from_secs(30));

    pump(
        &mut server,
        &mut [&mut first, &mut second, &mut third],
        200,
        |_, clients| clients.iter().all(|client| client.is_authorized()),
    );
    let sender_slot = second.my_slot().unwrap();

    let mut sinks = Vec::new();
    for client in [&mut first, &mut second, &mut third] {
        let received: Rc<RefCell<Vec<u8>>> = Rc::default();
        let sink = Rc::clone(&received);
        client
            .callbacks()
            .add(NetCallback::DeserializeFromServer(Box::new(
                move |kind, _| {
                    sink.borrow_mut().push(kind);
                },
            )));
        sinks.push(received);
    }

    server
        .queue_packet(
            PacketBody::Game {
                kind: 0x50,
                data: vec![7],
            },
            SendTarget::BroadcastExcept(sender_slot),
        )
        .unwrap();

    pump(
        &mut server,
        &mut [&mut first, &mut second, &mut third],
        200,
        |_, _| !sinks[0].borrow().is_empty() && !sinks[2].borrow().is_empty(),
    );

    assert_eq!(*sinks[0].borrow(), vec![0x50]);
    assert!(sinks[1].borrow().is_empty(), "the excepted slot must not receive");
    assert_eq!(*sinks[2].borrow(), vec![0x50]);
}
