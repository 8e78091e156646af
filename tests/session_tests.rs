//! End-to-end command sessions over TCP against a listener on an ephemeral port.

use std::{
    net::SocketAddr,
    thread,
    time::{Duration, Instant},
};

use rts_control::config::Config;
use rts_control::protocol::{Client, Frame};
use rts_control::server::Listener;

fn start_server() -> SocketAddr {
    let config = Config {
        host: "127.0.0.1".into(),
        port: 0,
        realtime_priority: false,
        ..Config::default()
    };
    let listener = Listener::bind(config).unwrap();
    let addr = listener.local_addr().unwrap();
    listener.spawn().unwrap();
    addr
}

#[test]
fn set_period_is_acknowledged_without_response() {
    let mut client = Client::connect(start_server()).unwrap();
    let reply = client.command('P', Some(Frame::Integer(50))).unwrap();
    assert_eq!(reply.response, None);
    assert_eq!(reply.ack, 'P');
}

#[test]
fn zero_encoder_and_echo() {
    let mut client = Client::connect(start_server()).unwrap();
    let reply = client.command('Z', None).unwrap();
    assert_eq!((reply.response, reply.ack), (None, 'Z'));

    let reply = client.command('e', None).unwrap();
    assert_eq!(reply.response, Some(Frame::String("echo".into())));
    assert_eq!(reply.ack, 'e');
}

#[test]
fn running_loop_logs_rows_at_the_period() {
    let mut client = Client::connect(start_server()).unwrap();
    client.command('P', Some(Frame::Integer(50))).unwrap();
    client.command('C', None).unwrap();

    // stop as soon as the third row lands, well before the fourth is due
    let deadline = Instant::now() + Duration::from_secs(2);
    while client.read_log().unwrap().len() < 3 {
        assert!(Instant::now() < deadline, "loop did not log 3 rows");
        thread::sleep(Duration::from_millis(2));
    }
    client.command('C', None).unwrap();

    let rows = client.read_log().unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.len() == 7));
    for pair in rows.windows(2) {
        let dt = pair[1][0] - pair[0][0];
        assert!((0.035..0.075).contains(&dt), "tick spacing {dt}");
    }
}

#[test]
fn protocol_errors_keep_session_alive() {
    let mut client = Client::connect(start_server()).unwrap();

    let reply = client.command('?', None).unwrap();
    assert_eq!(reply.response, Some(Frame::String("Unrecognized command '?'".into())));
    assert_eq!(reply.ack, '?');

    client.send(&Frame::Integer(3)).unwrap();
    let reply = client.read_reply().unwrap();
    assert_eq!(reply.response, Some(Frame::String("Command expected, 'I' received".into())));
    assert_eq!(reply.ack, 'I');

    let reply = client.command('K', Some(Frame::Integer(2))).unwrap();
    assert!(matches!(reply.response, Some(Frame::String(ref s)) if s.contains("Float")));
    assert_eq!(reply.ack, 'K');

    let reply = client.command('O', None).unwrap();
    assert!(matches!(reply.response, Some(Frame::Integer(v)) if (0..=4095).contains(&v)));
}

#[test]
fn finish_closes_the_connection() {
    let mut client = Client::connect(start_server()).unwrap();
    let reply = client.command('X', None).unwrap();
    assert_eq!((reply.response, reply.ack), (None, 'X'));
    assert!(client.recv().unwrap_err().is_closed());
}

#[test]
fn sessions_are_independent() {
    let addr = start_server();
    let mut first = Client::connect(addr).unwrap();
    let mut second = Client::connect(addr).unwrap();

    first.command('G', Some(Frame::Integer(40))).unwrap();
    let status = second.command('S', None).unwrap().response;
    assert!(matches!(status, Some(Frame::String(ref s)) if s.contains("gain=100 ")));
    let status = first.command('S', None).unwrap().response;
    assert!(matches!(status, Some(Frame::String(ref s)) if s.contains("gain=40 ")));
}
