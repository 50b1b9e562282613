//! Wire-level tests that write raw bytes at the server.

mod common;

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use ws_reactor::protocol::frame::{encode_frame, FrameKind};

use common::{start_server, test_config, RecordingHandler};

const RFC_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
const RFC_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";
const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

fn upgrade_request(extra_headers: &str) -> String {
    format!(
        "GET /chat HTTP/1.1\r\n\
Host: localhost\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: {RFC_KEY}\r\n\
Sec-WebSocket-Version: 13\r\n\
{extra_headers}\r\n"
    )
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.set_nodelay(true).unwrap();
    stream
}

/// Read until the end of the HTTP response head and return it.
fn read_response_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).unwrap();
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

fn masked(kind: FrameKind, fin: bool, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_frame(kind, fin, payload, Some(MASK), &mut out);
    out
}

/// True once the server has closed the socket.
fn closed_by_server(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return true,
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::ConnectionReset => return true,
            Err(_) => return false,
        }
    }
}

#[test]
fn test_handshake_sent_byte_by_byte() {
    let (server, addr) = start_server(test_config(), RecordingHandler::new());
    let mut stream = connect(addr);

    for byte in upgrade_request("").as_bytes() {
        stream.write_all(&[*byte]).unwrap();
        thread::sleep(Duration::from_micros(200));
    }

    let head = read_response_head(&mut stream);
    assert!(head.starts_with("HTTP/1.1 101"), "unexpected response: {head}");
    assert!(head.contains(&format!("Sec-WebSocket-Accept: {RFC_ACCEPT}")));
    server.stop();
}

#[test]
fn test_handshake_and_frame_in_one_write() {
    let (server, addr) = start_server(test_config(), RecordingHandler::new());
    let mut stream = connect(addr);

    let mut bytes = upgrade_request("").into_bytes();
    bytes.extend(masked(FrameKind::Text, true, b"pipelined"));
    stream.write_all(&bytes).unwrap();

    let head = read_response_head(&mut stream);
    assert!(head.starts_with("HTTP/1.1 101"));

    let mut reply = [0u8; 11];
    stream.read_exact(&mut reply).unwrap();
    assert_eq!(&reply[..2], &[0x81, 9]);
    assert_eq!(&reply[2..], b"pipelined");
    server.stop();
}

#[test]
fn test_ping_inside_fragmented_message() {
    let handler = RecordingHandler::new();
    let (server, addr) = start_server(test_config(), handler.clone());
    let mut stream = connect(addr);
    stream.write_all(upgrade_request("").as_bytes()).unwrap();
    read_response_head(&mut stream);

    let mut bytes = masked(FrameKind::Text, false, b"Hel");
    bytes.extend(masked(FrameKind::Ping, true, b""));
    bytes.extend(masked(FrameKind::Continuation, true, b"lo"));
    stream.write_all(&bytes).unwrap();

    // Pong is queued while decoding, before the message reaches a worker.
    let mut pong = [0u8; 2];
    stream.read_exact(&mut pong).unwrap();
    assert_eq!(pong, [0x8A, 0x00]);

    let mut echo = [0u8; 7];
    stream.read_exact(&mut echo).unwrap();
    assert_eq!(&echo[..2], &[0x81, 5]);
    assert_eq!(&echo[2..], b"Hello");

    let received = handler.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].as_text(), Some("Hello"));
    assert_eq!(received[0].controls().len(), 1);
    drop(received);
    server.stop();
}

#[test]
fn test_unknown_opcode_closes_connection() {
    let (server, addr) = start_server(test_config(), RecordingHandler::new());
    let mut stream = connect(addr);
    stream.write_all(upgrade_request("").as_bytes()).unwrap();
    read_response_head(&mut stream);

    stream.write_all(&[0x83, 0x80, 0x01, 0x02, 0x03, 0x04]).unwrap();
    assert!(closed_by_server(&mut stream));
    server.stop();
}

#[test]
fn test_unmasked_client_frame_closes_connection() {
    let (server, addr) = start_server(test_config(), RecordingHandler::new());
    let mut stream = connect(addr);
    stream.write_all(upgrade_request("").as_bytes()).unwrap();
    read_response_head(&mut stream);

    let mut frame = Vec::new();
    encode_frame(FrameKind::Text, true, b"plain", None, &mut frame);
    stream.write_all(&frame).unwrap();
    assert!(closed_by_server(&mut stream));
    server.stop();
}

#[test]
fn test_unmasked_frame_accepted_when_masks_optional() {
    let mut config = test_config();
    config.session.require_mask = false;
    let (server, addr) = start_server(config, RecordingHandler::new());
    let mut stream = connect(addr);
    stream.write_all(upgrade_request("").as_bytes()).unwrap();
    read_response_head(&mut stream);

    let mut frame = Vec::new();
    encode_frame(FrameKind::Text, true, b"plain", None, &mut frame);
    stream.write_all(&frame).unwrap();

    let mut echo = [0u8; 7];
    stream.read_exact(&mut echo).unwrap();
    assert_eq!(&echo, &[0x81, 5, b'p', b'l', b'a', b'i', b'n']);
    server.stop();
}

#[test]
fn test_close_frame_gets_close_reply() {
    let (server, addr) = start_server(test_config(), RecordingHandler::new());
    let mut stream = connect(addr);
    stream.write_all(upgrade_request("").as_bytes()).unwrap();
    read_response_head(&mut stream);

    stream.write_all(&masked(FrameKind::Close, true, b"")).unwrap();
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).unwrap();
    assert_eq!(reply, [0x88, 0x00]);
    server.stop();
}

#[test]
fn test_huge_content_length_only_drops_that_client() {
    let (server, addr) = start_server(test_config(), RecordingHandler::new());

    let mut hostile = connect(addr);
    hostile
        .write_all(upgrade_request("Content-Length: 18446744073709551615\r\n").as_bytes())
        .unwrap();
    assert!(closed_by_server(&mut hostile));

    let mut next = connect(addr);
    next.write_all(upgrade_request("").as_bytes()).unwrap();
    let head = read_response_head(&mut next);
    assert!(head.starts_with("HTTP/1.1 101"), "unexpected response: {head}");
    assert!(server.is_running());
    server.stop();
}
