//! Minimal WebSocket client for poking a running server by hand.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use base64::Engine;
use clap::Parser;
use rand::Rng;

use ws_reactor::protocol::frame::{encode_frame, scan_message, total_len, FrameKind};
use ws_reactor::protocol::{compute_accept_key, Message};

#[derive(Parser)]
#[command(name = "ws-client")]
#[command(about = "Send text messages to a ws-reactor server and print the replies", long_about = None)]
struct Cli {
    /// Server address.
    #[arg(short, long, default_value = "127.0.0.1:8888")]
    addr: String,

    /// Request path for the upgrade.
    #[arg(short, long, default_value = "/")]
    path: String,

    /// Messages to send, in order.
    #[arg(default_values_t = [String::from("Hello from client!")])]
    messages: Vec<String>,

    /// Send every message this many times.
    #[arg(short, long, default_value_t = 1)]
    repeat: usize,

    /// Seconds to wait for each reply.
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut stream = TcpStream::connect(&cli.addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(cli.timeout)))?;
    stream.set_nodelay(true)?;

    let mut buffer = handshake(&mut stream, &cli.addr, &cli.path)?;
    println!("Connected to {}{}", cli.addr, cli.path);

    let mut rng = rand::thread_rng();
    for round in 0..cli.repeat {
        for text in &cli.messages {
            let mut frame = Vec::new();
            encode_frame(FrameKind::Text, true, text.as_bytes(), Some(rng.gen()), &mut frame);
            stream.write_all(&frame)?;

            let reply = read_message(&mut stream, &mut buffer)?;
            println!("[{round}] sent '{text}' → {reply}");
        }
    }

    let mut close = Vec::new();
    encode_frame(FrameKind::Close, true, &[], Some(rng.gen()), &mut close);
    stream.write_all(&close)?;
    match read_message(&mut stream, &mut buffer) {
        Ok(reply) => println!("Closed: {reply}"),
        Err(e) => println!("Closed without reply: {e}"),
    }
    Ok(())
}

/// Send the upgrade request and verify the accept key. Returns any bytes
/// that arrived after the response headers.
fn handshake(stream: &mut TcpStream, host: &str, path: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let key_bytes: [u8; 16] = rand::thread_rng().gen();
    let key = base64::engine::general_purpose::STANDARD.encode(key_bytes);

    let request = format!(
        "GET {path} HTTP/1.1\r\n\
Host: {host}\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: {key}\r\n\
Sec-WebSocket-Version: 13\r\n\
\r\n"
    );
    stream.write_all(request.as_bytes())?;

    let mut buffer = Vec::new();
    let header_end = loop {
        if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break end + 4;
        }
        read_more(stream, &mut buffer)?;
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
    if !head.starts_with("HTTP/1.1 101") {
        return Err(format!("upgrade refused: {}", head.lines().next().unwrap_or_default()).into());
    }
    let expected = compute_accept_key(&key);
    let accepted = head.lines().any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("Sec-WebSocket-Accept") && value.trim() == expected
        })
    });
    if !accepted {
        return Err("server sent a wrong Sec-WebSocket-Accept".into());
    }

    Ok(buffer.split_off(header_end))
}

fn read_message(stream: &mut TcpStream, buffer: &mut Vec<u8>) -> Result<Message, Box<dyn std::error::Error>> {
    loop {
        if let Some(frames) = scan_message(buffer, usize::MAX)? {
            let message = Message::from_frames(&frames, buffer)?;
            buffer.drain(..total_len(&frames));
            return Ok(message);
        }
        read_more(stream, buffer)?;
    }
}

fn read_more(stream: &mut TcpStream, buffer: &mut Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
    let mut chunk = [0u8; 4096];
    let n = stream.read(&mut chunk)?;
    if n == 0 {
        return Err("server closed the connection".into());
    }
    buffer.extend_from_slice(&chunk[..n]);
    Ok(())
}
