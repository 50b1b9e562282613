//! WebSocket opening handshake (RFC 6455 Section 4.2).
//!
//! ```http
//! GET /chat HTTP/1.1
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//! ```
//!
//! ```http
//! HTTP/1.1 101 Switching Protocols
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
//! ```

use base64::Engine;
use sha1::{Digest, Sha1};

use super::http::{HttpRequest, HttpResponse};
use super::ProtocolError;

/// RFC 6455 GUID for the Sec-WebSocket-Accept calculation.
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `base64(SHA-1(client_key + GUID))`.
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// An upgrade request together with the response the server will send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub request: HttpRequest,
    pub response: HttpResponse,
}

impl Handshake {
    /// Parse the upgrade request and build the `101 Switching Protocols` reply.
    pub fn from_request_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let request = HttpRequest::parse(data)?;
        let response = build_response(&request)?;
        Ok(Self { request, response })
    }
}

fn build_response(request: &HttpRequest) -> Result<HttpResponse, ProtocolError> {
    let key = request
        .header("Sec-WebSocket-Key")
        .ok_or(ProtocolError::MissingWebSocketKey)?;

    let mut response = HttpResponse::new(101);
    response
        .set_header("Upgrade", "websocket")
        .set_header("Connection", "Upgrade")
        .set_header("Sec-WebSocket-Accept", compute_accept_key(key));

    if let Some(protocol) = request.header("Sec-WebSocket-Protocol") {
        response.set_header("Sec-WebSocket-Protocol", protocol);
    }
    // Any origin may connect.
    if request.has_header("Origin") {
        response.set_header("Access-Control-Allow-Origin", "*");
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc_accept_key_vector() {
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn response_echoes_protocol_and_allows_origin() {
        let data = b"GET /chat HTTP/1.1\r\n\
Host: server.example.com\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
Sec-WebSocket-Protocol: chat\r\n\
Origin: http://example.com\r\n\
\r\n";
        let handshake = Handshake::from_request_bytes(data).unwrap();
        let response = &handshake.response;

        assert_eq!(response.status(), 101);
        assert_eq!(response.header("Upgrade"), Some("websocket"));
        assert_eq!(response.header("Connection"), Some("Upgrade"));
        assert_eq!(
            response.header("Sec-WebSocket-Accept"),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
        assert_eq!(response.header("Sec-WebSocket-Protocol"), Some("chat"));
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
    }

    #[test]
    fn plain_request_gets_no_optional_headers() {
        let data = b"GET / HTTP/1.1\r\nSec-WebSocket-Key: abc\r\n\r\n";
        let handshake = Handshake::from_request_bytes(data).unwrap();
        assert_eq!(handshake.response.header("Sec-WebSocket-Protocol"), None);
        assert_eq!(handshake.response.header("Access-Control-Allow-Origin"), None);
    }

    #[test]
    fn missing_key_is_rejected() {
        let data = b"GET / HTTP/1.1\r\nUpgrade: websocket\r\n\r\n";
        assert!(matches!(
            Handshake::from_request_bytes(data),
            Err(ProtocolError::MissingWebSocketKey)
        ));
    }
}
