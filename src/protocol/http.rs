//! Minimal HTTP/1.1 request parsing and response marshalling.
//!
//! Only what the upgrade handshake needs: a CRLFCRLF-terminated header block,
//! an optional `Content-Length` body, and a response writer.

use url::form_urlencoded;

use super::ProtocolError;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const LINE_SEPARATOR: &str = "\r\n";

/// Offset of the `\r` that starts the header terminator, if present.
fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

/// Split a header line into a trimmed `(name, value)` pair.
///
/// A line without a colon is treated as a name with an empty value.
fn split_header_line(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((name, value)) => (name.trim(), value.trim()),
        None => (line, ""),
    }
}

fn parse_content_length(value: &str) -> Result<usize, ProtocolError> {
    value
        .parse()
        .map_err(|_| ProtocolError::MalformedHttp(format!("bad Content-Length '{value}'")))
}

/// Total request length for a header block of `header_len` bytes and a
/// declared body, or an error when it cannot be represented.
fn request_len(header_len: usize, content_length: usize) -> Result<usize, ProtocolError> {
    header_len
        .checked_add(HEADER_TERMINATOR.len())
        .and_then(|len| len.checked_add(content_length))
        .ok_or_else(|| ProtocolError::MalformedHttp(format!("Content-Length {content_length} overflows")))
}

/// Length of the complete request at the start of `data`.
///
/// `Ok(None)` while the header block or the declared body is still arriving.
/// A declared length that puts the request past `max_packet` fails at once.
pub fn request_boundary(data: &[u8], max_packet: usize) -> Result<Option<usize>, ProtocolError> {
    let Some(header_len) = find_header_end(data) else {
        return Ok(None);
    };

    let head = String::from_utf8_lossy(&data[..header_len]);
    let mut content_length = 0;
    for line in head.split(LINE_SEPARATOR).skip(1) {
        let (name, value) = split_header_line(line);
        if name.eq_ignore_ascii_case("Content-Length") {
            content_length = parse_content_length(value)?;
            break;
        }
    }

    let total = request_len(header_len, content_length)?;
    if total > max_packet {
        return Err(ProtocolError::FrameTooLarge {
            len: total as u64,
            max: max_packet,
        });
    }
    Ok((total <= data.len()).then_some(total))
}

/// Parsed HTTP request.
///
/// Header names are stored lower-cased; lookups are case-insensitive and a
/// header may carry several values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: String,
    uri: String,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl HttpRequest {
    /// Parse one complete request from the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let header_len = find_header_end(data)
            .ok_or_else(|| ProtocolError::MalformedHttp("header terminator not found".into()))?;
        let head = String::from_utf8_lossy(&data[..header_len]);
        let mut lines = head.split(LINE_SEPARATOR);

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(uri), Some(_version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ProtocolError::MalformedHttp(format!(
                "can't parse method and URI from '{request_line}'"
            )));
        };

        let headers: Vec<(String, String)> = lines
            .map(split_header_line)
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect();

        let mut request = Self {
            method: method.to_string(),
            uri: uri.to_string(),
            path: uri_path(uri),
            query: uri_query(uri),
            headers,
            body: Vec::new(),
        };

        let content_length = match request.header("content-length") {
            Some(value) => parse_content_length(value)?,
            None => 0,
        };
        if content_length > 0 {
            let body_start = header_len + HEADER_TERMINATOR.len();
            let body = data
                .get(body_start..request_len(header_len, content_length)?)
                .ok_or(ProtocolError::Incomplete)?;
            request.body = body.to_vec();
        }

        Ok(request)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// URI path without scheme, authority or query (`ws://h:1/a/b?x=1` → `/a/b`).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Decoded query parameters in order of appearance.
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First value of a header.
    pub fn header<'a>(&'a self, name: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All values of a header, in order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl std::fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.uri)
    }
}

fn uri_path(uri: &str) -> String {
    let uri = uri.trim();
    let start = uri.find("://").map_or(0, |scheme_end| scheme_end + 3);
    let path = match uri[start..].find('/') {
        Some(slash) => &uri[start + slash..],
        None => &uri[start..],
    };
    let path = path.split('?').next().unwrap_or_default();

    let mut collapsed = path.to_string();
    while collapsed.contains("/./") {
        collapsed = collapsed.replace("/./", "/");
    }
    collapsed
}

fn uri_query(uri: &str) -> Vec<(String, String)> {
    match uri.rsplit_once('?') {
        Some((_, query)) if !query.is_empty() => form_urlencoded::parse(query.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect(),
        _ => Vec::new(),
    }
}

/// HTTP response with ordered headers.
///
/// Every response starts with no-cache headers so intermediaries never cache
/// the upgrade reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        let mut response = Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        };
        response
            .set_header("Cache-Control", "no-cache, no-store, must-revalidate")
            .set_header("Pragma", "no-cache")
            .set_header("Expires", "0");
        response
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Set a header, replacing any previous value with the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_body(&mut self, body: Vec<u8>, content_type: &str) -> &mut Self {
        self.body = body;
        self.set_header("Content-Type", content_type)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serialize status line, headers and body.
    ///
    /// Informational (1xx) responses carry no `Content-Length`.
    pub fn marshal(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}{LINE_SEPARATOR}",
            self.status,
            status_text(self.status)
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}{LINE_SEPARATOR}"));
        }
        if self.status >= 200 {
            head.push_str(&format!("Content-Length: {}{LINE_SEPARATOR}", self.body.len()));
        }
        head.push_str(LINE_SEPARATOR);

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Server Error",
        _ => "",
    }
}
