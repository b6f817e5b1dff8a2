#[allow(unused_imports)]
use std::ascii::AsciiExt;

use url::form_urlencoded;

use enums::Version;
use headers::{is_close, is_keep_alive, connection_has};


/// A single request or response header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// A request received from a client
///
/// The structure is filled incrementally by the request parser; query and
/// form parameters and the decoded path appear after post-processing. The
/// request body itself stays in the connection's buffer and is handed to
/// the dispatch logic as a separate slice.
#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub uri: String,
    pub http_version_major: u32,
    pub http_version_minor: u32,
    pub headers: Vec<Header>,
    /// Whether the connection should be kept open after the reply
    pub keep_alive: bool,
    /// The URI with the query string removed, URL-decoded
    pub request_path: String,
    /// Declared `Content-Length`, zero when absent
    pub body_size: usize,
    query_params: Vec<(String, String)>,
    form_params: Vec<(String, String)>,
}

impl Request {
    pub fn new() -> Request {
        Request {
            method: String::new(),
            uri: String::new(),
            http_version_major: 0,
            http_version_minor: 0,
            headers: Vec::new(),
            keep_alive: false,
            request_path: String::new(),
            body_size: 0,
            query_params: Vec::new(),
            form_params: Vec::new(),
        }
    }

    /// Returns the value of the named header
    ///
    /// Header names compare case-insensitively. When the header occurs
    /// more than once the first one wins.
    pub fn get_header_value(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| &h.value[..])
    }

    /// Returns a query parameter by exact (case-sensitive) key
    pub fn get_query_param(&self, key: &str) -> Option<&str> {
        Request::get_param(&self.query_params, key)
    }

    /// Returns a form parameter by exact (case-sensitive) key
    pub fn get_form_param(&self, key: &str) -> Option<&str> {
        Request::get_param(&self.form_params, key)
    }

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query_params
    }

    pub fn form_params(&self) -> &[(String, String)] {
        &self.form_params
    }

    fn get_param<'x>(params: &'x [(String, String)], key: &str)
        -> Option<&'x str>
    {
        params.iter()
            .find(|&&(ref k, _)| k == key)
            .map(|&(_, ref v)| &v[..])
    }

    /// The protocol version the client spoke
    ///
    /// Anything newer than 1.0 is treated as 1.1; the server answers
    /// in 1.1 either way.
    pub fn version(&self) -> Version {
        if self.http_version_major == 1 && self.http_version_minor == 0 {
            Version::Http10
        } else {
            Version::Http11
        }
    }

    /// Post-processes a request the parser reported as complete
    ///
    /// Splits the query string off the URI, URL-decodes the path, parses
    /// query parameters, picks up `Content-Length` and evaluates the
    /// `Connection` header against the protocol version. Returns false
    /// when the URI carries a malformed escape, which the caller must
    /// treat the same way as a parse error.
    pub fn finalize(&mut self) -> bool {
        let uri = self.uri.clone();
        let (raw_path, raw_query) = match uri.find('?') {
            Some(pos) => (&uri[..pos], &uri[pos + 1..]),
            None => (&uri[..], ""),
        };
        self.request_path = match url_decode(raw_path) {
            Some(path) => path,
            None => return false,
        };
        self.query_params = form_urlencoded::parse(raw_query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        self.body_size = self.get_header_value("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);

        let connection = self.get_header_value("Connection");
        self.keep_alive = match self.version() {
            // 1.0 closes unless the client asks otherwise
            Version::Http10 => connection
                .map(|v| connection_has(v, is_keep_alive))
                .unwrap_or(false),
            Version::Http11 => !connection
                .map(|v| connection_has(v, is_close))
                .unwrap_or(false),
        };
        return true;
    }

    /// Parses an `application/x-www-form-urlencoded` body into form
    /// parameters
    pub fn parse_form_body(&mut self, body: &[u8]) {
        self.form_params = form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
    }

    /// Resets the request for reuse on a kept-alive connection
    pub fn clear(&mut self) {
        self.method.clear();
        self.uri.clear();
        self.http_version_major = 0;
        self.http_version_minor = 0;
        self.headers.clear();
        self.keep_alive = false;
        self.request_path.clear();
        self.body_size = 0;
        self.query_params.clear();
        self.form_params.clear();
    }
}

/// Decodes `%xx` escapes and `+` in a URI path
///
/// Unlike the lenient decoder in the `url` crate this one rejects
/// malformed escapes, which the protocol treats as a bad request.
fn url_decode(input: &str) -> Option<String> {
    let raw = input.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'%' => {
                if i + 2 >= raw.len() {
                    return None;
                }
                let hi = hex_val(raw[i + 1]);
                let lo = hex_val(raw[i + 2]);
                match (hi, lo) {
                    (Some(h), Some(l)) => out.push(h * 16 + l),
                    _ => return None,
                }
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'...b'9' => Some(c - b'0'),
        b'a'...b'f' => Some(c - b'a' + 10),
        b'A'...b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
