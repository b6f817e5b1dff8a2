use std::io::Write;

use netbuf::Buf;

use enums::Status;
use multipart::MultipartParser;
use request::Header;


const STOCK_PART1: &'static str = "<html><head><title>";
const STOCK_PART2: &'static str = "</title></head><body><h1>";
const STOCK_PART3: &'static str = "</h1></body></html>";

/// The reply to be sent back for one request
///
/// Handlers fill in the body and call one of the `send` methods; the
/// built-in file flows drive the streaming fields. The underlying body
/// storage must not move until the socket write completes, which is why
/// the zero-copy variant takes a `&'static` slice.
pub struct Reply {
    /// Content to be sent in the reply
    pub content: Vec<u8>,
    /// Path into the file store, seeded from the request path
    pub file_path: String,
    /// Extension of `file_path`, used for the `Content-Type` lookup
    pub file_extension: String,
    pub(crate) status: Status,
    pub(crate) content_type: Option<String>,
    /// Total body size when it exceeds one chunk
    pub(crate) content_length: Option<u64>,
    pub(crate) added_headers: Vec<Header>,
    pub(crate) return_to_client: bool,
    pub(crate) static_content: Option<&'static [u8]>,
    pub(crate) max_content_size: usize,
    pub(crate) reply_partial: bool,
    pub(crate) final_part: bool,
    pub(crate) is_multipart: bool,
    pub(crate) multipart: MultipartParser,
    /// Id of the most recently opened write handle in a multipart flow
    pub(crate) last_write_id: String,
    header_buf: Buf,
}

impl Reply {
    pub fn new(max_content_size: usize) -> Reply {
        Reply {
            content: Vec::new(),
            file_path: String::new(),
            file_extension: String::new(),
            status: Status::NotFound,
            content_type: None,
            content_length: None,
            added_headers: Vec::new(),
            return_to_client: false,
            static_content: None,
            max_content_size: max_content_size,
            reply_partial: false,
            final_part: false,
            is_multipart: false,
            multipart: MultipartParser::new(),
            last_write_id: String::new(),
            header_buf: Buf::new(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Prepare the reply for delivery with the accumulated `content`
    ///
    /// Short-circuits the rest of the handler chain and the built-in
    /// file dispatch.
    pub fn send(&mut self, status: Status) {
        self.status = status;
        self.return_to_client = true;
    }

    /// Like `send`, with an explicit `Content-Type`
    pub fn send_with_content_type(&mut self, status: Status,
                                  content_type: &str)
    {
        self.content_type = Some(content_type.to_string());
        self.send(status);
    }

    /// Prepare a zero-copy reply
    ///
    /// The data is not copied into the reply; the `'static` lifetime
    /// guarantees it outlives the socket write.
    pub fn send_static(&mut self, status: Status, content_type: &str,
                       data: &'static [u8])
    {
        self.static_content = Some(data);
        self.send_with_content_type(status, content_type);
    }

    /// Append a response header
    ///
    /// Duplicate names are permitted and emitted in order. Names or
    /// values carrying CR or LF are dropped at serialization time.
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.added_headers.push(Header {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    /// Populate a canonical HTML body for an error status
    pub fn stock_reply(&mut self, status: Status) {
        self.status = status;
        self.content.clear();
        write!(&mut self.content, "{p1}{reason}{p2}{code} {reason}{p3}",
               p1 = STOCK_PART1, p2 = STOCK_PART2, p3 = STOCK_PART3,
               code = status.code(), reason = status.reason())
            .expect("writing to a buffer always succeeds");
        self.static_content = None;
        self.content_type = Some("text/html".to_string());
        self.content_length = None;
        self.reply_partial = false;
        self.final_part = false;
        self.return_to_client = true;
    }

    /// The reply body as it goes onto the wire
    pub fn body_data(&self) -> &[u8] {
        match self.static_content {
            Some(data) => data,
            None => &self.content,
        }
    }

    /// The serialized status line and headers; valid after `serialize`
    pub fn header_data(&self) -> &[u8] {
        &self.header_buf[..]
    }

    /// Serializes the status line and all headers
    ///
    /// The result is kept in the reply so that the header view and the
    /// body view can be written as one vectored pair.
    pub(crate) fn serialize(&mut self, keep_alive: bool) {
        let length = self.content_length
            .unwrap_or(self.body_data().len() as u64);
        let ctype = match self.content_type {
            Some(ref explicit) => explicit.clone(),
            None => content_type_for(&self.file_extension).to_string(),
        };
        let mut buf = Buf::new();
        write!(buf, "HTTP/1.1 {} {}\r\n",
               self.status.code(), self.status.reason())
            .expect("writing to a buffer always succeeds");
        write!(buf, "Content-Length: {}\r\n", length).unwrap();
        write!(buf, "Content-Type: {}\r\n", ctype).unwrap();
        for header in &self.added_headers {
            if invalid_header(header.name.as_bytes())
                || invalid_header(header.value.as_bytes())
            {
                debug!("dropping response header {:?} with invalid bytes",
                       header.name);
                continue;
            }
            write!(buf, "{}: {}\r\n", header.name, header.value).unwrap();
        }
        write!(buf, "Connection: {}\r\n",
               if keep_alive { "keep-alive" } else { "close" }).unwrap();
        buf.write_all(b"\r\n").unwrap();
        self.header_buf = buf;
    }
}

fn invalid_header(value: &[u8]) -> bool {
    return value.iter().any(|&x| x == b'\r' || x == b'\n')
}

/// `Content-Type` for a file extension, via the MIME collaborator
fn content_type_for(extension: &str) -> &'static str {
    if extension.is_empty() {
        return "text/plain";
    }
    ::mime_guess::from_ext(extension).first_raw()
        .unwrap_or("text/plain")
}
