use std::collections::VecDeque;

use request::Request;


/// Verdict of one multipart parser invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartResult {
    /// The terminal boundary was already consumed earlier; the call was
    /// a no-op
    Good,
    /// The stream is malformed
    Bad,
    /// More body bytes are required
    Indeterminate,
    /// The terminal boundary was observed; call `flush` to drain the
    /// held-back parts
    Done,
}

/// A slice of one buffer refill belonging to a single file part
///
/// `start..end` is the byte range the slice occupied in the body buffer.
/// Because parts are delivered one refill late while the buffer is
/// refilled in place, a delivered part carries its own copy of the
/// bytes; read them through [`bytes`](#method.bytes).
#[derive(Debug, Clone)]
pub struct ContentPart {
    /// Filename declared in the part headers, empty for continuations
    pub filename: String,
    /// The slice carried part headers only, no body bytes yet
    pub header_only: bool,
    /// The first byte of the part body is inside this slice
    pub found_start: bool,
    /// The last byte of the part body is inside this slice
    pub found_end: bool,
    pub start: usize,
    pub end: usize,
    data: Vec<u8>,
}

impl ContentPart {
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    fn continuation(start: usize, end: usize) -> ContentPart {
        ContentPart {
            filename: String::new(),
            header_only: false,
            found_start: false,
            found_end: false,
            start: start,
            end: end,
            data: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Matching the wire boundary at the very start of the body
    Preamble { matched: usize },
    /// Right after a boundary: CRLF opens part headers, `--` ends the
    /// stream
    BoundaryTail { seen: Option<u8> },
    /// Scanning part headers for the empty line
    Headers,
    /// Consuming part body bytes
    Body,
    /// A prefix of `CRLF--<boundary>` reached the end of the previous
    /// refill; the rest must be verified against the next one
    Terminator { matched: usize },
    Finished,
}

/// Streaming `multipart/form-data` parser
///
/// The parser is fed the connection's body buffer once per refill and
/// appends `ContentPart` descriptors to a caller-provided queue. Parts
/// are emitted one refill late: the most recently observed parts are
/// held back so the caller can inspect them with `peak_last_part` and
/// open the destination file before the body data arrives. Once `parse`
/// returns `Done` the caller must `flush` to obtain the held-back tail.
#[derive(Debug)]
pub struct MultipartParser {
    /// `--` + declared boundary
    boundary: Vec<u8>,
    /// `\r\n--` + declared boundary, the only sequence that ends a part
    terminator: Vec<u8>,
    state: State,
    held: VecDeque<ContentPart>,
}

impl MultipartParser {
    pub fn new() -> MultipartParser {
        MultipartParser {
            boundary: Vec::new(),
            terminator: Vec::new(),
            state: State::Preamble { matched: 0 },
            held: VecDeque::new(),
        }
    }

    /// Configures the parser from the request's `Content-Type`
    ///
    /// The `boundary=` parameter is accepted at any position among the
    /// `;`-separated parameters, quoted or not. Returns false when the
    /// header is missing, is not `multipart/form-data` or carries no
    /// boundary.
    pub fn parse_header(&mut self, req: &Request) -> bool {
        let ctype = match req.get_header_value("Content-Type") {
            Some(value) => value,
            None => return false,
        };
        if !ctype.contains("multipart/form-data") {
            return false;
        }
        for param in ctype.split(';') {
            let param = param.trim();
            if param.starts_with("boundary=") {
                let mut value = &param["boundary=".len()..];
                if value.len() >= 2 && value.starts_with('"')
                    && value.ends_with('"')
                {
                    value = &value[1..value.len() - 1];
                }
                if value.is_empty() {
                    return false;
                }
                self.boundary = format!("--{}", value).into_bytes();
                self.terminator = format!("\r\n--{}", value).into_bytes();
                return true;
            }
        }
        false
    }

    /// Borrow of the parts found in the most recent refill
    ///
    /// These are the parts the next `parse` call will deliver; peeking
    /// lets the caller learn the upcoming filename before the body
    /// arrives.
    pub fn peak_last_part(&self) -> &VecDeque<ContentPart> {
        &self.held
    }

    /// Drains the held-back parts after `Done`
    pub fn flush(&mut self, parts: &mut VecDeque<ContentPart>) {
        while let Some(part) = self.held.pop_front() {
            parts.push_back(part);
        }
    }

    /// Consumes one refill of the body buffer
    ///
    /// Parts found in the *previous* refill are appended to `parts`;
    /// parts found in this one are withheld until the next call (or
    /// `flush`).
    pub fn parse(&mut self, content: &[u8],
                 parts: &mut VecDeque<ContentPart>)
        -> MultipartResult
    {
        if self.boundary.is_empty() {
            return MultipartResult::Bad;
        }
        if self.state == State::Finished {
            return MultipartResult::Good;
        }
        let len = content.len();
        let mut pos = 0;

        // a terminator prefix left hanging at the previous buffer's edge
        // must be resolved before the withheld parts may be delivered
        if let State::Terminator { matched } = self.state {
            let want = self.terminator.len() - matched;
            let have = if want < len { want } else { len };
            if content[..have] != self.terminator[matched..matched + have] {
                // false alarm: the cut-off bytes were body bytes
                if let Some(last) = self.held.back_mut() {
                    last.found_end = false;
                    last.end += matched;
                    let tail = self.terminator[..matched].to_vec();
                    last.data.extend(tail);
                }
                self.state = State::Body;
            } else if have < want {
                self.state = State::Terminator { matched: matched + have };
                return MultipartResult::Indeterminate;
            } else {
                pos = have;
                self.state = State::BoundaryTail { seen: None };
            }
        }

        while let Some(part) = self.held.pop_front() {
            parts.push_back(part);
        }

        let mut fresh: Vec<ContentPart> = Vec::new();
        // filename and body offset of a part whose headers were parsed
        // inside this very refill
        let mut opened: Option<(String, usize)> = None;
        let mut verdict = MultipartResult::Indeterminate;

        loop {
            match self.state {
                State::Preamble { matched } => {
                    let want = self.boundary.len() - matched;
                    let have = if want < len - pos { want } else { len - pos };
                    if content[pos..pos + have]
                        != self.boundary[matched..matched + have]
                    {
                        // no recognizable boundary in the first refill:
                        // assume a continuation spanning the whole
                        // buffer and resynchronize on a later terminator
                        fresh.push(ContentPart::continuation(0, len));
                        self.state = State::Body;
                        break;
                    }
                    if have < want {
                        self.state =
                            State::Preamble { matched: matched + have };
                        break;
                    }
                    pos += have;
                    self.state = State::BoundaryTail { seen: None };
                }
                State::BoundaryTail { seen } => {
                    if pos >= len {
                        break;
                    }
                    let ch = content[pos];
                    pos += 1;
                    match (seen, ch) {
                        (None, b'\r') | (None, b'-') => {
                            self.state =
                                State::BoundaryTail { seen: Some(ch) };
                        }
                        (Some(b'\r'), b'\n') => {
                            self.state = State::Headers;
                        }
                        (Some(b'-'), b'-') => {
                            self.state = State::Finished;
                            verdict = MultipartResult::Done;
                        }
                        _ => return MultipartResult::Bad,
                    }
                }
                State::Headers => {
                    match find(&content[pos..], b"\r\n\r\n") {
                        Some(idx) => {
                            let filename =
                                extract_filename(&content[pos..pos + idx]);
                            let body_start = pos + idx + 4;
                            if body_start >= len {
                                // lookahead: headers ended flush with
                                // the buffer, the body is yet to come
                                fresh.push(ContentPart {
                                    filename: filename,
                                    header_only: true,
                                    found_start: false,
                                    found_end: false,
                                    start: body_start,
                                    end: body_start,
                                    data: Vec::new(),
                                });
                                self.state = State::Body;
                                break;
                            }
                            opened = Some((filename, body_start));
                            pos = body_start;
                            self.state = State::Body;
                        }
                        None => {
                            // part headers spill into the next refill;
                            // emit the buffer as a best-effort
                            // continuation and keep looking
                            fresh.push(ContentPart::continuation(0, len));
                            break;
                        }
                    }
                }
                State::Body => {
                    if pos >= len && opened.is_none() {
                        break;
                    }
                    let (filename, found_start, start) = match opened.take() {
                        Some((name, at)) => (name, true, at),
                        None => (String::new(), false, pos),
                    };
                    match find(&content[pos..], &self.terminator) {
                        Some(idx) => {
                            let end = pos + idx;
                            fresh.push(ContentPart {
                                filename: filename,
                                header_only: false,
                                found_start: found_start,
                                found_end: true,
                                start: start,
                                end: end,
                                data: Vec::new(),
                            });
                            pos = end + self.terminator.len();
                            self.state = State::BoundaryTail { seen: None };
                        }
                        None => {
                            let hang =
                                suffix_prefix(&content[pos..],
                                              &self.terminator);
                            fresh.push(ContentPart {
                                filename: filename,
                                header_only: false,
                                found_start: found_start,
                                found_end: hang > 0,
                                start: start,
                                end: len - hang,
                                data: Vec::new(),
                            });
                            if hang > 0 {
                                self.state =
                                    State::Terminator { matched: hang };
                            }
                            break;
                        }
                    }
                }
                State::Terminator { .. } => unreachable!(),
                State::Finished => break,
            }
        }

        // withhold this refill's parts, carrying their bytes across the
        // in-place refill of the buffer
        for mut part in fresh {
            if part.end > part.start {
                part.data = content[part.start..part.end].to_vec();
            }
            self.held.push_back(part);
        }
        verdict
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Length of the longest proper prefix of `needle` that ends `haystack`
fn suffix_prefix(haystack: &[u8], needle: &[u8]) -> usize {
    let top = if needle.len() - 1 < haystack.len() {
        needle.len() - 1
    } else {
        haystack.len()
    };
    for l in (1..top + 1).rev() {
        if haystack[haystack.len() - l..] == needle[..l] {
            return l;
        }
    }
    0
}

fn extract_filename(headers: &[u8]) -> String {
    match find(headers, b"filename=\"") {
        Some(idx) => {
            let rest = &headers[idx + b"filename=\"".len()..];
            match rest.iter().position(|&c| c == b'"') {
                Some(quote) => {
                    String::from_utf8_lossy(&rest[..quote]).into_owned()
                }
                None => String::new(),
            }
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod test {
    use super::{find, suffix_prefix, extract_filename};

    #[test]
    fn find_plain() {
        assert_eq!(find(b"abcdef", b"cd"), Some(2));
        assert_eq!(find(b"abcdef", b"fg"), None);
        assert_eq!(find(b"ab", b"abc"), None);
    }

    #[test]
    fn suffix_prefix_lengths() {
        assert_eq!(suffix_prefix(b"data\r\n--bou", b"\r\n--boundary"), 7);
        assert_eq!(suffix_prefix(b"data\r\n", b"\r\n--boundary"), 2);
        assert_eq!(suffix_prefix(b"data\r", b"\r\n--boundary"), 1);
        assert_eq!(suffix_prefix(b"data", b"\r\n--boundary"), 0);
        // a full match is not a hanging prefix
        assert_eq!(suffix_prefix(b"\r\n--bx", b"\r\n--bx"), 0);
    }

    #[test]
    fn filename_extraction() {
        assert_eq!(extract_filename(
            b"Content-Disposition: form-data; name=\"f\"; \
              filename=\"a.txt\"\r\nContent-Type: text/plain"),
            "a.txt");
        assert_eq!(extract_filename(b"Content-Disposition: form-data"), "");
    }
}
