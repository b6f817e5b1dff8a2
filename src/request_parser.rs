use request::{Request, Header};


/// Verdict of feeding one more byte to the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseResult {
    /// A complete request has been parsed
    Good,
    /// The stream violates the grammar
    Bad,
    /// More bytes are required
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    MethodStart,
    Method,
    Uri,
    HttpVersionH,
    HttpVersionT1,
    HttpVersionT2,
    HttpVersionP,
    HttpVersionSlash,
    HttpVersionMajorStart,
    HttpVersionMajor,
    HttpVersionMinorStart,
    HttpVersionMinor,
    ExpectingNewline1,
    HeaderLineStart,
    HeaderLws,
    HeaderName,
    SpaceBeforeHeaderValue,
    HeaderValue,
    ExpectingNewline2,
    ExpectingNewline3,
}

/// Incremental parser for the request line and headers
///
/// The parser consumes one byte at a time and keeps its position in the
/// grammar between calls, so a request may arrive in arbitrarily sliced
/// socket reads. Bytes after the final CRLF are left untouched; they
/// belong to the request body.
#[derive(Debug)]
pub struct RequestParser {
    state: State,
}

impl RequestParser {
    pub fn new() -> RequestParser {
        RequestParser { state: State::MethodStart }
    }

    /// Forget all progress, ready for the next request
    pub fn reset(&mut self) {
        self.state = State::MethodStart;
    }

    /// Feeds a slice of input to the parser
    ///
    /// Returns the verdict and the number of bytes consumed. On `Good`
    /// the unconsumed remainder of the slice is the start of the request
    /// body.
    pub fn parse(&mut self, req: &mut Request, data: &[u8])
        -> (ParseResult, usize)
    {
        for (idx, &byte) in data.iter().enumerate() {
            match self.consume(req, byte) {
                ParseResult::Indeterminate => continue,
                result => return (result, idx + 1),
            }
        }
        (ParseResult::Indeterminate, data.len())
    }

    fn consume(&mut self, req: &mut Request, input: u8) -> ParseResult {
        use self::State::*;
        use self::ParseResult::*;
        match self.state {
            MethodStart => {
                if !is_token(input) {
                    return Bad;
                }
                self.state = Method;
                req.method.push(input as char);
                Indeterminate
            }
            Method => {
                if input == b' ' {
                    self.state = Uri;
                    return Indeterminate;
                }
                if !is_token(input) {
                    return Bad;
                }
                req.method.push(input as char);
                Indeterminate
            }
            Uri => {
                if input == b' ' {
                    self.state = HttpVersionH;
                    return Indeterminate;
                }
                if is_ctl(input) {
                    return Bad;
                }
                req.uri.push(input as char);
                Indeterminate
            }
            HttpVersionH => self.expect(input, b'H', HttpVersionT1),
            HttpVersionT1 => self.expect(input, b'T', HttpVersionT2),
            HttpVersionT2 => self.expect(input, b'T', HttpVersionP),
            HttpVersionP => self.expect(input, b'P', HttpVersionSlash),
            HttpVersionSlash => {
                self.expect(input, b'/', HttpVersionMajorStart)
            }
            HttpVersionMajorStart => {
                if !is_digit(input) {
                    return Bad;
                }
                req.http_version_major = (input - b'0') as u32;
                self.state = HttpVersionMajor;
                Indeterminate
            }
            HttpVersionMajor => {
                if input == b'.' {
                    self.state = HttpVersionMinorStart;
                    return Indeterminate;
                }
                if !is_digit(input) {
                    return Bad;
                }
                req.http_version_major =
                    req.http_version_major * 10 + (input - b'0') as u32;
                Indeterminate
            }
            HttpVersionMinorStart => {
                if !is_digit(input) {
                    return Bad;
                }
                req.http_version_minor = (input - b'0') as u32;
                self.state = HttpVersionMinor;
                Indeterminate
            }
            HttpVersionMinor => {
                if input == b'\r' {
                    self.state = ExpectingNewline1;
                    return Indeterminate;
                }
                if !is_digit(input) {
                    return Bad;
                }
                req.http_version_minor =
                    req.http_version_minor * 10 + (input - b'0') as u32;
                Indeterminate
            }
            ExpectingNewline1 => self.expect(input, b'\n', HeaderLineStart),
            HeaderLineStart => {
                match input {
                    b'\r' => {
                        self.state = ExpectingNewline3;
                        Indeterminate
                    }
                    b' ' | b'\t' if !req.headers.is_empty() => {
                        // folded continuation of the previous value
                        self.state = HeaderLws;
                        Indeterminate
                    }
                    c if is_token(c) => {
                        req.headers.push(Header {
                            name: (c as char).to_string(),
                            value: String::new(),
                        });
                        self.state = HeaderName;
                        Indeterminate
                    }
                    _ => Bad,
                }
            }
            HeaderLws => {
                match input {
                    b'\r' => {
                        self.state = ExpectingNewline2;
                        Indeterminate
                    }
                    b' ' | b'\t' => Indeterminate,
                    c if !is_ctl(c) => {
                        self.state = HeaderValue;
                        push_value(req, c);
                        Indeterminate
                    }
                    _ => Bad,
                }
            }
            HeaderName => {
                match input {
                    b':' => {
                        self.state = SpaceBeforeHeaderValue;
                        Indeterminate
                    }
                    c if is_token(c) => {
                        req.headers.last_mut()
                            .expect("a header is always open here")
                            .name.push(c as char);
                        Indeterminate
                    }
                    _ => Bad,
                }
            }
            SpaceBeforeHeaderValue => {
                match input {
                    b' ' => {
                        self.state = HeaderValue;
                        Indeterminate
                    }
                    b'\r' => {
                        self.state = ExpectingNewline2;
                        Indeterminate
                    }
                    c if !is_ctl(c) => {
                        // the space is optional
                        self.state = HeaderValue;
                        push_value(req, c);
                        Indeterminate
                    }
                    _ => Bad,
                }
            }
            HeaderValue => {
                match input {
                    b'\r' => {
                        self.state = ExpectingNewline2;
                        Indeterminate
                    }
                    c if !is_ctl(c) => {
                        push_value(req, c);
                        Indeterminate
                    }
                    _ => Bad,
                }
            }
            ExpectingNewline2 => self.expect(input, b'\n', HeaderLineStart),
            ExpectingNewline3 => {
                if input == b'\n' {
                    ParseResult::Good
                } else {
                    Bad
                }
            }
        }
    }

    fn expect(&mut self, input: u8, wanted: u8, next: State) -> ParseResult {
        if input == wanted {
            self.state = next;
            ParseResult::Indeterminate
        } else {
            ParseResult::Bad
        }
    }
}

fn push_value(req: &mut Request, c: u8) {
    req.headers.last_mut()
        .expect("a header is always open here")
        .value.push(c as char);
}

fn is_ctl(c: u8) -> bool {
    c < 32 || c == 127
}

fn is_tspecial(c: u8) -> bool {
    match c {
        b'(' | b')' | b'<' | b'>' | b'@' |
        b',' | b';' | b':' | b'\\' | b'"' |
        b'/' | b'[' | b']' | b'?' | b'=' |
        b'{' | b'}' | b' ' | b'\t' => true,
        _ => false,
    }
}

fn is_token(c: u8) -> bool {
    !is_ctl(c) && c < 128 && !is_tspecial(c)
}

fn is_digit(c: u8) -> bool {
    c >= b'0' && c <= b'9'
}
