use std::cell::RefCell;
use std::cmp::min;
use std::io::{self, Read, Write};
use std::rc::Rc;

use futures::{Future, Poll, Async};
use tokio_core::io::Io;

use enums::Status;
use error::Error;
use handler::{RequestHandler, WriteOutcome};
use reply::Reply;
use request::Request;
use request_parser::{RequestParser, ParseResult};
use server::manager::{ConnectionManager, ConnHandle};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    /// Parsing the request line and headers
    ReadingRequest,
    /// Draining the declared body into the buffer before dispatch
    ReadingInitialBody,
    /// Writing the serialized reply; `error` closes afterwards
    WritingReply { error: bool },
    /// Streaming the remaining chunks of a large file download
    WritingChunks,
    /// Feeding the remaining multipart body to the parser
    ReadingBody,
    Closed,
}

/// A single client connection, driven as a future
///
/// The future resolves when the connection is closed, whether by the
/// peer, by the keep-alive policy or by an error. It is generic over
/// the transport so tests can drive it over an in-memory socket.
pub struct Connection<S: Io> {
    sock: S,
    id: u64,
    handle: Rc<ConnHandle>,
    manager: ConnectionManager,
    dispatcher: Rc<RefCell<RequestHandler>>,
    max_content_size: usize,
    state: ConnState,
    parser: RequestParser,
    request: Request,
    reply: Reply,
    /// The body buffer; one refill of at most `max_content_size` bytes
    body: Vec<u8>,
    /// Valid bytes currently in the buffer
    body_len: usize,
    /// Bytes of the buffer already consumed by the request parser
    parsed: usize,
    /// Body bytes received over the whole request
    body_received: usize,
    /// Write progress through the serialized reply headers
    hdr_pos: usize,
    /// Write progress through the reply body or current chunk
    body_pos: usize,
    closed: bool,
}

impl<S: Io> Connection<S> {
    pub fn new(sock: S, id: u64, handle: Rc<ConnHandle>,
               manager: ConnectionManager,
               dispatcher: Rc<RefCell<RequestHandler>>,
               max_content_size: usize)
        -> Connection<S>
    {
        Connection {
            sock: sock,
            id: id,
            handle: handle,
            manager: manager,
            dispatcher: dispatcher,
            max_content_size: max_content_size,
            state: ConnState::ReadingRequest,
            parser: RequestParser::new(),
            request: Request::new(),
            reply: Reply::new(max_content_size),
            body: vec![0; max_content_size],
            body_len: 0,
            parsed: 0,
            body_received: 0,
            hdr_pos: 0,
            body_pos: 0,
            closed: false,
        }
    }

    fn cleanup(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.dispatcher.borrow().close_file(self.id, &self.reply);
        self.manager.remove(self.id);
        debug!("connection {} closed", self.id);
    }

    /// Reset the per-request state for the next request on this socket
    fn start_next_request(&mut self) {
        self.parser.reset();
        self.request.clear();
        self.reply = Reply::new(self.max_content_size);
        self.body_len = 0;
        self.parsed = 0;
        self.body_received = 0;
        self.hdr_pos = 0;
        self.body_pos = 0;
        self.state = ConnState::ReadingRequest;
    }

    /// The `Connection` header the reply should carry
    fn will_keep_alive(&self) -> bool {
        let max = self.manager.persistence().max_keep_alive_requests;
        self.request.keep_alive
            && (max == 0 || self.handle.served() + 1 < max)
            && (self.reply.is_multipart
                || self.body_received >= self.request.body_size)
    }

    /// Account the exchange and either reset for the next request or
    /// close
    fn finish_request(&mut self) {
        // release anything the exchange still holds in the file store
        self.dispatcher.borrow().close_file(self.id, &self.reply);
        let served = self.handle.add_served();
        self.handle.touch();
        let max = self.manager.persistence().max_keep_alive_requests;
        let keep = self.request.keep_alive
            && (max == 0 || served < max)
            && self.body_received >= self.request.body_size
            && !self.handle.is_stopped();
        if keep {
            self.start_next_request();
        } else {
            self.cleanup();
            self.state = ConnState::Closed;
        }
    }

    fn error_reply(&mut self, status: Status) {
        self.reply.stock_reply(status);
        self.start_reply_write(true);
    }

    /// Serialize-and-send a failure produced mid-stream
    fn failed_reply(&mut self) {
        self.start_reply_write(true);
    }

    fn start_reply_write(&mut self, error: bool) {
        let keep_alive = !error && self.will_keep_alive();
        self.reply.serialize(keep_alive);
        self.hdr_pos = 0;
        self.body_pos = 0;
        self.state = ConnState::WritingReply { error: error };
    }

    /// Run the handler chain on the parsed request
    fn dispatch(&mut self) {
        let is_form = self.request.get_header_value("Content-Type")
            .map(|v| v.contains("application/x-www-form-urlencoded"))
            .unwrap_or(false);
        if is_form && self.body_len > 0 {
            self.request.parse_form_body(&self.body[..self.body_len]);
        }
        {
            let dispatcher = self.dispatcher.borrow();
            dispatcher.handle_request(self.id, &self.request,
                                      &self.body[..self.body_len],
                                      &mut self.reply);
        }
        self.start_reply_write(false);
    }

    fn sock_read(&mut self, from: usize, to: usize)
        -> Poll<usize, io::Error>
    {
        loop {
            match self.sock.read(&mut self.body[from..to]) {
                Ok(bytes) => return Ok(Async::Ready(bytes)),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Async::NotReady);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes as much of `data[*pos..]` as the socket accepts
    fn sock_write(sock: &mut S, data: &[u8], pos: &mut usize)
        -> Poll<(), io::Error>
    {
        while *pos < data.len() {
            match sock.write(&data[*pos..]) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero,
                                              "socket write returned 0"));
                }
                Ok(bytes) => *pos += bytes,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Async::NotReady);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Async::Ready(()))
    }

    fn close_on_error(&mut self, err: io::Error) -> Error {
        debug!("connection {}: transport error: {}", self.id, err);
        self.cleanup();
        self.state = ConnState::Closed;
        Error::Io(err)
    }
}

impl<S: Io> Future for Connection<S> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        self.handle.register_task();
        loop {
            if self.handle.is_stopped()
                && self.state != ConnState::Closed
            {
                self.cleanup();
                self.state = ConnState::Closed;
            }
            match self.state {
                ConnState::ReadingRequest => {
                    if self.parsed < self.body_len {
                        let (result, consumed) = self.parser.parse(
                            &mut self.request,
                            &self.body[self.parsed..self.body_len]);
                        self.parsed += consumed;
                        match result {
                            ParseResult::Good => {
                                // unconsumed bytes are the body start
                                let leftover = self.body_len - self.parsed;
                                for i in 0..leftover {
                                    let byte = self.body[self.parsed + i];
                                    self.body[i] = byte;
                                }
                                self.body_len = leftover;
                                self.body_received = leftover;
                                self.parsed = 0;
                                if !self.request.finalize() {
                                    self.error_reply(Status::BadRequest);
                                    continue;
                                }
                                let want = min(self.max_content_size,
                                               self.request.body_size);
                                if self.body_len < want {
                                    self.state =
                                        ConnState::ReadingInitialBody;
                                } else {
                                    self.dispatch();
                                }
                                continue;
                            }
                            ParseResult::Bad => {
                                self.error_reply(Status::BadRequest);
                                continue;
                            }
                            ParseResult::Indeterminate => {}
                        }
                    }
                    if self.body_len == self.max_content_size {
                        // request head does not fit the buffer
                        self.error_reply(Status::BadRequest);
                        continue;
                    }
                    let top = self.max_content_size;
                    let from = self.body_len;
                    match self.sock_read(from, top) {
                        Ok(Async::Ready(0)) => {
                            debug!("connection {}: peer closed", self.id);
                            self.cleanup();
                            return Ok(Async::Ready(()));
                        }
                        Ok(Async::Ready(bytes)) => {
                            self.body_len += bytes;
                            self.handle.touch();
                        }
                        Ok(Async::NotReady) => return Ok(Async::NotReady),
                        Err(e) => return Err(self.close_on_error(e)),
                    }
                }
                ConnState::ReadingInitialBody => {
                    let want = min(self.max_content_size,
                                   self.request.body_size);
                    if self.body_len >= want {
                        self.dispatch();
                        continue;
                    }
                    let from = self.body_len;
                    match self.sock_read(from, want) {
                        Ok(Async::Ready(0)) => {
                            debug!("connection {}: peer closed mid-body",
                                   self.id);
                            self.cleanup();
                            return Ok(Async::Ready(()));
                        }
                        Ok(Async::Ready(bytes)) => {
                            self.body_len += bytes;
                            self.body_received += bytes;
                            self.handle.touch();
                        }
                        Ok(Async::NotReady) => return Ok(Async::NotReady),
                        Err(e) => return Err(self.close_on_error(e)),
                    }
                }
                ConnState::WritingReply { error } => {
                    {
                        let sock = &mut self.sock;
                        match Self::sock_write(
                            sock, self.reply.header_data(),
                            &mut self.hdr_pos)
                        {
                            Ok(Async::Ready(())) => {}
                            Ok(Async::NotReady) => {
                                return Ok(Async::NotReady);
                            }
                            Err(e) => {
                                debug!("connection {}: write error: {}",
                                       self.id, e);
                                self.cleanup();
                                return Err(Error::Io(e));
                            }
                        }
                        match Self::sock_write(
                            sock, self.reply.body_data(),
                            &mut self.body_pos)
                        {
                            Ok(Async::Ready(())) => {}
                            Ok(Async::NotReady) => {
                                return Ok(Async::NotReady);
                            }
                            Err(e) => {
                                debug!("connection {}: write error: {}",
                                       self.id, e);
                                self.cleanup();
                                return Err(Error::Io(e));
                            }
                        }
                    }
                    self.handle.touch();
                    if error {
                        self.cleanup();
                        self.state = ConnState::Closed;
                        continue;
                    }
                    if self.reply.reply_partial && !self.reply.final_part {
                        // load the next chunk; the first one just went
                        // out with the headers
                        let dispatcher = self.dispatcher.clone();
                        dispatcher.borrow().handle_partial_read(
                            self.id, &self.request, &mut self.reply);
                        self.body_pos = 0;
                        self.state = ConnState::WritingChunks;
                        continue;
                    }
                    let more_body = self.reply.is_multipart
                        && self.reply.status().is_success()
                        && self.body_received < self.request.body_size;
                    if more_body {
                        self.state = ConnState::ReadingBody;
                        continue;
                    }
                    self.finish_request();
                }
                ConnState::WritingChunks => {
                    {
                        let sock = &mut self.sock;
                        match Self::sock_write(
                            sock, &self.reply.content, &mut self.body_pos)
                        {
                            Ok(Async::Ready(())) => {}
                            Ok(Async::NotReady) => {
                                return Ok(Async::NotReady);
                            }
                            Err(e) => {
                                debug!("connection {}: write error: {}",
                                       self.id, e);
                                self.cleanup();
                                return Err(Error::Io(e));
                            }
                        }
                    }
                    self.handle.touch();
                    if self.reply.final_part {
                        self.finish_request();
                        continue;
                    }
                    let dispatcher = self.dispatcher.clone();
                    dispatcher.borrow().handle_partial_read(
                        self.id, &self.request, &mut self.reply);
                    self.body_pos = 0;
                }
                ConnState::ReadingBody => {
                    if self.body_received >= self.request.body_size {
                        self.finish_request();
                        continue;
                    }
                    let remaining =
                        self.request.body_size - self.body_received;
                    let cap = min(self.max_content_size, remaining);
                    match self.sock_read(0, cap) {
                        Ok(Async::Ready(0)) => {
                            debug!("connection {}: peer closed mid-upload",
                                   self.id);
                            self.cleanup();
                            return Ok(Async::Ready(()));
                        }
                        Ok(Async::Ready(bytes)) => {
                            self.body_received += bytes;
                            self.handle.touch();
                            let outcome = {
                                let dispatcher = self.dispatcher.borrow();
                                dispatcher.handle_partial_write(
                                    self.id, &self.request,
                                    &self.body[..bytes], &mut self.reply)
                            };
                            match outcome {
                                WriteOutcome::MoreData => {}
                                WriteOutcome::Done => self.finish_request(),
                                WriteOutcome::Failed => self.failed_reply(),
                            }
                        }
                        Ok(Async::NotReady) => return Ok(Async::NotReady),
                        Err(e) => return Err(self.close_on_error(e)),
                    }
                }
                ConnState::Closed => {
                    self.cleanup();
                    return Ok(Async::Ready(()));
                }
            }
        }
    }
}

impl<S: Io> Drop for Connection<S> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
