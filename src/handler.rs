use std::collections::VecDeque;
use std::rc::Rc;

use enums::Status;
use files::{FileIo, IoError};
use multipart::{MultipartResult, ContentPart};
use reply::Reply;
use request::Request;


/// A user-supplied request handler
///
/// Handlers run in registration order; a handler that calls one of the
/// reply's `send` methods ends the chain and skips the built-in file
/// dispatch.
pub type HandlerCallback = Box<Fn(&Request, &mut Reply)>;

/// What a body refill did to the multipart write flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// More body bytes are required
    MoreData,
    /// The terminal boundary was processed
    Done,
    /// The stream was malformed or the file store refused; the reply
    /// carries the error
    Failed,
}

/// The common dispatcher for all incoming requests
pub struct RequestHandler {
    file_io: Option<Rc<FileIo>>,
    handlers: Vec<HandlerCallback>,
    file_not_found: HandlerCallback,
}

impl RequestHandler {
    pub fn new(file_io: Option<Rc<FileIo>>) -> RequestHandler {
        RequestHandler {
            file_io: file_io,
            handlers: Vec::new(),
            file_not_found: Box::new(|_req: &Request, rep: &mut Reply| {
                rep.stock_reply(Status::NotFound);
            }),
        }
    }

    pub fn add_request_handler(&mut self, callback: HandlerCallback) {
        self.handlers.push(callback);
    }

    pub fn set_file_not_found_handler(&mut self, callback: HandlerCallback) {
        self.file_not_found = callback;
    }

    /// Dispatches a fully parsed request
    ///
    /// `content` is the part of the request body already sitting in the
    /// connection's buffer when the headers completed.
    pub fn handle_request(&self, connection_id: u64, req: &Request,
                          content: &[u8], rep: &mut Reply)
    {
        rep.file_path = req.request_path.clone();

        let last_slash = req.request_path.rfind('/');
        if let Some(dot) = req.request_path.rfind('.') {
            if last_slash.map(|slash| dot > slash).unwrap_or(true) {
                rep.file_extension =
                    req.request_path[dot + 1..].to_string();
            }
        }

        // a directory wants its index page
        if req.method == "GET" && rep.file_path.ends_with('/') {
            rep.file_path.push_str("index.html");
            rep.file_extension = "html".to_string();
        }

        for handler in &self.handlers {
            handler(req, rep);
            if rep.return_to_client {
                return;
            }
        }

        if self.file_io.is_some() {
            if req.method == "POST" && rep.multipart.parse_header(req) {
                rep.status = Status::Ok;
                rep.is_multipart = true;
                self.handle_partial_write(connection_id, req, content, rep);
                return;
            } else if req.method == "GET" {
                if self.open_and_read_file(connection_id, req, rep) {
                    return;
                }
            }
        }

        (self.file_not_found)(req, rep);
    }

    /// Fills the reply with the next chunk of an ongoing file download
    pub fn handle_partial_read(&self, connection_id: u64, req: &Request,
                               rep: &mut Reply)
    {
        let read = self.read_from_file(connection_id, req, rep);
        if read < rep.max_content_size {
            rep.final_part = true;
            if let Some(ref file_io) = self.file_io {
                file_io.close_read_file(&connection_id.to_string());
            }
        }
    }

    /// Feeds one refill of the request body to the multipart parser and
    /// writes the resulting parts to the file store
    pub fn handle_partial_write(&self, connection_id: u64, req: &Request,
                                content: &[u8], rep: &mut Reply)
        -> WriteOutcome
    {
        let mut parts = VecDeque::new();
        let result = rep.multipart.parse(content, &mut parts);

        if result == MultipartResult::Bad {
            rep.stock_reply(Status::BadRequest);
            return WriteOutcome::Failed;
        }

        if !self.write_file_parts(connection_id, req, rep, &mut parts) {
            return WriteOutcome::Failed;
        }

        if result == MultipartResult::Done {
            rep.multipart.flush(&mut parts);
            if !self.write_file_parts(connection_id, req, rep, &mut parts) {
                return WriteOutcome::Failed;
            }
        }

        // done with the buffer contents unless an error message must go
        // back to the client
        if rep.status.is_success() {
            rep.content.clear();
        }

        if result == MultipartResult::Done {
            WriteOutcome::Done
        } else {
            WriteOutcome::MoreData
        }
    }

    /// Closes whatever file handles a connection still holds
    pub fn close_file(&self, connection_id: u64, rep: &Reply) {
        if let Some(ref file_io) = self.file_io {
            file_io.close_read_file(&connection_id.to_string());
            if !rep.last_write_id.is_empty() {
                file_io.close_write_file(&rep.last_write_id);
            }
        }
    }

    fn open_and_read_file(&self, connection_id: u64, req: &Request,
                          rep: &mut Reply) -> bool
    {
        let size = match self.file_io {
            Some(ref file_io) => {
                file_io.open_file_for_read(&connection_id.to_string(),
                                           req, rep)
            }
            None => 0,
        };
        if size == 0 {
            return false;
        }
        rep.reply_partial = size > rep.max_content_size;
        rep.status = Status::Ok;
        self.read_from_file(connection_id, req, rep);
        if !rep.reply_partial {
            // the whole body fits in the initial chunk
            if let Some(ref file_io) = self.file_io {
                file_io.close_read_file(&connection_id.to_string());
            }
        }
        // Content-Length always carries the full file size
        rep.content_length = Some(size as u64);
        true
    }

    fn read_from_file(&self, connection_id: u64, req: &Request,
                      rep: &mut Reply) -> usize
    {
        let file_io = match self.file_io {
            Some(ref file_io) => file_io,
            None => return 0,
        };
        let max = rep.max_content_size;
        rep.content.resize(max, 0);
        let read = file_io.read_file(&connection_id.to_string(), req,
                                     &mut rep.content);
        rep.content.truncate(read);
        read
    }

    fn write_file_parts(&self, connection_id: u64, req: &Request,
                        rep: &mut Reply, parts: &mut VecDeque<ContentPart>)
        -> bool
    {
        let file_io = match self.file_io {
            Some(ref file_io) => file_io.clone(),
            None => return true,
        };

        // Clients usually deliver the part headers at the tail of one
        // refill and the body in the next. Opening the file as soon as
        // the headers are peeked lets the open status reach the reply
        // before the body data arrives.
        let upcoming: Vec<String> = rep.multipart.peak_last_part().iter()
            .filter(|part| part.header_only && !part.filename.is_empty())
            .map(|part| part.filename.clone())
            .collect();
        for filename in upcoming {
            rep.file_path = format!("{}{}", req.request_path, filename);
            let id = format!("{}{}", rep.file_path, connection_id);
            match file_io.open_file_for_write(&id, req, rep) {
                Ok(status) => rep.status = status,
                Err(err) => {
                    fail_reply(rep, err);
                    return false;
                }
            }
        }

        while let Some(part) = parts.pop_front() {
            if part.header_only && !part.filename.is_empty() {
                // already opened when this part was peeked
                let path = format!("{}{}", req.request_path, part.filename);
                rep.last_write_id = format!("{}{}", path, connection_id);
                continue;
            }
            if !part.filename.is_empty() {
                // headers and body arrived in one refill; the open (and
                // therefore its status) happens a refill late
                rep.file_path =
                    format!("{}{}", req.request_path, part.filename);
                rep.last_write_id =
                    format!("{}{}", rep.file_path, connection_id);
                let id = rep.last_write_id.clone();
                match file_io.open_file_for_write(&id, req, rep) {
                    Ok(status) => rep.status = status,
                    Err(err) => {
                        fail_reply(rep, err);
                        return false;
                    }
                }
            }
            let id = rep.last_write_id.clone();
            match file_io.write_file(&id, req, part.bytes(),
                                     part.found_end) {
                Ok(status) => rep.status = status,
                Err(err) => {
                    rep.last_write_id.clear();
                    fail_reply(rep, err);
                    return false;
                }
            }
            if part.found_end {
                rep.last_write_id.clear();
            }
        }
        true
    }
}

fn fail_reply(rep: &mut Reply, err: IoError) {
    rep.status = err.status;
    let mut content = err.message.into_bytes();
    content.extend_from_slice(&rep.content);
    rep.content = content;
}
