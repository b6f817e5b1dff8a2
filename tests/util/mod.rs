#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::rc::Rc;

use tokio_core::io::Io;

use tk_serve::{FileIo, IoError, Status, Request, Reply};


/// An in-memory transport with scripted input
///
/// Each `read` hands out at most one scripted segment, so a test can
/// force how the byte stream is sliced into buffer refills. Once the
/// script runs dry reads report end-of-stream, which makes a connection
/// future finish instead of waiting forever.
#[derive(Clone)]
pub struct MockSock {
    inner: Rc<RefCell<SockInner>>,
}

struct SockInner {
    input: VecDeque<Vec<u8>>,
    output: Vec<u8>,
    write_sizes: Vec<usize>,
}

impl MockSock {
    pub fn new(segments: Vec<Vec<u8>>) -> MockSock {
        MockSock {
            inner: Rc::new(RefCell::new(SockInner {
                input: segments.into_iter().collect(),
                output: Vec::new(),
                write_sizes: Vec::new(),
            })),
        }
    }

    pub fn output(&self) -> Vec<u8> {
        self.inner.borrow().output.clone()
    }

    pub fn output_str(&self) -> String {
        String::from_utf8(self.output()).unwrap()
    }

    /// Size of every `write` call, in order
    pub fn write_sizes(&self) -> Vec<usize> {
        self.inner.borrow().write_sizes.clone()
    }
}

impl Read for MockSock {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.borrow_mut();
        let mut segment = match inner.input.pop_front() {
            Some(segment) => segment,
            None => return Ok(0),
        };
        if segment.len() > buf.len() {
            let rest = segment.split_off(buf.len());
            inner.input.push_front(rest);
        }
        buf[..segment.len()].copy_from_slice(&segment);
        Ok(segment.len())
    }
}

impl Write for MockSock {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.borrow_mut();
        inner.output.extend_from_slice(buf);
        inner.write_sizes.push(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Io for MockSock {}

/// A record of one `write_file` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    pub id: String,
    pub data: Vec<u8>,
    pub finished: bool,
}

/// An in-memory file store recording everything the server does to it
pub struct MockFiles {
    files: RefCell<HashMap<String, Vec<u8>>>,
    open_reads: RefCell<HashMap<String, (String, usize)>>,
    open_writes: RefCell<HashMap<String, Vec<u8>>>,
    finished: RefCell<HashMap<String, Vec<u8>>>,
    write_calls: RefCell<Vec<WriteCall>>,
    refuse_writes: Cell<bool>,
    double_open: Cell<bool>,
}

impl MockFiles {
    pub fn new() -> MockFiles {
        MockFiles {
            files: RefCell::new(HashMap::new()),
            open_reads: RefCell::new(HashMap::new()),
            open_writes: RefCell::new(HashMap::new()),
            finished: RefCell::new(HashMap::new()),
            write_calls: RefCell::new(Vec::new()),
            refuse_writes: Cell::new(false),
            double_open: Cell::new(false),
        }
    }

    /// Preload a file so GET requests can find it
    pub fn add_file(&self, path: &str, content: &[u8]) {
        self.files.borrow_mut().insert(path.to_string(),
                                       content.to_vec());
    }

    /// Make every `open_file_for_write` fail
    pub fn refuse_writes(&self) {
        self.refuse_writes.set(true);
    }

    /// Bytes fully uploaded under a write id
    pub fn finished_upload(&self, id: &str) -> Option<Vec<u8>> {
        self.finished.borrow().get(id).cloned()
    }

    pub fn write_calls(&self) -> Vec<WriteCall> {
        self.write_calls.borrow().clone()
    }

    pub fn open_read_count(&self) -> usize {
        self.open_reads.borrow().len()
    }

    pub fn open_write_count(&self) -> usize {
        self.open_writes.borrow().len()
    }

    /// True if any id was ever opened for writing twice without a close
    pub fn saw_double_open(&self) -> bool {
        self.double_open.get()
    }
}

impl FileIo for MockFiles {
    fn open_file_for_read(&self, id: &str, _request: &Request,
                          reply: &mut Reply) -> usize
    {
        let size = match self.files.borrow().get(&reply.file_path) {
            Some(content) => content.len(),
            None => return 0,
        };
        self.open_reads.borrow_mut()
            .insert(id.to_string(), (reply.file_path.clone(), 0));
        size
    }

    fn read_file(&self, id: &str, _request: &Request, buf: &mut [u8])
        -> usize
    {
        let mut reads = self.open_reads.borrow_mut();
        let &mut (ref path, ref mut pos) = match reads.get_mut(id) {
            Some(state) => state,
            None => return 0,
        };
        let files = self.files.borrow();
        let content = &files[path];
        let n = ::std::cmp::min(buf.len(), content.len() - *pos);
        buf[..n].copy_from_slice(&content[*pos..*pos + n]);
        *pos += n;
        n
    }

    fn open_file_for_write(&self, id: &str, _request: &Request,
                           _reply: &mut Reply) -> Result<Status, IoError>
    {
        if self.refuse_writes.get() {
            return Err(IoError::new(Status::Forbidden,
                                    "uploads are not allowed here"));
        }
        let mut writes = self.open_writes.borrow_mut();
        if writes.contains_key(id) {
            self.double_open.set(true);
        }
        writes.insert(id.to_string(), Vec::new());
        Ok(Status::Created)
    }

    fn write_file(&self, id: &str, _request: &Request, data: &[u8],
                  finished: bool) -> Result<Status, IoError>
    {
        self.write_calls.borrow_mut().push(WriteCall {
            id: id.to_string(),
            data: data.to_vec(),
            finished: finished,
        });
        let mut writes = self.open_writes.borrow_mut();
        {
            let buf = match writes.get_mut(id) {
                Some(buf) => buf,
                None => return Err(IoError::new(
                    Status::InternalServerError,
                    "no open file for this upload")),
            };
            buf.extend_from_slice(data);
        }
        if finished {
            let done = writes.remove(id).unwrap();
            self.finished.borrow_mut().insert(id.to_string(), done);
        }
        Ok(Status::Ok)
    }

    fn close_read_file(&self, id: &str) {
        self.open_reads.borrow_mut().remove(id);
    }

    fn close_write_file(&self, id: &str) {
        self.open_writes.borrow_mut().remove(id);
    }
}
