use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write, ErrorKind};
use std::path::PathBuf;

use enums::Status;
use reply::Reply;
use request::Request;


/// Failure reported by a file store
///
/// The status ends up on the reply and the message is prepended to the
/// response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoError {
    pub status: Status,
    pub message: String,
}

impl IoError {
    pub fn new(status: Status, message: &str) -> IoError {
        IoError { status: status, message: message.to_string() }
    }
}

/// Capability interface of a file store
///
/// The server only consumes this interface; backends may live on a
/// filesystem, in flash or in memory. Ids are composed by the driver:
/// the bare connection id for reads, the logical path plus the
/// connection id for writes, so concurrent transfers never share an id.
/// Implementations must tolerate concurrent opens from distinct ids and
/// treat closing an unknown id as a no-op.
pub trait FileIo {
    /// Opens `reply.file_path` for reading; returns the total size in
    /// bytes, or 0 when the file is not available
    fn open_file_for_read(&self, id: &str, request: &Request,
                          reply: &mut Reply) -> usize;

    /// Sequential read from the current position, up to `buf.len()`
    /// bytes
    fn read_file(&self, id: &str, request: &Request, buf: &mut [u8])
        -> usize;

    /// Opens `reply.file_path` for writing
    fn open_file_for_write(&self, id: &str, request: &Request,
                           reply: &mut Reply) -> Result<Status, IoError>;

    /// Streaming append; `finished` marks the final chunk for this id
    /// and closes the handle
    fn write_file(&self, id: &str, request: &Request, data: &[u8],
                  finished: bool) -> Result<Status, IoError>;

    /// Idempotent; unknown ids are ignored
    fn close_read_file(&self, id: &str);

    /// Idempotent; unknown ids are ignored
    fn close_write_file(&self, id: &str);
}

/// A file store over a directory of the local filesystem
pub struct DiskFiles {
    doc_root: PathBuf,
    read_files: RefCell<HashMap<String, fs::File>>,
    write_files: RefCell<HashMap<String, fs::File>>,
}

impl DiskFiles {
    pub fn new<P: Into<PathBuf>>(doc_root: P) -> DiskFiles {
        DiskFiles {
            doc_root: doc_root.into(),
            read_files: RefCell::new(HashMap::new()),
            write_files: RefCell::new(HashMap::new()),
        }
    }

    fn resolve(&self, file_path: &str) -> PathBuf {
        self.doc_root.join(file_path.trim_left_matches('/'))
    }
}

impl FileIo for DiskFiles {
    fn open_file_for_read(&self, id: &str, _request: &Request,
                          reply: &mut Reply) -> usize
    {
        let path = self.resolve(&reply.file_path);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(_) => return 0,
        };
        let size = match file.metadata() {
            Ok(meta) => meta.len() as usize,
            Err(_) => return 0,
        };
        self.read_files.borrow_mut().insert(id.to_string(), file);
        size
    }

    fn read_file(&self, id: &str, _request: &Request, buf: &mut [u8])
        -> usize
    {
        let mut files = self.read_files.borrow_mut();
        let file = match files.get_mut(id) {
            Some(file) => file,
            None => return 0,
        };
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        total
    }

    fn open_file_for_write(&self, id: &str, _request: &Request,
                           reply: &mut Reply) -> Result<Status, IoError>
    {
        let path = self.resolve(&reply.file_path);
        let existed = path.exists();
        match fs::File::create(&path) {
            Ok(file) => {
                self.write_files.borrow_mut().insert(id.to_string(), file);
                Ok(if existed { Status::Ok } else { Status::Created })
            }
            Err(e) => Err(IoError::new(Status::InternalServerError,
                &format!("cannot open {:?} for writing: {}", path, e))),
        }
    }

    fn write_file(&self, id: &str, _request: &Request, data: &[u8],
                  finished: bool) -> Result<Status, IoError>
    {
        let mut files = self.write_files.borrow_mut();
        let failed = match files.get_mut(id) {
            Some(file) => {
                match file.write_all(data) {
                    Ok(()) => None,
                    Err(e) => Some(IoError::new(
                        Status::InternalServerError,
                        &format!("write failed: {}", e))),
                }
            }
            None => Some(IoError::new(Status::InternalServerError,
                                      "no open file for this upload")),
        };
        if let Some(err) = failed {
            files.remove(id);
            return Err(err);
        }
        if finished {
            files.remove(id);
        }
        Ok(Status::Ok)
    }

    fn close_read_file(&self, id: &str) {
        self.read_files.borrow_mut().remove(id);
    }

    fn close_write_file(&self, id: &str) {
        self.write_files.borrow_mut().remove(id);
    }
}
