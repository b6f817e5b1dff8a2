//! An embeddable HTTP/1.1 server based on `tokio` tools
//!
//! The server parses requests incrementally from a bounded buffer,
//! dispatches them through a user-supplied handler chain, streams large
//! response bodies from a file store in fixed-size chunks and ingests
//! `multipart/form-data` uploads directly into that store.
extern crate futures;
extern crate tokio_core;
extern crate netbuf;
extern crate url;
extern crate mime_guess;
#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate matches;
#[macro_use] extern crate log;

pub mod server;
mod enums;
mod error;
mod headers;
mod request;
mod request_parser;
mod multipart;
mod reply;
mod files;
mod handler;

pub use enums::{Version, Status};
pub use error::Error;
pub use request::{Request, Header};
pub use request_parser::{RequestParser, ParseResult};
pub use multipart::{MultipartParser, MultipartResult, ContentPart};
pub use reply::Reply;
pub use files::{FileIo, IoError, DiskFiles};
pub use handler::{RequestHandler, HandlerCallback, WriteOutcome};
