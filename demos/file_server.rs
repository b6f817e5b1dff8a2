//! Serves a directory tree and accepts multipart uploads into it.
//!
//! GET /quit shuts the server down, standing in for the signal
//! handling a real embedder would wire to the shutdown handle.
extern crate futures;
extern crate tokio_core;
extern crate env_logger;
extern crate tk_serve;

use std::env;
use std::rc::Rc;
use std::time::Duration;

use tokio_core::reactor::Core;

use tk_serve::{Status, DiskFiles, FileIo};
use tk_serve::server::{Server, HttpPersistence};


fn main() {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init().expect("init logging");

    let doc_root = env::args().nth(1).unwrap_or(".".to_string());
    let files = Rc::new(DiskFiles::new(&doc_root[..])) as Rc<FileIo>;

    let mut lp = Core::new().unwrap();
    let addr = "0.0.0.0:8080".parse().unwrap();

    let server = Server::bind(&addr, &lp.handle(), Some(files),
        HttpPersistence::new(100, Duration::from_secs(10)), 8192)
        .expect("bind server");

    let shutdown = server.shutdown_handle();
    server.add_request_handler(Box::new(move |req, rep| {
        if req.request_path == "/quit" {
            shutdown.shutdown();
            rep.content.extend_from_slice(b"bye\n");
            rep.send_with_content_type(Status::Ok, "text/plain");
        }
    }));

    println!("serving {} on port {}", doc_root, server.binded_port());
    lp.run(server).unwrap();
}
