extern crate futures;
extern crate tokio_core;
extern crate env_logger;
extern crate tk_serve;

use std::env;
use std::time::Duration;

use tokio_core::reactor::Core;

use tk_serve::Status;
use tk_serve::server::{Server, HttpPersistence};


fn main() {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init().expect("init logging");

    let mut lp = Core::new().unwrap();
    let addr = "0.0.0.0:8080".parse().unwrap();

    let server = Server::bind(&addr, &lp.handle(), None,
        HttpPersistence::new(100, Duration::from_secs(5)), 1024)
        .expect("bind server");
    server.add_request_handler(Box::new(|_req, rep| {
        rep.content.extend_from_slice(b"Hello World!");
        rep.send_with_content_type(Status::Ok, "text/plain");
    }));
    println!("serving on port {}", server.binded_port());

    lp.run(server).unwrap();
}
