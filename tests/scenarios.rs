//! End-to-end exchanges over a scripted in-memory transport
extern crate futures;
extern crate tokio_core;
extern crate tk_serve;

mod util;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tk_serve::{RequestHandler, FileIo, Status};
use tk_serve::server::{Connection, ConnectionManager, HttpPersistence};
use util::{MockSock, MockFiles};


fn drive_with(sock: &MockSock, dispatcher: Rc<RefCell<RequestHandler>>,
              persistence: HttpPersistence, max_content_size: usize,
              conn_id: u64)
{
    let manager = ConnectionManager::new(persistence);
    let handle = manager.start(conn_id);
    let conn = Connection::new(sock.clone(), conn_id, handle,
                               manager.clone(), dispatcher,
                               max_content_size);
    futures::executor::spawn(conn).wait_future().unwrap();
    // a closed connection deregisters itself
    assert_eq!(manager.len(), 0);
}

fn drive(sock: &MockSock, files: Option<Rc<FileIo>>,
         persistence: HttpPersistence, max_content_size: usize,
         conn_id: u64)
{
    let dispatcher = Rc::new(RefCell::new(RequestHandler::new(files)));
    drive_with(sock, dispatcher, persistence, max_content_size, conn_id);
}

fn single_use() -> HttpPersistence {
    HttpPersistence::new(1, Duration::from_secs(0))
}

fn body_of(output: &str) -> &str {
    let cut = output.find("\r\n\r\n").expect("no header terminator");
    &output[cut + 4..]
}

#[test]
fn s1_get_small_file() {
    let files = Rc::new(MockFiles::new());
    files.add_file("/hello.txt", b"Hello, world!");
    let sock = MockSock::new(vec![
        b"GET /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n".to_vec(),
    ]);
    drive(&sock, Some(files.clone() as Rc<FileIo>), single_use(),
          1024, 1);

    let out = sock.output_str();
    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "got: {}", out);
    assert!(out.contains("Content-Length: 13\r\n"));
    assert!(out.contains("Content-Type: text/plain\r\n"));
    assert!(out.contains("Connection: close\r\n"));
    assert_eq!(body_of(&out), "Hello, world!");
    // the read handle went back
    assert_eq!(files.open_read_count(), 0);
}

#[test]
fn s2_get_directory_serves_index() {
    let files = Rc::new(MockFiles::new());
    files.add_file("/index.html", b"<html><body>home</body></html>");
    let sock = MockSock::new(vec![
        b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".to_vec(),
    ]);
    drive(&sock, Some(files.clone() as Rc<FileIo>), single_use(),
          1024, 2);

    let out = sock.output_str();
    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(out.contains("Content-Type: text/html\r\n"));
    assert_eq!(body_of(&out), "<html><body>home</body></html>");
}

#[test]
fn s3_chunked_get_of_large_file() {
    let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    let files = Rc::new(MockFiles::new());
    files.add_file("/big.bin", &payload);
    let sock = MockSock::new(vec![
        b"GET /big.bin HTTP/1.1\r\nHost: x\r\n\r\n".to_vec(),
    ]);
    drive(&sock, Some(files.clone() as Rc<FileIo>), single_use(),
          1024, 3);

    let out = sock.output();
    let header_end = out.windows(4).position(|w| w == b"\r\n\r\n")
        .unwrap() + 4;
    let head = String::from_utf8(out[..header_end].to_vec()).unwrap();
    assert!(head.contains("Content-Length: 3000\r\n"));
    assert_eq!(&out[header_end..], &payload[..]);

    // headers first, then ceil(3000/1024) = 3 body writes
    let sizes = sock.write_sizes();
    assert_eq!(sizes.len(), 4);
    assert_eq!(&sizes[1..], &[1024, 1024, 952]);
    assert_eq!(files.open_read_count(), 0);
}

#[test]
fn s4_multipart_single_part() {
    let boundary = "----B";
    let body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"file1\"; \
         filename=\"a.txt\"\r\n\
         Content-Type: text/plain\r\n\
         \r\n\
         Hello\r\n\
         --{b}--\r\n", b = boundary);
    let request = format!(
        "POST /upload/ HTTP/1.1\r\n\
         Host: x\r\n\
         Content-Type: multipart/form-data; boundary={b}\r\n\
         Content-Length: {len}\r\n\
         \r\n{body}",
        b = boundary, len = body.len(), body = body);

    let files = Rc::new(MockFiles::new());
    let sock = MockSock::new(vec![request.into_bytes()]);
    drive(&sock, Some(files.clone() as Rc<FileIo>), single_use(),
          1024, 7);

    assert_eq!(files.finished_upload("/upload/a.txt7"),
               Some(b"Hello".to_vec()));
    let calls = files.write_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "/upload/a.txt7");
    assert_eq!(calls[0].data, b"Hello");
    assert!(calls[0].finished);
    assert!(!files.saw_double_open());
    assert_eq!(files.open_write_count(), 0);

    let out = sock.output_str();
    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
}

#[test]
fn s5_multipart_split_across_refills() {
    let boundary = "----B";
    // large enough that the body cannot fit one 1024-byte refill
    let content: Vec<u8> = (0..1500u32)
        .flat_map(|i| if i % 50 == 0 { vec![b'\r', b'\n'] }
                      else { vec![b'a' + (i % 23) as u8] })
        .collect();
    let mut body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"file1\"; \
         filename=\"big.txt\"\r\n\
         \r\n", b = boundary).into_bytes();
    body.extend_from_slice(&content);
    body.extend_from_slice(format!("\r\n--{b}--\r\n", b = boundary)
                           .as_bytes());
    let mut request = format!(
        "POST /upload/ HTTP/1.1\r\n\
         Host: x\r\n\
         Content-Type: multipart/form-data; boundary={b}\r\n\
         Content-Length: {len}\r\n\
         \r\n", b = boundary, len = body.len()).into_bytes();
    request.extend_from_slice(&body);

    let files = Rc::new(MockFiles::new());
    let sock = MockSock::new(vec![request]);
    drive(&sock, Some(files.clone() as Rc<FileIo>), single_use(),
          1024, 9);

    assert_eq!(files.finished_upload("/upload/big.txt9"),
               Some(content.clone()));
    let calls = files.write_calls();
    assert!(calls.len() >= 2, "expected a split upload");
    for call in &calls[..calls.len() - 1] {
        assert!(!call.finished);
    }
    assert!(calls[calls.len() - 1].finished);
    let mut streamed = Vec::new();
    for call in &calls {
        assert_eq!(call.id, "/upload/big.txt9");
        streamed.extend_from_slice(&call.data);
    }
    assert_eq!(streamed, content);
    assert!(!files.saw_double_open());
}

#[test]
fn s6_malformed_request() {
    let sock = MockSock::new(vec![
        b"GE T / HTTP/1.1\r\n\r\n".to_vec(),
    ]);
    drive(&sock, None, single_use(), 1024, 4);

    let out = sock.output_str();
    assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(out.contains("Connection: close\r\n"));
    assert!(body_of(&out).contains("400 Bad Request"));
}

#[test]
fn not_found_without_file_store() {
    let sock = MockSock::new(vec![
        b"GET /anything HTTP/1.1\r\nHost: x\r\n\r\n".to_vec(),
    ]);
    drive(&sock, None, single_use(), 1024, 5);

    let out = sock.output_str();
    assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(body_of(&out).contains("404 Not Found"));
}

#[test]
fn user_handler_short_circuits() {
    let dispatcher = Rc::new(RefCell::new(RequestHandler::new(None)));
    dispatcher.borrow_mut().add_request_handler(Box::new(|req, rep| {
        if req.request_path == "/status" {
            rep.content.extend_from_slice(b"all good");
            rep.send_with_content_type(Status::Ok, "text/plain");
        }
    }));
    let sock = MockSock::new(vec![
        b"GET /status?probe=1 HTTP/1.1\r\nHost: x\r\n\r\n".to_vec(),
    ]);
    drive_with(&sock, dispatcher, single_use(), 1024, 6);

    let out = sock.output_str();
    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body_of(&out), "all good");
}

#[test]
fn form_params_reach_the_handler() {
    let dispatcher = Rc::new(RefCell::new(RequestHandler::new(None)));
    dispatcher.borrow_mut().add_request_handler(Box::new(|req, rep| {
        let user = req.get_form_param("user").unwrap_or("?").to_string();
        rep.content.extend_from_slice(user.as_bytes());
        rep.send_with_content_type(Status::Ok, "text/plain");
    }));
    let body = "user=martin&pass=secret";
    let request = format!(
        "POST /login HTTP/1.1\r\nHost: x\r\n\
         Content-Type: application/x-www-form-urlencoded\r\n\
         Content-Length: {}\r\n\r\n{}", body.len(), body);
    let sock = MockSock::new(vec![request.into_bytes()]);
    drive_with(&sock, dispatcher, single_use(), 1024, 8);

    assert_eq!(body_of(&sock.output_str()), "martin");
}

#[test]
fn keep_alive_serves_up_to_the_cap() {
    let files = Rc::new(MockFiles::new());
    files.add_file("/a.txt", b"first");
    files.add_file("/b.txt", b"second");
    files.add_file("/c.txt", b"third");
    let sock = MockSock::new(vec![
        b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n".to_vec(),
        b"GET /b.txt HTTP/1.1\r\nHost: x\r\n\r\n".to_vec(),
        b"GET /c.txt HTTP/1.1\r\nHost: x\r\n\r\n".to_vec(),
    ]);
    drive(&sock, Some(files.clone() as Rc<FileIo>),
          HttpPersistence::new(2, Duration::from_secs(0)), 1024, 10);

    let out = sock.output_str();
    // the cap is two requests; the third never gets an answer
    assert_eq!(out.matches("HTTP/1.1 200 OK").count(), 2);
    assert!(out.contains("first"));
    assert!(out.contains("second"));
    assert!(!out.contains("third"));

    let first_end = out.find("first").unwrap();
    let first_head = &out[..first_end];
    assert!(first_head.contains("Connection: keep-alive\r\n"));
    let second_head = &out[first_end..];
    assert!(second_head.contains("Connection: close\r\n"));
}

#[test]
fn upload_rejected_by_the_store() {
    let boundary = "----B";
    let body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"file1\"; \
         filename=\"no.txt\"\r\n\
         \r\n\
         data\r\n\
         --{b}--\r\n", b = boundary);
    let request = format!(
        "POST /upload/ HTTP/1.1\r\nHost: x\r\n\
         Content-Type: multipart/form-data; boundary={b}\r\n\
         Content-Length: {len}\r\n\r\n{body}",
        b = boundary, len = body.len(), body = body);

    let files = Rc::new(MockFiles::new());
    files.refuse_writes();
    let sock = MockSock::new(vec![request.into_bytes()]);
    drive(&sock, Some(files.clone() as Rc<FileIo>), single_use(),
          1024, 11);

    let out = sock.output_str();
    assert!(out.starts_with("HTTP/1.1 403 Forbidden\r\n"), "got: {}", out);
    // the store's explanation is prepended to the body
    assert!(body_of(&out).starts_with("uploads are not allowed here"));
    assert!(files.write_calls().is_empty());
}

#[test]
fn oversized_request_head_is_rejected() {
    let mut request = b"GET /long?".to_vec();
    request.extend(vec![b'x'; 2000]);
    request.extend_from_slice(b" HTTP/1.1\r\nHost: x\r\n\r\n");
    let sock = MockSock::new(vec![request]);
    drive(&sock, None, single_use(), 1024, 12);

    let out = sock.output_str();
    assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}
