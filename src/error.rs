use std::io;


quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            description("I/O error")
            display("I/O error: {}", err)
            from()
        }
        Config(reason: &'static str) {
            description("invalid server configuration")
            display("invalid server configuration: {}", reason)
        }
    }
}
