/// Enum with the HTTP status codes the server emits.
///
/// The set is deliberately small: these are the codes the built-in
/// dispatch logic, the stock replies and the file store contract can
/// produce. Handlers that need something else can still pick any of
/// them and shape the body themselves.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Status {
    //  2xx status codes
    Ok,                      // 200
    Created,                 // 201
    Accepted,                // 202
    NoContent,               // 204
    //  3xx status codes
    MultipleChoices,         // 300
    MovedPermanently,        // 301
    MovedTemporarily,        // 302
    NotModified,             // 304
    //  4xx status codes
    BadRequest,              // 400
    Unauthorized,            // 401
    Forbidden,               // 403
    NotFound,                // 404
    //  5xx status codes
    InternalServerError,     // 500
    NotImplemented,          // 501
    BadGateway,              // 502
    ServiceUnavailable,      // 503
}

impl Status {
    pub fn code(&self) -> u16 {
        match *self {
            Status::Ok                      => 200,
            Status::Created                 => 201,
            Status::Accepted                => 202,
            Status::NoContent               => 204,
            Status::MultipleChoices         => 300,
            Status::MovedPermanently        => 301,
            Status::MovedTemporarily        => 302,
            Status::NotModified             => 304,
            Status::BadRequest              => 400,
            Status::Unauthorized            => 401,
            Status::Forbidden               => 403,
            Status::NotFound                => 404,
            Status::InternalServerError     => 500,
            Status::NotImplemented          => 501,
            Status::BadGateway              => 502,
            Status::ServiceUnavailable      => 503,
        }
    }

    pub fn reason(&self) -> &'static str {
        match *self {
            Status::Ok                      => "OK",
            Status::Created                 => "Created",
            Status::Accepted                => "Accepted",
            Status::NoContent               => "No Content",
            Status::MultipleChoices         => "Multiple Choices",
            Status::MovedPermanently        => "Moved Permanently",
            Status::MovedTemporarily        => "Moved Temporarily",
            Status::NotModified             => "Not Modified",
            Status::BadRequest              => "Bad Request",
            Status::Unauthorized            => "Unauthorized",
            Status::Forbidden               => "Forbidden",
            Status::NotFound                => "Not Found",
            Status::InternalServerError     => "Internal Server Error",
            Status::NotImplemented          => "Not Implemented",
            Status::BadGateway              => "Bad Gateway",
            Status::ServiceUnavailable      => "Service Unavailable",
        }
    }

    /// Returns true for statuses the multipart write flow treats as
    /// success when the file store reports them.
    pub fn is_success(&self) -> bool {
        matches!(*self, Status::Ok | Status::Created)
    }
}
