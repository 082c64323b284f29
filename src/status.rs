//! HTTP status codes and reason phrases.

use std::borrow::Cow;
use std::fmt;

/// An HTTP response status: a three-digit code plus a reason phrase.
///
/// Equality considers the code only; the reason phrase is advisory text that
/// callers may rewrite freely ("200 Okey-dokey" is still a 200).
#[derive(Clone, Debug)]
pub struct Status {
    code: u16,
    reason: Cow<'static, str>,
}

/// The class of a status code, derived from `code / 100`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    /// 1xx
    Informational,
    /// 2xx
    Success,
    /// 3xx
    Redirection,
    /// 4xx
    ClientError,
    /// 5xx
    ServerError,
    /// Anything else.
    Unknown,
}

impl Status {
    /// `100 Continue`
    pub const CONTINUE: Status = Status {
        code: 100,
        reason: Cow::Borrowed("Continue"),
    };

    /// `101 Switching Protocols`
    pub const SWITCHING_PROTOCOLS: Status = Status {
        code: 101,
        reason: Cow::Borrowed("Switching Protocols"),
    };

    /// `200 OK`
    pub const OK: Status = Status {
        code: 200,
        reason: Cow::Borrowed("OK"),
    };

    /// `400 Bad Request`
    pub const BAD_REQUEST: Status = Status {
        code: 400,
        reason: Cow::Borrowed("Bad Request"),
    };

    /// `413 Request Entity Too Large`
    pub const REQUEST_ENTITY_TOO_LARGE: Status = Status {
        code: 413,
        reason: Cow::Borrowed("Request Entity Too Large"),
    };

    /// `417 Expectation Failed`
    pub const EXPECTATION_FAILED: Status = Status {
        code: 417,
        reason: Cow::Borrowed("Expectation Failed"),
    };

    /// Creates a status with the canonical reason phrase for `code`, or an
    /// empty phrase if the code has none registered.
    pub fn new(code: u16) -> Status {
        Status {
            code,
            reason: Cow::Borrowed(canonical_reason(code).unwrap_or("")),
        }
    }

    /// Creates a status with an explicit reason phrase.
    pub fn with_reason<R: Into<Cow<'static, str>>>(code: u16, reason: R) -> Status {
        Status {
            code,
            reason: reason.into(),
        }
    }

    /// The numeric code.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// The reason phrase. May be empty.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The class this code belongs to.
    pub fn class(&self) -> StatusClass {
        match self.code / 100 {
            1 => StatusClass::Informational,
            2 => StatusClass::Success,
            3 => StatusClass::Redirection,
            4 => StatusClass::ClientError,
            5 => StatusClass::ServerError,
            _ => StatusClass::Unknown,
        }
    }

    /// `true` for 1xx codes.
    pub fn is_informational(&self) -> bool {
        self.class() == StatusClass::Informational
    }

    /// `true` for 2xx codes.
    pub fn is_success(&self) -> bool {
        self.class() == StatusClass::Success
    }
}

impl PartialEq for Status {
    fn eq(&self, other: &Status) -> bool {
        self.code == other.code
    }
}

impl Eq for Status {}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// The registered reason phrase for the codes this codec is likely to see.
fn canonical_reason(code: u16) -> Option<&'static str> {
    Some(match code {
        100 => "Continue",
        101 => "Switching Protocols",
        102 => "Processing",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request-URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Requested Range Not Satisfiable",
        417 => "Expectation Failed",
        421 => "Misdirected Request",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => return None,
    })
}
