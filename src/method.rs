//! The HTTP request method.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

use self::Method::{Connect, Delete, Extension, Get, Head, Options, Patch, Post, Put, Trace};

/// The request method (verb).
///
/// The nine standard verbs are interned as unit variants; anything else an
/// origin sends is carried verbatim in `Extension`. Comparison is
/// case-sensitive, as RFC 7231 requires of methods.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Method {
    /// OPTIONS
    Options,
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// HEAD
    Head,
    /// TRACE
    Trace,
    /// CONNECT
    Connect,
    /// PATCH
    Patch,
    /// Any other token, e.g. `Extension("PROPFIND".to_owned())`.
    Extension(String),
}

impl Method {
    /// The method token as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match *self {
            Options => "OPTIONS",
            Get => "GET",
            Post => "POST",
            Put => "PUT",
            Delete => "DELETE",
            Head => "HEAD",
            Trace => "TRACE",
            Connect => "CONNECT",
            Patch => "PATCH",
            Extension(ref s) => s,
        }
    }

    /// Whether a method is considered "safe", meaning the request is
    /// essentially read-only.
    pub fn safe(&self) -> bool {
        matches!(*self, Get | Head | Options | Trace)
    }

    /// Whether a method is considered "idempotent", meaning the request has
    /// the same result if executed multiple times.
    pub fn idempotent(&self) -> bool {
        self.safe() || matches!(*self, Put | Delete)
    }

    pub(crate) fn from_token(s: &str) -> Result<Method, ParseError> {
        if s.is_empty() || !s.bytes().all(crate::header::is_token_byte) {
            return Err(ParseError::Method);
        }
        Ok(match s {
            "OPTIONS" => Options,
            "GET" => Get,
            "POST" => Post,
            "PUT" => Put,
            "DELETE" => Delete,
            "HEAD" => Head,
            "TRACE" => Trace,
            "CONNECT" => Connect,
            "PATCH" => Patch,
            _ => Extension(s.to_owned()),
        })
    }
}

impl FromStr for Method {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Method, ParseError> {
        Method::from_token(s)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Method;
    use super::Method::{Extension, Get, Post, Put};

    #[test]
    fn test_from_str() {
        assert_eq!(Get, "GET".parse().unwrap());
        assert_eq!(Extension("MOVE".to_owned()), "MOVE".parse().unwrap());
        // methods are case-sensitive tokens
        assert_eq!(Extension("get".to_owned()), "get".parse().unwrap());
        assert!("".parse::<Method>().is_err());
        assert!("GE T".parse::<Method>().is_err());
    }

    #[test]
    fn test_safe_idempotent() {
        assert!(Get.safe());
        assert!(!Post.safe());
        assert!(Put.idempotent());
        assert!(!Post.idempotent());
    }

    #[test]
    fn test_fmt() {
        assert_eq!("GET", format!("{}", Get));
        assert_eq!("MOVE", format!("{}", Extension("MOVE".to_owned())));
    }
}
