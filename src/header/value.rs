use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;

/// A header field value: an opaque octet sequence.
///
/// Values are bytes, not text; `to_str` succeeds only for UTF-8 content.
/// A validating container runs the value grammar on insertion: NUL, VT and
/// FF are forbidden, CR/LF may appear only as the obsolete folding pattern
/// `CR LF (SP|HT)`, and a value must not end on CR or LF.
#[derive(Clone, PartialEq, Eq)]
pub struct HeaderValue {
    inner: Bytes,
}

pub(crate) fn is_valid_value(bytes: &[u8]) -> bool {
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\0' | 0x0b | 0x0c => return false,
            b'\r' => {
                // only CR LF (SP|HT) is tolerated
                if i + 2 >= bytes.len() {
                    return false;
                }
                if bytes[i + 1] != b'\n' || !matches!(bytes[i + 2], b' ' | b'\t') {
                    return false;
                }
                i += 2;
            }
            b'\n' => return false,
            _ => (),
        }
        i += 1;
    }
    true
}

impl HeaderValue {
    /// Wraps a static string without copying.
    pub const fn from_static(value: &'static str) -> HeaderValue {
        HeaderValue {
            inner: Bytes::from_static(value.as_bytes()),
        }
    }

    /// The raw octets.
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    /// The value as text, if it is UTF-8.
    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.inner).ok()
    }

    /// Number of octets.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the value is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// ASCII case-insensitive comparison against `other`.
    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.inner.eq_ignore_ascii_case(other.as_bytes())
    }
}

impl fmt::Debug for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.inner))
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&String::from_utf8_lossy(&self.inner), f)
    }
}

impl PartialEq<str> for HeaderValue {
    fn eq(&self, other: &str) -> bool {
        self.inner == other.as_bytes()
    }
}

impl PartialEq<&str> for HeaderValue {
    fn eq(&self, other: &&str) -> bool {
        self.inner == other.as_bytes()
    }
}

/// Conversion of typed values into header values at insertion time.
///
/// Strings pass through; integers render in decimal; instants render as
/// IMF-fixdate per RFC 7231 §7.1.1.1. The conversion itself never fails;
/// grammar checks are the container's business, so a permissive container
/// can carry whatever a peer actually sent.
pub trait IntoHeaderValue {
    /// Performs the conversion.
    fn into_header_value(self) -> HeaderValue;
}

impl IntoHeaderValue for HeaderValue {
    fn into_header_value(self) -> HeaderValue {
        self
    }
}

impl IntoHeaderValue for Bytes {
    fn into_header_value(self) -> HeaderValue {
        HeaderValue { inner: self }
    }
}

impl IntoHeaderValue for &str {
    fn into_header_value(self) -> HeaderValue {
        HeaderValue {
            inner: Bytes::copy_from_slice(self.as_bytes()),
        }
    }
}

impl IntoHeaderValue for String {
    fn into_header_value(self) -> HeaderValue {
        HeaderValue {
            inner: Bytes::from(self.into_bytes()),
        }
    }
}

impl IntoHeaderValue for &[u8] {
    fn into_header_value(self) -> HeaderValue {
        HeaderValue {
            inner: Bytes::copy_from_slice(self),
        }
    }
}

impl IntoHeaderValue for SystemTime {
    fn into_header_value(self) -> HeaderValue {
        httpdate::fmt_http_date(self).into_header_value()
    }
}

macro_rules! int_into_value {
    ($($t:ty),*) => {$(
        impl IntoHeaderValue for $t {
            fn into_header_value(self) -> HeaderValue {
                let mut buf = itoa::Buffer::new();
                buf.format(self).into_header_value()
            }
        }
    )*};
}

int_into_value!(u16, i16, u32, i32, u64, i64, usize);
