//! HTTP protocol versions.
//!
//! Instead of relying on typo-prone strings, wire versions are the
//! [`Version`] type. The two versions this codec speaks are available as the
//! constants [`Version::HTTP_10`] and [`Version::HTTP_11`].

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// A protocol version, as it appears in a start-line.
///
/// A version is a protocol name plus a major and minor number, and carries
/// the per-version keep-alive default: `HTTP/1.1` connections are persistent
/// unless told otherwise, `HTTP/1.0` connections are not.
#[derive(Clone, Debug)]
pub struct Version {
    protocol: Cow<'static, str>,
    major: u8,
    minor: u8,
    keep_alive_default: bool,
}

impl Version {
    /// `HTTP/1.0`
    pub const HTTP_10: Version = Version {
        protocol: Cow::Borrowed("HTTP"),
        major: 1,
        minor: 0,
        keep_alive_default: false,
    };

    /// `HTTP/1.1`
    pub const HTTP_11: Version = Version {
        protocol: Cow::Borrowed("HTTP"),
        major: 1,
        minor: 1,
        keep_alive_default: true,
    };

    /// The protocol name, e.g. `"HTTP"`.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// The major version number.
    pub fn major(&self) -> u8 {
        self.major
    }

    /// The minor version number.
    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Whether connections of this version are persistent by default.
    pub fn keep_alive_default(&self) -> bool {
        self.keep_alive_default
    }

    /// Parses a version from its wire form, `TOKEN '/' digits '.' digits`.
    ///
    /// The two canonical HTTP/1.x versions come back as the constants, so
    /// equality checks against them are cheap and their keep-alive defaults
    /// are right.
    pub fn parse(s: &str) -> Result<Version, ParseError> {
        match s {
            "HTTP/1.1" => return Ok(Version::HTTP_11),
            "HTTP/1.0" => return Ok(Version::HTTP_10),
            _ => (),
        }

        let slash = s.find('/').ok_or(ParseError::Version)?;
        let (name, rest) = s.split_at(slash);
        let mut numbers = rest[1..].splitn(2, '.');
        let major = numbers
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or(ParseError::Version)?;
        let minor = numbers
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or(ParseError::Version)?;

        if name.is_empty() || !name.bytes().all(crate::header::is_token_byte) {
            return Err(ParseError::Version);
        }

        Ok(Version {
            protocol: Cow::Owned(name.to_owned()),
            major,
            minor,
            // only HTTP/1.1 and up keep connections open by default
            keep_alive_default: name == "HTTP" && (major, minor) >= (1, 1),
        })
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Version) -> bool {
        self.protocol == other.protocol && self.major == other.major && self.minor == other.minor
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Version, ParseError> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.protocol, self.major, self.minor)
    }
}

impl Default for Version {
    fn default() -> Version {
        Version::HTTP_11
    }
}

#[cfg(test)]
mod tests {
    use super::Version;

    #[test]
    fn parse_canonical() {
        assert_eq!(Version::parse("HTTP/1.1").unwrap(), Version::HTTP_11);
        assert_eq!(Version::parse("HTTP/1.0").unwrap(), Version::HTTP_10);
        assert!(Version::parse("HTTP/1.1").unwrap().keep_alive_default());
        assert!(!Version::parse("HTTP/1.0").unwrap().keep_alive_default());
    }

    #[test]
    fn parse_other_protocols() {
        let v = Version::parse("RTSP/1.0").unwrap();
        assert_eq!(v.protocol(), "RTSP");
        assert_eq!((v.major(), v.minor()), (1, 0));
        assert!(!v.keep_alive_default());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Version::parse("HTTP").is_err());
        assert!(Version::parse("HTTP/1").is_err());
        assert!(Version::parse("HTTP/one.two").is_err());
        assert!(Version::parse("/1.1").is_err());
        assert!(Version::parse("HT TP/1.1").is_err());
    }

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(Version::HTTP_11.to_string(), "HTTP/1.1");
        assert_eq!(Version::HTTP_10.to_string(), "HTTP/1.0");
    }
}
