//! Framing-related header inspection shared by the decoder, encoder and
//! aggregator.

use crate::error::ParseError;
use crate::header::{names, Headers};
use crate::version::Version;

/// Whether the terminal `Transfer-Encoding` token is `chunked`.
///
/// Chunked must be the final encoding to govern framing; only the last
/// value's last comma-separated token counts.
pub(crate) fn is_transfer_encoding_chunked(headers: &Headers) -> bool {
    let mut encodings = headers.get_all(names::TRANSFER_ENCODING);
    if let Some(last) = encodings.next_back() {
        if let Some(s) = last.to_str() {
            if let Some(encoding) = s.rsplit(',').next() {
                return encoding.trim().eq_ignore_ascii_case("chunked");
            }
        }
    }
    false
}

/// All `Content-Length` values folded into one.
///
/// If multiple `Content-Length` headers were sent, everything can still be
/// alright if they all contain the same valid value. If not, it's an error.
pub(crate) fn content_length(headers: &Headers) -> Result<Option<u64>, ParseError> {
    let mut folded: Option<u64> = None;
    for value in headers.get_all(names::CONTENT_LENGTH) {
        let n: u64 = value
            .to_str()
            .and_then(|s| s.trim().parse().ok())
            .ok_or(ParseError::ContentLength)?;
        match folded {
            Some(prev) if prev != n => return Err(ParseError::ContentLength),
            _ => folded = Some(n),
        }
    }
    Ok(folded)
}

/// Whether this message's connection stays open afterwards: the version's
/// keep-alive default, overridden by `Connection: close` / `keep-alive`.
pub(crate) fn is_keep_alive(version: &Version, headers: &Headers) -> bool {
    if headers.contains_token(names::CONNECTION, "close", true) {
        return false;
    }
    if headers.contains_token(names::CONNECTION, "keep-alive", true) {
        return true;
    }
    version.keep_alive_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunked_must_be_terminal() {
        let mut headers = Headers::new();
        headers.add(names::TRANSFER_ENCODING, "chunked").unwrap();
        assert!(is_transfer_encoding_chunked(&headers));

        let mut headers = Headers::new();
        headers
            .add(names::TRANSFER_ENCODING, "gzip, chunked")
            .unwrap();
        assert!(is_transfer_encoding_chunked(&headers));

        let mut headers = Headers::new();
        headers
            .add(names::TRANSFER_ENCODING, "chunked, gzip")
            .unwrap();
        assert!(!is_transfer_encoding_chunked(&headers));
    }

    #[test]
    fn content_length_folding() {
        let mut headers = Headers::new();
        assert_eq!(content_length(&headers), Ok(None));

        headers.add(names::CONTENT_LENGTH, "10").unwrap();
        assert_eq!(content_length(&headers), Ok(Some(10)));

        headers.add(names::CONTENT_LENGTH, "10").unwrap();
        assert_eq!(content_length(&headers), Ok(Some(10)));

        headers.add(names::CONTENT_LENGTH, "11").unwrap();
        assert!(content_length(&headers).is_err());
    }

    #[test]
    fn keep_alive_defaults_and_overrides() {
        let headers = Headers::new();
        assert!(is_keep_alive(&Version::HTTP_11, &headers));
        assert!(!is_keep_alive(&Version::HTTP_10, &headers));

        let mut headers = Headers::new();
        headers.add(names::CONNECTION, "close").unwrap();
        assert!(!is_keep_alive(&Version::HTTP_11, &headers));

        let mut headers = Headers::new();
        headers.add(names::CONNECTION, "Keep-Alive").unwrap();
        assert!(is_keep_alive(&Version::HTTP_10, &headers));
    }
}
