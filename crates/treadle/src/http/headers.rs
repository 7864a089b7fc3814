//! Text access and wire encoding for [`HeaderMap`]s.

use http::header::{AsHeaderName, HeaderMap, HeaderName, HeaderValue};
use serde::{Serializer, ser::SerializeMap};

use super::HttpError;

/// First value of `name` as text.
///
/// Values that are not visible ASCII read as absent.
pub fn header_str<K: AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Every textual value of `name` in insertion order.
pub fn header_strs<K: AsHeaderName>(headers: &HeaderMap, name: K) -> impl Iterator<Item = &str> {
    headers
        .get_all(name)
        .into_iter()
        .filter_map(|value| value.to_str().ok())
}

/// Parses a header name and value received as text.
///
/// # Errors
///
/// Returns [`HttpError::InvalidHeaderName`] or
/// [`HttpError::InvalidHeaderValue`] when either part is not valid HTTP.
pub fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), HttpError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|source| HttpError::invalid_header_name(name, source))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|source| HttpError::invalid_header_value(name, source))?;
    Ok((header_name, header_value))
}

/// Parses a header value produced at run time for `name`.
///
/// # Errors
///
/// Returns [`HttpError::InvalidHeaderValue`] when the text contains bytes not
/// allowed in a header.
pub fn header_value(name: &HeaderName, value: &str) -> Result<HeaderValue, HttpError> {
    HeaderValue::from_str(value)
        .map_err(|source| HttpError::invalid_header_value(name.as_str(), source))
}

// Serialized as `{ "name": ["value", ...] }` with names in first-seen order.
pub(crate) fn serialize_headers<S: Serializer>(
    headers: &HeaderMap,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(headers.keys_len()))?;
    for name in headers.keys() {
        let values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect();
        map.serialize_entry(name.as_str(), &values)?;
    }
    map.end()
}
