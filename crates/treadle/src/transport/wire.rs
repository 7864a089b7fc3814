//! JSON shapes exchanged with the front end.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::DecodeError;
use crate::http::{FileUpload, HeaderMap, RawBody, Request, parse_header};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

/// One request frame.
#[derive(Debug, Deserialize)]
pub(crate) struct WireRequest {
    method: String,
    uri: String,
    #[serde(default)]
    headers: BTreeMap<String, HeaderValues>,
    #[serde(default)]
    cookies: BTreeMap<String, String>,
    #[serde(default)]
    post: BTreeMap<String, Value>,
    #[serde(default)]
    files: Vec<FileUpload>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    remote_address: Option<String>,
}

impl WireRequest {
    pub(crate) fn parse(line: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(line).map_err(|source| DecodeError::Json { source })
    }

    pub(crate) fn into_request(self) -> Result<Request, DecodeError> {
        let mut request = Request::from_uri(&self.method, &self.uri)
            .map_err(|source| DecodeError::Request { source })?;

        let mut headers = HeaderMap::new();
        for (name, values) in self.headers {
            let values = match values {
                HeaderValues::One(value) => vec![value],
                HeaderValues::Many(values) => values,
            };
            for value in values {
                let (name, value) = parse_header(&name, &value)
                    .map_err(|source| DecodeError::Request { source })?;
                headers.append(name, value);
            }
        }
        request = request.with_headers(headers);

        for (name, value) in self.cookies {
            request = request.with_cookie(name, value);
        }
        for (name, value) in self.post {
            request = request.with_post(name, value);
        }
        for file in self.files {
            request = request.with_file(file);
        }
        if let Some(address) = self.remote_address {
            request = request.with_remote_address(address);
        }
        if let Some(body) = self.body {
            request = request.with_body(RawBody::lazy(move || body.into_bytes()));
        }
        Ok(request)
    }
}
