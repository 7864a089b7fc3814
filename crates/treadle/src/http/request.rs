//! Immutable inbound request.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use http::Method;
use http::header::{ACCEPT, AsHeaderName, HeaderMap, HeaderName, HeaderValue};
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{HttpError, header_str};

const X_REQUESTED_WITH: &str = "x-requested-with";

const RELATIVE_BASE: &str = "http://localhost";

/// Descriptor of an uploaded file; contents stay with the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpload {
    /// Form field carrying the upload.
    pub field: String,
    /// Client-supplied file name.
    pub file_name: String,
    /// Client-supplied media type.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

type BodyLoader = Box<dyn FnOnce() -> Vec<u8>>;

struct RawBodyInner {
    loader: RefCell<Option<BodyLoader>>,
    value: OnceCell<Vec<u8>>,
}

/// Lazily read raw request body; the loader runs at most once.
#[derive(Clone)]
pub struct RawBody {
    inner: Rc<RawBodyInner>,
}

impl RawBody {
    /// Body whose bytes are already known.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            inner: Rc::new(RawBodyInner {
                loader: RefCell::new(None),
                value: OnceCell::with_value(bytes),
            }),
        }
    }

    /// Body read on first access through `loader`.
    pub fn lazy(loader: impl FnOnce() -> Vec<u8> + 'static) -> Self {
        Self {
            inner: Rc::new(RawBodyInner {
                loader: RefCell::new(Some(Box::new(loader))),
                value: OnceCell::new(),
            }),
        }
    }

    /// Returns the body bytes, reading them if necessary.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.inner.value.get_or_init(|| {
            self.inner
                .loader
                .borrow_mut()
                .take()
                .map_or_else(Vec::new, |load| load())
        })
    }

    /// Reports whether the body has been read.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.value.get().is_some()
    }
}

impl Default for RawBody {
    fn default() -> Self {
        Self::from_bytes(Vec::new())
    }
}

impl fmt::Debug for RawBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBody")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Inbound HTTP request as delivered by the transport.
///
/// Requests are built once and never mutated; middlewares that need a
/// different request construct a new one with the `with_*` builders.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    cookies: BTreeMap<String, String>,
    post: BTreeMap<String, serde_json::Value>,
    files: Vec<FileUpload>,
    remote_address: Option<String>,
    body: RawBody,
}

impl Request {
    /// Creates a request for an absolute URL.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            cookies: BTreeMap::new(),
            post: BTreeMap::new(),
            files: Vec::new(),
            remote_address: None,
            body: RawBody::default(),
        }
    }

    /// Creates a request from method and URI text; relative references
    /// resolve against `http://localhost`. The method is matched
    /// case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidMethod`] when the method is not a valid
    /// token and [`HttpError::InvalidUri`] when the text is not a valid URI.
    pub fn from_uri(method: &str, uri: &str) -> Result<Self, HttpError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|source| HttpError::invalid_method(method, source))?;
        let url = match Url::parse(uri) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(RELATIVE_BASE)
                .and_then(|base| base.join(uri))
                .map_err(|source| HttpError::invalid_uri(uri, source))?,
            Err(source) => return Err(HttpError::invalid_uri(uri, source)),
        };
        Ok(Self::new(method, url))
    }

    /// Adds a header value.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces the header map.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Adds a cookie.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Adds a parsed body parameter.
    #[must_use]
    pub fn with_post(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.post.insert(name.into(), value);
        self
    }

    /// Adds an uploaded file descriptor.
    #[must_use]
    pub fn with_file(mut self, file: FileUpload) -> Self {
        self.files.push(file);
        self
    }

    /// Sets the client address.
    #[must_use]
    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }

    /// Sets the raw body.
    #[must_use]
    pub fn with_body(mut self, body: RawBody) -> Self {
        self.body = body;
        self
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Case-insensitive method comparison.
    #[must_use]
    pub fn is_method(&self, method: &str) -> bool {
        self.method.as_str().eq_ignore_ascii_case(method)
    }

    /// Full request URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL path component.
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Decoded query parameters; later duplicates win.
    #[must_use]
    pub fn query(&self) -> BTreeMap<String, String> {
        self.url.query_pairs().into_owned().collect()
    }

    /// Single decoded query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .last()
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header as text.
    #[must_use]
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        header_str(&self.headers, name)
    }

    /// All cookies.
    #[must_use]
    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// Single cookie value.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Parsed body parameters.
    #[must_use]
    pub fn post(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.post
    }

    /// Uploaded file descriptors.
    #[must_use]
    pub fn files(&self) -> &[FileUpload] {
        &self.files
    }

    /// Client address, when the transport knows it.
    #[must_use]
    pub fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }

    /// Raw body accessor.
    #[must_use]
    pub fn raw_body(&self) -> &RawBody {
        &self.body
    }

    /// Reports whether the request arrived over HTTPS.
    #[must_use]
    pub fn is_secured(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Reports whether the request was issued by a script (`X-Requested-With`).
    #[must_use]
    pub fn is_ajax(&self) -> bool {
        self.header(X_REQUESTED_WITH)
            .is_some_and(|value| value.eq_ignore_ascii_case("XMLHttpRequest"))
    }

    /// Reports whether the client prefers a JSON payload.
    #[must_use]
    pub fn wants_json(&self) -> bool {
        self.is_ajax()
            || self
                .header(ACCEPT)
                .is_some_and(|accept| accept.contains("application/json"))
    }
}
