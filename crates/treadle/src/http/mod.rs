//! HTTP primitives shared by the worker, middlewares and dispatcher.
//!
//! [`Request`] is the immutable inbound message, [`Response`] is the mutable
//! status/header accumulator shared for the lifetime of the worker, and
//! [`Reply`] is the finished message handed back to the transport. The
//! per-cycle handles in [`context`] tie them together.
//!
//! Methods, status codes and header maps are the [`http`](::http) crate's
//! types, re-exported here.

mod context;
mod cookie;
mod errors;
mod escape;
mod headers;
mod reply;
mod request;
mod response;

pub use context::{CurrentRequest, SharedResponse};
pub use cookie::{Cookie, CookieDefaults, Expiry, format_http_date};
pub use errors::HttpError;
pub use escape::escape_html;
pub use headers::{header_str, header_strs, header_value, parse_header};
pub use http::header::{self, HeaderMap, HeaderName, HeaderValue};
pub use http::{Method, StatusCode};
pub use reply::Reply;
pub use request::{FileUpload, RawBody, Request};
pub use response::Response;
