//! Handlers, their results and the registry that creates them.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::errors::DispatchError;
use super::request::DispatchRequest;
use crate::http::header::CONTENT_TYPE;
use crate::http::{HttpError, Response, StatusCode, escape_html, header_value};

/// Body written by a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResponse {
    /// Text body with an optional content type.
    Text {
        /// Body text.
        body: String,
        /// Content type; `text/html; charset=utf-8` when absent.
        content_type: Option<String>,
    },
    /// JSON document.
    Json(Value),
    /// Redirect to another location.
    Redirect {
        /// Target URL.
        url: String,
        /// Redirect status.
        code: StatusCode,
    },
    /// Headers only.
    Void,
}

impl HandlerResponse {
    /// HTML body.
    pub fn html(body: impl Into<String>) -> Self {
        Self::Text {
            body: body.into(),
            content_type: None,
        }
    }

    /// Text body with an explicit content type.
    pub fn text(body: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::Text {
            body: body.into(),
            content_type: Some(content_type.into()),
        }
    }

    /// Temporary redirect.
    pub fn redirect(url: impl Into<String>) -> Self {
        Self::Redirect {
            url: url.into(),
            code: StatusCode::FOUND,
        }
    }

    /// Writes headers into `response` and returns the body bytes.
    pub(crate) fn render(self, response: &mut Response) -> Result<Vec<u8>, HttpError> {
        match self {
            Self::Text { body, content_type } => {
                match content_type {
                    Some(content_type) => {
                        response.set_header(CONTENT_TYPE, header_value(&CONTENT_TYPE, &content_type)?);
                    }
                    None if response.header(CONTENT_TYPE).is_none() => {
                        response.set_content_type("text/html", Some("utf-8"))?;
                    }
                    None => {}
                }
                Ok(body.into_bytes())
            }
            Self::Json(document) => {
                response.set_content_type("application/json", Some("utf-8"))?;
                Ok(document.to_string().into_bytes())
            }
            Self::Redirect { url, code } => {
                response.redirect(&url, code)?;
                if links_safely(&url) {
                    response.set_content_type("text/html", Some("utf-8"))?;
                    let page = format!(
                        "<h1>Redirect</h1>\n\n<p><a href=\"{}\">Please click here to continue</a>.</p>",
                        escape_html(&url)
                    );
                    return Ok(page.into_bytes());
                }
                Ok(Vec::new())
            }
            Self::Void => Ok(Vec::new()),
        }
    }
}

/// Whether a redirect page may link to `url`.
///
/// Relative references and http(s) URLs qualify; anything that starts with
/// another scheme, such as `javascript:`, does not.
fn links_safely(url: &str) -> bool {
    let lowered = url.to_ascii_lowercase();
    if lowered.starts_with("http:") || lowered.starts_with("https:") {
        return true;
    }
    url.trim_start_matches(|c: char| c.is_ascii_whitespace())
        .trim_start_matches(|c: char| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
        .chars()
        .next()
        .is_some_and(|c| c != ':')
}

/// What a handler asks the dispatcher to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Dispatch another request.
    Forward(DispatchRequest),
    /// Render this response and finish.
    Respond(HandlerResponse),
}

impl From<HandlerResponse> for HandlerOutcome {
    fn from(response: HandlerResponse) -> Self {
        Self::Respond(response)
    }
}

/// Application code serving a [`DispatchRequest`].
pub trait Presenter {
    /// Runs the handler.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the request cannot be served.
    fn run(&mut self, request: DispatchRequest) -> Result<HandlerOutcome, DispatchError>;
}

impl<F> Presenter for F
where
    F: FnMut(DispatchRequest) -> Result<HandlerOutcome, DispatchError>,
{
    fn run(&mut self, request: DispatchRequest) -> Result<HandlerOutcome, DispatchError> {
        self(request)
    }
}

/// Creates handlers by name.
#[cfg_attr(test, mockall::automock)]
pub trait HandlerFactory {
    /// Creates a fresh handler.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidHandler`] when no handler has that name.
    fn create(&self, name: &str) -> Result<Box<dyn Presenter>, DispatchError>;
}

impl<T: HandlerFactory + ?Sized> HandlerFactory for Box<T> {
    fn create(&self, name: &str) -> Result<Box<dyn Presenter>, DispatchError> {
        (**self).create(name)
    }
}

type Constructor = Rc<dyn Fn() -> Box<dyn Presenter>>;

/// Name-to-constructor table; every dispatch gets a new handler instance.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor, replacing any previous one of that name.
    pub fn register<F, P>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> P + 'static,
        P: Presenter + 'static,
    {
        let constructor: Constructor = Rc::new(move || Box::new(constructor()));
        self.constructors.insert(name.into(), constructor);
    }

    /// Builder form of [`HandlerRegistry::register`].
    #[must_use]
    pub fn with<F, P>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> P + 'static,
        P: Presenter + 'static,
    {
        self.register(name, constructor);
        self
    }

    /// Registered handler names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

impl HandlerFactory for HandlerRegistry {
    fn create(&self, name: &str) -> Result<Box<dyn Presenter>, DispatchError> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| DispatchError::invalid_handler(name, "no handler registered"))
    }
}
