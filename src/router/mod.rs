//! Request routing: map HTTP methods and path patterns to handlers.
//!
//! Routes are grouped by [`Method`]. Within a group, a [`Pattern`] is either
//! an exact path or a regular expression that must match the *whole* path:
//!
//! | Pattern                          | Example match | Captured params |
//! |----------------------------------|---------------|-----------------|
//! | `"/users"`                       | `/users`      | *(none)*        |
//! | `Pattern::regex(r"/users/\d+")`  | `/users/42`   | *(none)*        |
//! | `Pattern::regex(r"/u/(?P<id>\w+)")` | `/u/bob`   | `id → "bob"`    |
//!
//! Dispatch runs **every** matching handler in registration order, all
//! against the same [`Response`]. There is no first-match short-circuit, so
//! overlapping patterns each get their turn and the last writer wins on any
//! field they both set. When nothing matches, no handler runs and the caller
//! decides what to answer.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::context::{Context, Params};
use crate::{Method, Request, Response};

/// Type-erased handler, shared behind an [`Arc`].
///
/// In practice you never construct this type directly; use
/// [`Router::get`], [`Router::post`], and the other method-specific helpers.
pub type Handler = Arc<dyn Fn(&Context<'_>, &mut Response) + Send + Sync + 'static>;

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches one exact path string, e.g. `/users`.
    Exact(String),
    /// Matches paths the expression matches from first to last byte.
    Regex(Regex),
}

impl Pattern {
    /// An exact-path pattern.
    pub fn exact(path: impl Into<String>) -> Self {
        Self::Exact(path.into())
    }

    /// A regular-expression pattern, anchored at both ends.
    ///
    /// Named groups are handed to the handler through [`Context::param`].
    ///
    /// # Errors
    ///
    /// Returns the [`regex::Error`] if `pattern` does not compile.
    ///
    /// # Examples
    ///
    /// ```
    /// use solo::router::Pattern;
    ///
    /// let p = Pattern::regex(r"/files/.+").unwrap();
    /// assert!(p.is_match("/files/a.txt"));
    /// assert!(!p.is_match("/static/files/a.txt"));
    /// ```
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{pattern})$")).map(Self::Regex)
    }

    /// Returns `true` if `path` matches this pattern.
    pub fn is_match(&self, path: &str) -> bool {
        self.matches(path).is_some()
    }

    // Try to match `path`, returning the named captures on success.
    fn matches(&self, path: &str) -> Option<Params> {
        match self {
            Pattern::Exact(p) => (p == path).then(Params::new),
            Pattern::Regex(re) => {
                let caps = re.captures(path)?;
                let mut params = Params::new();
                for name in re.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        params.insert(name, m.as_str());
                    }
                }
                Some(params)
            }
        }
    }
}

impl From<&str> for Pattern {
    fn from(path: &str) -> Self {
        Self::exact(path)
    }
}

impl From<String> for Pattern {
    fn from(path: String) -> Self {
        Self::exact(path)
    }
}

// A single registered route binding a pattern to a handler.
struct Route {
    pattern: Pattern,
    handler: Handler,
}

/// Table of `(method, pattern, handler)` entries.
///
/// # Examples
///
/// ```
/// use solo::{Request, Response, Router};
/// use solo::router::Pattern;
///
/// let mut router = Router::new();
/// router.get("/", |_ctx, res| {
///     res.body("home");
/// });
/// router.get(Pattern::regex(r"/.*").unwrap(), |_ctx, res| {
///     res.header("X-Seen", "yes");
/// });
///
/// let request = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
/// let mut response = Response::for_request(&request);
/// assert_eq!(router.dispatch(&request, &mut response), 2);
/// ```
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, Vec<Route>>,
}

impl Router {
    /// Create a new, empty `Router` with no registered routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method` requests whose path matches `pattern`.
    pub fn add<H>(&mut self, method: Method, pattern: impl Into<Pattern>, handler: H)
    where
        H: Fn(&Context<'_>, &mut Response) + Send + Sync + 'static,
    {
        self.routes.entry(method).or_default().push(Route {
            pattern: pattern.into(),
            handler: Arc::new(handler),
        });
    }

    /// Register a handler for `GET` requests matching `pattern`.
    pub fn get<H>(&mut self, pattern: impl Into<Pattern>, handler: H)
    where
        H: Fn(&Context<'_>, &mut Response) + Send + Sync + 'static,
    {
        self.add(Method::Get, pattern, handler);
    }

    /// Register a handler for `POST` requests matching `pattern`.
    pub fn post<H>(&mut self, pattern: impl Into<Pattern>, handler: H)
    where
        H: Fn(&Context<'_>, &mut Response) + Send + Sync + 'static,
    {
        self.add(Method::Post, pattern, handler);
    }

    /// Register a handler for `PUT` requests matching `pattern`.
    pub fn put<H>(&mut self, pattern: impl Into<Pattern>, handler: H)
    where
        H: Fn(&Context<'_>, &mut Response) + Send + Sync + 'static,
    {
        self.add(Method::Put, pattern, handler);
    }

    /// Register a handler for `DELETE` requests matching `pattern`.
    pub fn delete<H>(&mut self, pattern: impl Into<Pattern>, handler: H)
    where
        H: Fn(&Context<'_>, &mut Response) + Send + Sync + 'static,
    {
        self.add(Method::Delete, pattern, handler);
    }

    /// Register a handler for `PATCH` requests matching `pattern`.
    pub fn patch<H>(&mut self, pattern: impl Into<Pattern>, handler: H)
    where
        H: Fn(&Context<'_>, &mut Response) + Send + Sync + 'static,
    {
        self.add(Method::Patch, pattern, handler);
    }

    /// Register a handler for `OPTIONS` requests matching `pattern`.
    pub fn options<H>(&mut self, pattern: impl Into<Pattern>, handler: H)
    where
        H: Fn(&Context<'_>, &mut Response) + Send + Sync + 'static,
    {
        self.add(Method::Options, pattern, handler);
    }

    /// Return the number of routes registered across all methods.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every handler registered for the request's method whose pattern
    /// matches the request path, in registration order.
    ///
    /// Returns how many handlers ran; `0` means nothing matched and
    /// `response` is untouched.
    pub fn dispatch(&self, request: &Request, response: &mut Response) -> usize {
        let method: Method = match request.method().parse() {
            Ok(method) => method,
            Err(never) => match never {},
        };
        let Some(routes) = self.routes.get(&method) else {
            return 0;
        };

        let mut invoked = 0;
        for route in routes {
            if let Some(params) = route.pattern.matches(request.path()) {
                let ctx = Context::with_params(request, params);
                (route.handler)(&ctx, response);
                invoked += 1;
            }
        }
        invoked
    }
}
