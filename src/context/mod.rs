//! Per-invocation handler context.
//!
//! Every handler the router selects receives a [`Context`]: the request it
//! is answering plus whatever its route pattern captured from the path.

use std::collections::HashMap;

use crate::Request;

/// Values captured by a route pattern's named groups.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Params {
    map: HashMap<String, String>,
}

impl Params {
    /// Create a new empty parameters map
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a value into the parameters map
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Get a value from the parameters map
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }
}

/// What a handler gets to look at.
#[derive(Debug)]
pub struct Context<'r> {
    request: &'r Request,
    params: Params,
}

impl<'r> Context<'r> {
    pub fn with_params(request: &'r Request, params: Params) -> Self {
        Self { request, params }
    }

    pub fn request(&self) -> &'r Request {
        self.request
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Shorthand for `self.params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }
}
