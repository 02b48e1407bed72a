//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes per method, in registration order
//! - Look up the first route whose pattern matches the whole path
//! - Return the handler plus its captures, or an explicit no-match
//!
//! # Design Decisions
//! - Immutable once bound to the server (shared via `Arc`, swapped whole)
//! - O(1) method lookup via HashMap, O(n) pattern scan within a method
//! - `HEAD` falls back to the `GET` routes when no `HEAD` route matches
//! - First match wins

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::HttpError;
use crate::http::content::ContentReader;
use crate::http::request::{Captures, Request};
use crate::http::response::Response;
use crate::http::types::Method;
use crate::routing::matcher::{self, Matcher};

/// Handler for requests whose body is buffered before dispatch.
pub type Handler = Arc<dyn Fn(&Request, &mut Response) + Send + Sync>;

/// Handler that pulls the request body itself through a [`ContentReader`].
pub trait ContentReaderHandler: Send + Sync {
    fn call<'a>(&'a self, req: &'a Request, res: &'a mut Response, reader: ContentReader<'a>) -> BoxFuture<'a, ()>;
}

impl<F> ContentReaderHandler for F
where
    F: for<'a> Fn(&'a Request, &'a mut Response, ContentReader<'a>) -> BoxFuture<'a, ()> + Send + Sync,
{
    fn call<'a>(&'a self, req: &'a Request, res: &'a mut Response, reader: ContentReader<'a>) -> BoxFuture<'a, ()> {
        self(req, res, reader)
    }
}

/// What a route invokes.
#[derive(Clone)]
pub enum RouteHandler {
    Plain(Handler),
    Reader(Arc<dyn ContentReaderHandler>),
}

impl RouteHandler {
    pub fn plain<F>(f: F) -> Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        RouteHandler::Plain(Arc::new(f))
    }

    pub fn reader<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a Request, &'a mut Response, ContentReader<'a>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        RouteHandler::Reader(Arc::new(f))
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteHandler::Plain(_) => f.write_str("Plain"),
            RouteHandler::Reader(_) => f.write_str("Reader"),
        }
    }
}

#[derive(Debug)]
struct Route {
    pattern: String,
    matcher: Box<dyn Matcher>,
    handler: RouteHandler,
}

/// Result of a successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'r> {
    pub pattern: &'r str,
    pub handler: &'r RouteHandler,
    pub captures: Captures,
}

/// Ordered route table keyed by method.
#[derive(Debug, Default)]
pub struct Router {
    routes: HashMap<Method, Vec<Route>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route for `method`. Fails if `pattern` is not a valid regex.
    pub fn register(&mut self, method: Method, pattern: &str, handler: RouteHandler) -> Result<(), HttpError> {
        let matcher = matcher::compile(pattern)?;
        tracing::debug!(method = %method, pattern = pattern, kind = ?handler, "Route registered");
        self.routes.entry(method).or_default().push(Route {
            pattern: pattern.to_string(),
            matcher,
            handler,
        });
        Ok(())
    }

    /// First route for `method` whose pattern matches all of `path`.
    pub fn find(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        self.lookup(method, path).or_else(|| {
            if *method == Method::Head {
                self.lookup(&Method::Get, path)
            } else {
                None
            }
        })
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        self.routes.get(method)?.iter().find_map(|route| {
            route.matcher.captures(path).map(|captures| RouteMatch {
                pattern: &route.pattern,
                handler: &route.handler,
                captures,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::types::StatusCode;

    fn noop() -> RouteHandler {
        RouteHandler::plain(|_, _| {})
    }

    #[test]
    fn first_registered_match_wins() {
        let mut router = Router::new();
        router.register(Method::Get, r"/items/(\d+)", noop()).unwrap();
        router.register(Method::Get, r"/items/.*", noop()).unwrap();

        let m = router.find(&Method::Get, "/items/9").unwrap();
        assert_eq!(m.pattern, r"/items/(\d+)");
        assert_eq!(m.captures[1].as_deref(), Some("9"));

        let m = router.find(&Method::Get, "/items/x").unwrap();
        assert_eq!(m.pattern, "/items/.*");
    }

    #[test]
    fn methods_are_separate_tables() {
        let mut router = Router::new();
        router.register(Method::Post, "/form", noop()).unwrap();
        assert!(router.find(&Method::Get, "/form").is_none());
        assert!(router.find(&Method::Post, "/form").is_some());
    }

    #[test]
    fn head_falls_back_to_get() {
        let mut router = Router::new();
        router
            .register(
                Method::Get,
                "/doc",
                RouteHandler::plain(|_, res| res.status = StatusCode::ACCEPTED),
            )
            .unwrap();
        let m = router.find(&Method::Head, "/doc").unwrap();
        let RouteHandler::Plain(handler) = m.handler else {
            panic!("expected plain handler");
        };
        let req = Request::new(Method::Head, "/doc");
        let mut res = Response::new();
        handler(&req, &mut res);
        assert_eq!(res.status, StatusCode::ACCEPTED);
    }

    #[test]
    fn bad_pattern_fails_registration() {
        let mut router = Router::new();
        assert!(router.register(Method::Get, "(", noop()).is_err());
        assert!(router.is_empty());
    }
}
