//! Scripted transport for offline tests

use std::cell::RefCell;
use std::io;

use crate::api::{HttpRequest, HttpResponse, Transport};
use crate::error::TransportError;

struct Route {
    path: String,
    query: Option<(String, String)>,
    response: Result<HttpResponse, String>,
}

impl Route {
    fn matches(&self, request: &HttpRequest) -> bool {
        let path = url::Url::parse(&request.url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        if path != self.path {
            return false;
        }
        match &self.query {
            Some((key, value)) => request.query_value(key) == Some(value.as_str()),
            None => true,
        }
    }
}

/// Answers requests by URL path (and optionally one query parameter).
///
/// Several routes with the same criteria are served in registration order;
/// the last one keeps answering.
#[derive(Default)]
pub struct MockTransport {
    routes: RefCell<Vec<Route>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, path: &str, query: Option<(&str, &str)>, response: Result<HttpResponse, String>) -> Self {
        self.routes.borrow_mut().push(Route {
            path: path.to_string(),
            query: query.map(|(k, v)| (k.to_string(), v.to_string())),
            response,
        });
        self
    }

    pub fn on(self, path: &str, body: &str) -> Self {
        self.on_status(path, 200, body)
    }

    pub fn on_status(self, path: &str, status: u16, body: &str) -> Self {
        let response = HttpResponse {
            status,
            location: None,
            body: body.to_string(),
        };
        self.push(path, None, Ok(response))
    }

    pub fn on_query(self, path: &str, key: &str, value: &str, body: &str) -> Self {
        let response = HttpResponse {
            status: 200,
            location: None,
            body: body.to_string(),
        };
        self.push(path, Some((key, value)), Ok(response))
    }

    pub fn on_redirect(self, path: &str, location: &str) -> Self {
        let response = HttpResponse {
            status: 302,
            location: Some(location.to_string()),
            body: String::new(),
        };
        self.push(path, None, Ok(response))
    }

    pub fn on_error(self, path: &str, message: &str) -> Self {
        self.push(path, None, Err(message.to_string()))
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.ends_with(path))
            .collect()
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.borrow_mut().push(request.clone());

        let mut routes = self.routes.borrow_mut();
        let matching: Vec<usize> = routes
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches(request))
            .map(|(i, _)| i)
            .collect();

        let response = match matching.as_slice() {
            [] => Err(format!("no mock route for {}", request.url)),
            [only] => routes[*only].response.clone(),
            [first, ..] => routes.remove(*first).response,
        };
        // Scripted failures surface the way a dropped connection would.
        response.map_err(|message| TransportError::Request(ureq::Error::Io(io::Error::other(message))))
    }
}
