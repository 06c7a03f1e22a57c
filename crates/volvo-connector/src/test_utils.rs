//! In-memory HTTP double for tests and offline hosts.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::Value;

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

type Scripted = Result<HttpResponse, TransportError>;

/// [`HttpTransport`] that replays scripted responses and records every request.
///
/// Lookup order per request: the URL's one-shot queue, the URL's fixed
/// response, then the global queue. Anything unmatched gets a 404.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<Scripted>>,
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    fixed: Mutex<HashMap<String, HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: HttpResponse) {
        self.queue.lock().push_back(Ok(response));
    }

    pub fn push_json(&self, status: StatusCode, body: Value) {
        self.push_response(HttpResponse::new(status, body.to_string()));
    }

    pub fn push_body(&self, status: StatusCode, body: impl Into<Bytes>) {
        self.push_response(HttpResponse::new(status, body));
    }

    pub fn push_status(&self, status: StatusCode) {
        self.push_response(HttpResponse::new(status, Bytes::new()));
    }

    pub fn push_error(&self, error: TransportError) {
        self.queue.lock().push_back(Err(error));
    }

    /// Answer the next request for `url` with `status` and `body`, once.
    pub fn route_once(&self, url: &str, status: StatusCode, body: Value) {
        self.routes
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(Ok(HttpResponse::new(status, body.to_string())));
    }

    /// Answer every request for `url` with `status` and `body` until replaced.
    pub fn route(&self, url: &str, status: StatusCode, body: Value) {
        self.fixed
            .lock()
            .insert(url.to_string(), HttpResponse::new(status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// URLs requested so far, in order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|request| request.url.to_string())
            .collect()
    }

    fn next_for(&self, url: &str) -> Scripted {
        if let Some(scripted) = self.routes.lock().get_mut(url).and_then(VecDeque::pop_front) {
            return scripted;
        }
        if let Some(response) = self.fixed.lock().get(url) {
            return Ok(response.clone());
        }
        self.queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(StatusCode::NOT_FOUND, "no scripted response")))
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.to_string();
        self.requests.lock().push(request);
        self.next_for(&url)
    }
}
