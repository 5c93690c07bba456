//! Scripted in-memory transport for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use reqwest::StatusCode;
use tokio::time::Instant;
use url::Url;

use crate::errors::{RcAuthError, Result};
use crate::transport::{HttpResponse, Transport};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedBody {
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub body: RecordedBody,
    pub at: Instant,
}

impl RecordedRequest {
    pub fn form_value(&self, key: &str) -> Option<&str> {
        match &self.body {
            RecordedBody::Form(pairs) => pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            RecordedBody::Json(_) => None,
        }
    }

    pub fn json(&self) -> Option<&serde_json::Value> {
        match &self.body {
            RecordedBody::Json(value) => Some(value),
            RecordedBody::Form(_) => None,
        }
    }
}

#[derive(Default)]
struct Route {
    queue: VecDeque<HttpResponse>,
    repeat: Option<HttpResponse>,
}

/// Answers from per-URL queues; once a queue is drained the route's repeat
/// response (if any) is served forever.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &Url, status: StatusCode, body: serde_json::Value) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .queue
            .push_back(HttpResponse::new(status, body.to_string()));
        self
    }

    pub fn push_raw(&self, url: &Url, status: StatusCode, body: &str) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .queue
            .push_back(HttpResponse::new(status, body));
        self
    }

    pub fn repeat(&self, url: &Url, status: StatusCode, body: serde_json::Value) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .repeat = Some(HttpResponse::new(status, body.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &Url) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url == url.as_str())
            .collect()
    }

    fn answer(&self, url: &Url, body: RecordedBody) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            body,
            at: Instant::now(),
        });

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .get_mut(url.as_str())
            .ok_or_else(|| RcAuthError::InvalidResponse(format!("no fake route for {url}")))?;
        route
            .queue
            .pop_front()
            .or_else(|| route.repeat.clone())
            .ok_or_else(|| RcAuthError::InvalidResponse(format!("fake route {url} exhausted")))
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn post_form(&self, url: &Url, form: &[(&str, &str)]) -> Result<HttpResponse> {
        let pairs = form
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.answer(url, RecordedBody::Form(pairs))
    }

    async fn post_json(&self, url: &Url, body: &serde_json::Value) -> Result<HttpResponse> {
        self.answer(url, RecordedBody::Json(body.clone()))
    }
}
