// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking Kubernetes API responses.

use http::{Request, Response};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::Client;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

#[derive(Clone, Debug)]
enum Reply {
    Json(u16, String),
    /// Answer with the request body, as the API server does for creates
    Echo(u16),
}

/// A request the mock has served
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

type Routes = HashMap<(String, String), VecDeque<Reply>>;

/// A mock HTTP service that returns predefined responses based on request
/// method and exact path, and records every request it serves.
///
/// Several responses registered for the same route are served in order; the
/// last one keeps being served once the others are used up.
#[derive(Clone, Default)]
pub struct MockService {
    routes: Arc<Mutex<Routes>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    fn on(self, method: &str, path: &str, reply: Reply) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry((method.to_string(), path.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, Reply::Json(status, body.to_string()))
    }

    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.on("POST", path, Reply::Json(status, body.to_string()))
    }

    pub fn on_post_echo(self, path: &str, status: u16) -> Self {
        self.on("POST", path, Reply::Echo(status))
    }

    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PUT", path, Reply::Json(status, body.to_string()))
    }

    pub fn on_put_echo(self, path: &str, status: u16) -> Self {
        self.on("PUT", path, Reply::Echo(status))
    }

    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, Reply::Json(status, body.to_string()))
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, Reply::Json(status, body.to_string()))
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    fn next_reply(&self, method: &str, path: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(&(method.to_string(), path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let this = self.clone();

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let bytes = body.collect().await?.to_bytes();
            let recorded = RecordedRequest {
                method: parts.method.to_string(),
                path: parts.uri.path().to_string(),
                query: parts.uri.query().unwrap_or_default().to_string(),
                body: String::from_utf8_lossy(&bytes).to_string(),
            };

            let reply = this.next_reply(&recorded.method, &recorded.path);
            this.requests.lock().unwrap().push(recorded.clone());

            let (status, body) = match reply {
                Some(Reply::Json(status, body)) => (status, body),
                Some(Reply::Echo(status)) => (status, recorded.body),
                // Default 404 for unmatched requests
                None => (404, not_found_json("object", &recorded.path)),
            };

            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))?)
        })
    }
}

/// A Kubernetes Status failure body
pub fn status_json(code: u16, reason: &str, message: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    status_json(404, "NotFound", &format!("{} \"{}\" not found", resource, name))
}

pub fn already_exists_json(resource: &str, name: &str) -> String {
    status_json(409, "AlreadyExists", &format!("{} \"{}\" already exists", resource, name))
}

pub fn conflict_json(resource: &str, name: &str) -> String {
    status_json(
        409,
        "Conflict",
        &format!("Operation cannot be fulfilled on {} \"{}\"", resource, name),
    )
}

/// An empty list, as returned by a delete-collection call
pub fn empty_list_json(api_version: &str, kind: &str) -> String {
    serde_json::json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": {},
        "items": []
    })
    .to_string()
}

/// A list of already serialized objects
pub fn list_json(api_version: &str, kind: &str, items: &[serde_json::Value]) -> String {
    serde_json::json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": { "resourceVersion": "1" },
        "items": items
    })
    .to_string()
}
