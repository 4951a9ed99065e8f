//! HTTP plumbing between the client and the provider.
//!
//! The client builds [`ApiRequest`]s and interprets [`ApiResponse`]s; the
//! [`Transport`] only moves bytes, so tests can swap in a fake.

use std::time::Duration;

use anyhow::Context;
use reqwest::Method;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    Bearer(String),
    Basic { user: String, password: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub auth: Auth,
    pub body: Body,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            auth: Auth::None,
            body: Body::Empty,
        }
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// value of the `Retry-After` header, in seconds
    pub retry_after: Option<u64>,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait Transport: Send + Sync {
    fn execute(&self, request: &ApiRequest) -> anyhow::Result<ApiResponse>;
}

/// Blocking reqwest transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &ApiRequest) -> anyhow::Result<ApiResponse> {
        log::debug!("{} {}", request.method, request.url);

        let mut builder = self.client.request(request.method.clone(), &request.url);

        builder = match &request.auth {
            Auth::None => builder,
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::Basic { user, password } => builder.basic_auth(user, Some(password)),
        };

        builder = match &request.body {
            Body::Empty => builder.header(reqwest::header::CONTENT_LENGTH, 0),
            Body::Json(value) => builder.json(value),
            Body::Form(fields) => builder.form(fields),
        };

        let response = builder
            .send()
            .with_context(|| format!("request to {} failed", request.url))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let body = response
            .text()
            .with_context(|| format!("failed to read response body from {}", request.url))?;

        Ok(ApiResponse {
            status,
            retry_after,
            body,
        })
    }
}

#[cfg(test)]
pub mod fake {
    //! In-memory transport answering from canned responses.

    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use super::*;

    #[derive(Default)]
    struct State {
        responses: HashMap<(Method, String), ApiResponse>,
        requests: Vec<ApiRequest>,
    }

    /// Cloning shares the underlying state, so a test can keep a handle
    /// while the client owns the boxed transport.
    #[derive(Clone, Default)]
    pub struct FakeTransport {
        state: Arc<Mutex<State>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, method: Method, url: &str, status: u16, body: &str) {
            self.state.lock().unwrap().responses.insert(
                (method, url.to_string()),
                ApiResponse {
                    status,
                    retry_after: None,
                    body: body.to_string(),
                },
            );
        }

        pub fn respond_json(&self, method: Method, url: &str, body: serde_json::Value) {
            self.respond(method, url, 200, &body.to_string());
        }

        pub fn respond_rate_limited(&self, method: Method, url: &str, retry_after: u64) {
            self.state.lock().unwrap().responses.insert(
                (method, url.to_string()),
                ApiResponse {
                    status: 429,
                    retry_after: Some(retry_after),
                    body: String::new(),
                },
            );
        }

        pub fn requests(&self) -> Vec<ApiRequest> {
            self.state.lock().unwrap().requests.clone()
        }

        pub fn requests_to(&self, url: &str) -> usize {
            self.requests().iter().filter(|r| r.url == url).count()
        }
    }

    impl Transport for FakeTransport {
        fn execute(&self, request: &ApiRequest) -> anyhow::Result<ApiResponse> {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request.clone());
            state
                .responses
                .get(&(request.method.clone(), request.url.clone()))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("connection refused: {} {}", request.method, request.url))
        }
    }
}
