//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Response};
use chrono::NaiveDate;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use cas_gate::auth::validator::BoxFuture;
use cas_gate::auth::{CasClient, CasSettings, ManualClock, SessionCache, TicketValidator, ValidationError};
use cas_gate::http::ResponseSink;
use cas_gate::{Content, Dispatcher, GateConfig, GateError, Params, RequestContext};

pub const PUBLIC_HOST: &str = "gate.example.edu";
pub const COOKIE: &str = "app-cas-session";

/// Start a mock CAS server that answers every request with `(status, body)`
/// and reports each request line on the returned log.
pub async fn start_mock_cas(status: u16, body: &'static str) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let seen = log.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let seen = seen.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        let mut read = 0;
                        while read < buf.len() {
                            match socket.read(&mut buf[read..]).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => {
                                    read += n;
                                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                                        break;
                                    }
                                }
                            }
                        }
                        let request = String::from_utf8_lossy(&buf[..read]).into_owned();
                        if let Some(line) = request.lines().next() {
                            seen.lock().unwrap().push(line.to_string());
                        }

                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, log)
}

/// Validator answering from a fixed ticket → identity table.
#[derive(Clone, Default)]
pub struct ScriptedValidator {
    tickets: Arc<Mutex<HashMap<String, String>>>,
    services: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedValidator {
    pub fn accept(&self, ticket: &str, identity: &str) {
        self.tickets
            .lock()
            .unwrap()
            .insert(ticket.to_string(), identity.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn services(&self) -> Vec<String> {
        self.services.lock().unwrap().clone()
    }
}

impl TicketValidator for ScriptedValidator {
    fn validate<'a>(
        &'a self,
        service: &'a str,
        ticket: &'a str,
    ) -> BoxFuture<'a, Result<String, ValidationError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.services.lock().unwrap().push(service.to_string());
            self.tickets
                .lock()
                .unwrap()
                .get(ticket)
                .cloned()
                .ok_or_else(|| ValidationError::Rejected {
                    code: "INVALID_TICKET".into(),
                    message: format!("Ticket {} not recognized", ticket),
                })
        })
    }
}

pub fn test_config(assets_root: &Path) -> GateConfig {
    let mut config = GateConfig::default();
    config.application.name = "app".into();
    config.application.public_host = PUBLIC_HOST.into();
    config.application.assets_root = assets_root.to_string_lossy().into_owned();
    config.cas.server_url = "https://cas.example.edu/cas".into();
    config
}

/// Dispatcher wired to a scripted validator, a manual clock, a temp asset
/// tree and a recording handler.
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub validator: ScriptedValidator,
    pub clock: ManualClock,
    pub handler_calls: Arc<AtomicUsize>,
    pub last_params: Arc<Mutex<Vec<(String, String)>>>,
    pub assets: tempfile::TempDir,
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
}

impl Harness {
    pub fn new() -> Self {
        let assets = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(assets.path().join("html")).unwrap();
        std::fs::create_dir_all(assets.path().join("app")).unwrap();

        let config = test_config(assets.path());
        let validator = ScriptedValidator::default();
        let clock = ManualClock::new(today());
        let cas = CasClient::new(
            CasSettings::from_config(&config),
            SessionCache::new(Box::new(clock.clone())),
            Box::new(validator.clone()),
        );

        let handler_calls = Arc::new(AtomicUsize::new(0));
        let last_params = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let calls = handler_calls.clone();
            let last = last_params.clone();
            move |ctx: &mut RequestContext, identity: &str, params: &Params| -> Result<Content, GateError> {
                calls.fetch_add(1, Ordering::SeqCst);
                *last.lock().unwrap() = params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();

                match ctx.path() {
                    "/app/json" => Ok(Content::Json(serde_json::json!({ "user": identity }))),
                    "/app/bytes" => Ok(Content::Bytes(vec![0, 159, 146, 150])),
                    "/app/teapot" => Err(GateError::status(
                        axum::http::StatusCode::IM_A_TEAPOT,
                        "Short and stout",
                    )),
                    "/app/io" => Err(GateError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "database at /var/db/secret is down",
                    ))),
                    "/app/boom" => panic!("handler exploded"),
                    "/app/raw" => {
                        ctx.response.set_status(axum::http::StatusCode::ACCEPTED);
                        ctx.response.send("written by handler")?;
                        Ok(Content::Responded)
                    }
                    _ => Ok(Content::Text(format!("hello {}", identity))),
                }
            }
        };

        let dispatcher = Dispatcher::new(&config, cas, Box::new(handler));

        Self {
            dispatcher,
            validator,
            clock,
            handler_calls,
            last_params,
            assets,
        }
    }

    pub fn handler_calls(&self) -> usize {
        self.handler_calls.load(Ordering::SeqCst)
    }

    pub fn write_asset(&self, relative: &str, contents: &[u8]) {
        std::fs::write(self.assets.path().join(relative), contents).unwrap();
    }

    /// Dispatch one request and return the delivered response.
    pub async fn send(&mut self, request: TestRequest) -> Response<Body> {
        let (ctx, rx) = request.into_context();
        self.dispatcher.dispatch(ctx).await;
        rx.await.expect("dispatcher delivered no response")
    }

    /// Log `identity` in with `ticket` and return the session cookie value.
    pub async fn login(&mut self, ticket: &str, identity: &str) -> String {
        self.validator.accept(ticket, identity);
        let response = self
            .send(TestRequest::get(&format!("/app/?ticket={}", ticket)))
            .await;
        session_cookie(&response).expect("no session cookie issued")
    }
}

/// Builder for requests handed straight to the dispatcher.
pub struct TestRequest {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
    secure: bool,
}

impl TestRequest {
    pub fn get(uri: &str) -> Self {
        Self {
            method: Method::GET,
            uri: uri.to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            secure: true,
        }
    }

    pub fn post_form(uri: &str, body: &str) -> Self {
        let mut request = Self::get(uri);
        request.method = Method::POST;
        request.body = Bytes::from(body.to_string());
        request.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
    }

    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        self.headers.append(name, HeaderValue::from_str(value).unwrap());
        self
    }

    pub fn cookie(self, value: &str) -> Self {
        self.header(header::COOKIE, &format!("{}={}", COOKIE, value))
    }

    pub fn insecure(mut self) -> Self {
        self.secure = false;
        self
    }

    pub fn into_context(self) -> (RequestContext, oneshot::Receiver<Response<Body>>) {
        let (sink, rx) = ResponseSink::channel();
        let mut headers = self.headers;
        headers
            .entry(header::HOST)
            .or_insert(HeaderValue::from_static(PUBLIC_HOST));
        let ctx = RequestContext::new(
            self.method,
            self.uri.parse().unwrap(),
            headers,
            self.body,
            self.secure,
            sink,
        );
        (ctx, rx)
    }
}

pub fn location(response: &Response<Body>) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of a non-expired session cookie, if one was set.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    set_cookies(response).into_iter().find_map(|c| {
        let first = c.split(';').next()?.to_string();
        let value = first.strip_prefix(&format!("{}=", COOKIE))?;
        (!value.is_empty()).then(|| value.to_string())
    })
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).unwrap()
}
