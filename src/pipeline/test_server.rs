//! In-process HTTP endpoint for exercising the HTTP source and sink

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Recorded {
    status: u16,
    body: String,
    delay: Duration,
    requests: Vec<(String, Vec<u8>)>,
    headers: HeaderMap,
}

/// Canned response plus everything the server has received
#[derive(Clone)]
pub struct TestServerState {
    inner: Arc<Mutex<Recorded>>,
}

impl Default for TestServerState {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Recorded {
                status: 200,
                body: "null".to_string(),
                delay: Duration::ZERO,
                requests: Vec::new(),
                headers: HeaderMap::new(),
            })),
        }
    }
}

impl TestServerState {
    /// Answer every following request with `status` and `body`
    pub fn set_response(&self, status: u16, body: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.status = status;
        inner.body = body.to_string();
    }

    /// Hold every following response for `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().delay = delay;
    }

    /// Method and body of every request received so far
    pub fn requests(&self) -> Vec<(String, Vec<u8>)> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Header value of the most recent request
    pub fn last_header(&self, name: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

async fn respond(
    State(state): State<TestServerState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let delay = {
        let mut inner = state.inner.lock().unwrap();
        if method != Method::GET {
            inner.requests.push((method.to_string(), body.to_vec()));
        }
        inner.headers = headers;
        inner.delay
    };
    tokio::time::sleep(delay).await;

    let inner = state.inner.lock().unwrap();
    let status = StatusCode::from_u16(inner.status).unwrap();
    (status, inner.body.clone())
}

pub struct TestServer {
    addr: SocketAddr,
}

impl TestServer {
    /// Serve on an ephemeral localhost port for the rest of the test
    pub async fn spawn(state: TestServerState) -> Self {
        let app = Router::new().fallback(respond).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}
