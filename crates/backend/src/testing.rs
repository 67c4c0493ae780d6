//! In-process stand-in for the Overpass interpreter endpoint.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Reply { status: 200, body: body.to_string(), delay: Duration::ZERO }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Reply { status, body: body.to_string(), delay: Duration::ZERO }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct FakeState {
    area: VecDeque<Reply>,
    elements: VecDeque<Reply>,
    requests: Vec<String>,
}

/// Area lookups (`out ids`) and geometry fetches get separate reply queues.
/// The last reply of each queue is repeated once the queue runs dry.
#[derive(Clone, Default)]
pub struct FakeUpstream {
    state: Arc<Mutex<FakeState>>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_area(self, reply: Reply) -> Self {
        self.state.lock().unwrap().area.push_back(reply);
        self
    }

    pub fn with_elements(self, reply: Reply) -> Self {
        self.state.lock().unwrap().elements.push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    fn next_reply(&self, query: String) -> Reply {
        let mut state = self.state.lock().unwrap();
        let is_area = query.contains("out ids;");
        state.requests.push(query);
        let queue = if is_area { &mut state.area } else { &mut state.elements };
        let reply = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        reply.unwrap_or_else(|| Reply::status(500, "no reply configured"))
    }

    /// Serve on an ephemeral port and return the interpreter URL.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/api/interpreter", post(interpreter))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/interpreter", addr)
    }
}

async fn interpreter(State(fake): State<FakeUpstream>, body: String) -> (StatusCode, String) {
    let reply = fake.next_reply(body);
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, reply.body)
}

/// Overpass area response for relation `id`.
pub fn area_json(id: u64) -> String {
    format!(r#"{{"elements": [{{"type": "relation", "id": {id}}}]}}"#)
}

/// One Overpass way with inline geometry, vertices given as `(lat, lon)`.
pub fn way_json(id: i64, tags: &[(&str, &str)], points: &[(f64, f64)]) -> serde_json::Value {
    let tags: serde_json::Map<String, serde_json::Value> = tags
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
        .collect();
    let geometry: Vec<serde_json::Value> = points
        .iter()
        .map(|(lat, lon)| serde_json::json!({ "lat": lat, "lon": lon }))
        .collect();
    serde_json::json!({ "type": "way", "id": id, "geometry": geometry, "tags": tags })
}

pub fn elements_json(elements: Vec<serde_json::Value>) -> String {
    serde_json::json!({ "elements": elements }).to_string()
}
