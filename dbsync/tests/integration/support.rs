use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use wiremock::{Match, Request, Respond, ResponseTemplate};

/// Matches upload requests whose first record has the given `id`.
pub struct FirstRecordId(pub &'static str);

impl Match for FirstRecordId {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|body| body.get(0)?.get("id")?.as_str().map(|id| id == self.0))
            .unwrap_or(false)
    }
}

/// Responds with a fixed status and remembers when each request arrived.
#[derive(Clone)]
pub struct RecordingResponder {
    status: u16,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl RecordingResponder {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            arrivals: Arc::default(),
        }
    }

    pub fn arrivals(&self) -> Vec<Instant> {
        self.arrivals.lock().unwrap().clone()
    }
}

impl Respond for RecordingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(self.status)
    }
}

/// Returns the records of every upload request received by `server`, in arrival order.
pub async fn received_batches(server: &wiremock::MockServer) -> Vec<Vec<Value>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice::<Vec<Value>>(&request.body).unwrap())
        .collect()
}
