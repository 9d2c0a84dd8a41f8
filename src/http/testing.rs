//! In-memory doubles for HTTP-backed tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::cache::Clock;
use super::transport::{HttpError, Response, Transport};

/// Transport that serves canned responses and records every call.
///
/// Unrouted URLs answer 404 like the GitHub API does.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Response::new(status, body));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn called_urls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn tokens_for(&self, url: &str) -> Vec<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| called == url)
            .map(|(_, token)| token.clone())
            .collect()
    }
}

impl Transport for FakeTransport {
    fn get(&self, url: &str, token: Option<&str>) -> Result<Response, HttpError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), token.map(str::to_string)));

        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Response::new(404, r#"{"message": "Not Found"}"#)))
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}
