//! Shared fakes for in-crate tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;

use crate::backend::{ChatBackend, ChatCompletion, ChatRequest, estimate_tokens};
use crate::error::{BackendError, ProbeError};
use crate::health::ProbeTransport;

/// Probe transport with a settable verdict and a ping counter.
pub(crate) struct FakeTransport {
    pub reachable: AtomicBool,
    pub pings: AtomicU32,
}

impl FakeTransport {
    pub(crate) fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            pings: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ProbeTransport for FakeTransport {
    async fn ping(&self) -> Result<(), ProbeError> {
        self.pings.fetch_add(1, Ordering::Relaxed);
        if self.reachable.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(ProbeError {
                reason: "connection refused".to_string(),
            })
        }
    }
}

/// Chat backend that replies with canned text or a canned failure.
pub(crate) struct FakeBackend {
    id: &'static str,
    reply: Mutex<Result<String, String>>,
    pub calls: Mutex<Vec<ChatRequest>>,
}

impl FakeBackend {
    pub(crate) fn replying(id: &'static str, text: &str) -> Self {
        Self {
            id,
            reply: Mutex::new(Ok(text.to_string())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(id: &'static str, message: &str) -> Self {
        Self {
            id,
            reply: Mutex::new(Err(message.to_string())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_reply(&self, reply: Result<&str, &str>) {
        *self.reply.lock().unwrap() = reply.map(String::from).map_err(String::from);
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn last_request(&self) -> Option<ChatRequest> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    fn id(&self) -> &'static str {
        self.id
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, BackendError> {
        self.calls.lock().unwrap().push(request.clone());
        match &*self.reply.lock().unwrap() {
            Ok(text) => Ok(ChatCompletion {
                text: text.clone(),
                tokens: estimate_tokens(text),
            }),
            Err(message) => Err(BackendError::Status {
                backend: self.id.to_string(),
                status: 500,
                message: message.clone(),
            }),
        }
    }
}
