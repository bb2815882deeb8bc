//! Scripted transport for tests.

use super::Transport;
use crate::error::{ApiError, Error, Result};
use crate::types::Request;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
enum Reply {
    Body(Value),
    Fail(ApiError),
    Broken(String),
}

impl Reply {
    fn into_result(self) -> Result<Value> {
        match self {
            Self::Body(v) => Ok(v),
            Self::Fail(e) => Err(Error::Api(e)),
            Self::Broken(msg) => Err(Error::Transport(msg)),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    replies: HashMap<String, VecDeque<Reply>>,
    calls: Vec<Request>,
}

/// Transport that replays scripted replies per action.
///
/// Replies queued for an action are consumed in order; the last one is
/// sticky and keeps answering once the queue is down to it. An action with
/// no scripted reply fails with [`Error::Transport`]. Every issued request
/// is recorded.
///
/// Clones share state, so a test can keep a handle after passing one to
/// the code under test.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    /// Create a transport with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, action: &str, reply: Reply) -> &Self {
        self.lock()
            .replies
            .entry(action.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue a successful body for an action.
    pub fn respond(&self, action: &str, body: Value) -> &Self {
        self.push(action, Reply::Body(body))
    }

    /// Queue a provider error for an action.
    pub fn fail(&self, action: &str, code: &str, message: &str) -> &Self {
        self.push(action, Reply::Fail(ApiError::new(code, message)))
    }

    /// Queue a transport failure (no response at all) for an action.
    pub fn break_transport(&self, action: &str, message: &str) -> &Self {
        self.push(action, Reply::Broken(message.to_string()))
    }

    /// All requests issued so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Request> {
        self.lock().calls.clone()
    }

    /// Action names of all requests issued so far, in order.
    #[must_use]
    pub fn actions(&self) -> Vec<String> {
        self.lock().calls.iter().map(|r| r.action.clone()).collect()
    }

    /// Number of requests issued for an action.
    #[must_use]
    pub fn call_count(&self, action: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|r| r.action == action)
            .count()
    }
}

impl Transport for MockTransport {
    fn issue(&self, request: &Request) -> Result<Value> {
        let mut state = self.lock();
        state.calls.push(request.clone());

        let Some(queue) = state.replies.get_mut(&request.action) else {
            return Err(Error::Transport(format!(
                "no scripted reply for {}",
                request.action
            )));
        };
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        reply.map_or_else(
            || {
                Err(Error::Transport(format!(
                    "no scripted reply for {}",
                    request.action
                )))
            },
            Reply::into_result,
        )
    }
}
