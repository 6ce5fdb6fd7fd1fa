//! Scripted network layer for deterministic tests.
//!
//! Routes are matched by substring against the requested URL, in the order
//! they were scripted. Each request consumes the next reply of its route;
//! the last reply repeats forever.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{HttpError, HttpResponse, NetworkLayer};

/// One scripted upstream behavior.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Answer with the given status and body
    Respond { status_code: u16, body: String },
    /// Fail at the transport level
    Fail { reason: String },
    /// Never answer
    Hang,
    /// Wait before producing the inner reply
    Delayed(Duration, Box<ScriptedReply>),
}

impl ScriptedReply {
    /// 200 response with a JSON body.
    pub fn json(body: impl Into<String>) -> Self {
        Self::Respond {
            status_code: 200,
            body: body.into(),
        }
    }

    /// Empty response with the given status.
    pub fn status(status_code: u16) -> Self {
        Self::Respond {
            status_code,
            body: String::new(),
        }
    }

    /// Transport failure.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }

    /// Same reply after `delay`.
    pub fn after(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

#[derive(Debug)]
struct Route {
    pattern: String,
    replies: VecDeque<ScriptedReply>,
    hits: usize,
}

/// In-memory [`NetworkLayer`] answering from scripted routes.
#[derive(Debug, Default)]
pub struct ScriptedNetworkLayer {
    routes: Mutex<Vec<Route>>,
}

impl ScriptedNetworkLayer {
    /// Creates a layer with no routes; unmatched requests fail with 404.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the replies for URLs containing `pattern`.
    pub fn script(&self, pattern: impl Into<String>, replies: Vec<ScriptedReply>) {
        self.routes.lock().push(Route {
            pattern: pattern.into(),
            replies: replies.into(),
            hits: 0,
        });
    }

    /// Number of requests that matched `pattern`.
    pub fn request_count(&self, pattern: &str) -> usize {
        self.routes
            .lock()
            .iter()
            .filter(|route| route.pattern == pattern)
            .map(|route| route.hits)
            .sum()
    }

    fn next_reply(&self, url: &str) -> ScriptedReply {
        let mut routes = self.routes.lock();
        let Some(route) = routes.iter_mut().find(|route| url.contains(&route.pattern)) else {
            return ScriptedReply::status(404);
        };
        route.hits += 1;

        if route.replies.len() > 1 {
            route.replies.pop_front().unwrap_or(ScriptedReply::status(404))
        } else {
            route
                .replies
                .front()
                .cloned()
                .unwrap_or(ScriptedReply::status(404))
        }
    }
}

#[async_trait]
impl NetworkLayer for ScriptedNetworkLayer {
    async fn http_get(
        &self,
        url: &str,
        _headers: &BTreeMap<String, String>,
    ) -> Result<HttpResponse, HttpError> {
        let mut reply = self.next_reply(url);

        loop {
            match reply {
                ScriptedReply::Respond { status_code, body } => {
                    return Ok(HttpResponse::new(status_code, body.into_bytes()));
                }
                ScriptedReply::Fail { reason } => {
                    return Err(HttpError::Transport {
                        url: url.to_string(),
                        reason,
                    });
                }
                ScriptedReply::Hang => std::future::pending::<()>().await,
                ScriptedReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}
