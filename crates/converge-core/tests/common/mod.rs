use async_trait::async_trait;
use converge_core::{Method, RemoteClient, TransportError};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Canned reply of the scripted client
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Value),
    Status(u16, &'static str),
}

/// Remote client replaying scripted replies per endpoint
///
/// The last reply for an endpoint repeats forever. Unscripted endpoints
/// answer 500.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_get(self, path: &str, replies: Vec<Reply>) -> Self {
        self.script(Method::Get, path, replies)
    }

    pub fn on_submit(self, method: Method, path: &str, reply: Reply) -> Self {
        self.script(method, path, vec![reply])
    }

    fn script(self, method: Method, path: &str, replies: Vec<Reply>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(format!("{} {}", method, path), replies.into());
        self
    }

    /// Every call made so far, as "METHOD path"
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        let key = format!("{} {}", method, path);
        self.calls().iter().filter(|c| **c == key).count()
    }

    fn answer(&self, method: Method, path: &str) -> Result<Value, TransportError> {
        let key = format!("{} {}", method, path);
        self.calls.lock().unwrap().push(key.clone());

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Ok(value)) => Ok(value),
            Some(Reply::Status(code, message)) => Err(TransportError::http(method, path, code, message)),
            None => Err(TransportError::http(method, path, 500, "unscripted endpoint")),
        }
    }
}

#[async_trait]
impl RemoteClient for ScriptedClient {
    async fn get(&self, path: &str) -> Result<Value, TransportError> {
        self.answer(Method::Get, path)
    }

    async fn submit(&self, method: Method, path: &str, _body: Option<&Value>) -> Result<Value, TransportError> {
        self.answer(method, path)
    }
}

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
