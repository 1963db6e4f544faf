#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::value::RawValue;

use pbench_core::api::{
    ClientError, ClientFactory, LoggingConfig, QueryClient, QueryHandle, Row, RunOptions, Session,
};

/// How the scripted server answers one query text.
#[derive(Debug, Clone)]
pub struct Behavior {
    pub batches: Vec<Vec<String>>,
    /// Reported by the server once the rows are drained.
    pub fail: Option<String>,
    pub panic: bool,
    pub submit_delay: Duration,
    pub batch_delay: Duration,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            batches: vec![vec!["[1]".to_string()]],
            fail: None,
            panic: false,
            submit_delay: Duration::ZERO,
            batch_delay: Duration::ZERO,
        }
    }
}

impl Behavior {
    pub fn rows(batches: &[&[&str]]) -> Self {
        Self {
            batches: batches
                .iter()
                .map(|batch| batch.iter().map(|r| r.to_string()).collect())
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            batches: Vec::new(),
            fail: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::default()
        }
    }

    /// Many small batches, each behind `delay`.
    pub fn slow(batches: usize, delay: Duration) -> Self {
        Self {
            batches: vec![vec!["[0]".to_string()]; batches],
            batch_delay: delay,
            ..Self::default()
        }
    }

    pub fn submitted_after(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub text: String,
    pub source: String,
    pub session: Session,
    pub query_id: String,
}

#[derive(Default)]
struct Shared {
    behaviors: HashMap<String, Behavior>,
    submissions: Mutex<Vec<Submission>>,
    events: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl Shared {
    fn behavior(&self, text: &str) -> Behavior {
        self.behaviors.get(text).cloned().unwrap_or_default()
    }

    fn event(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

/// In-memory factory. Unknown query texts return one row and succeed.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    shared: Arc<Shared>,
    clients_created: Arc<AtomicUsize>,
    fail_new_client: bool,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, behavior: Behavior) -> Self {
        Arc::get_mut(&mut self.shared)
            .expect("configure the factory before running")
            .behaviors
            .insert(text.to_string(), behavior);
        self
    }

    pub fn failing_new_client(mut self) -> Self {
        self.fail_new_client = true;
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.shared.submissions.lock().unwrap().clone()
    }

    pub fn submitted_texts(&self) -> Vec<String> {
        self.submissions().into_iter().map(|s| s.text).collect()
    }

    pub fn submission(&self, text: &str) -> Option<Submission> {
        self.submissions().into_iter().find(|s| s.text == text)
    }

    /// `start:<text>` and `end:<text>` markers in the order they happened.
    pub fn events(&self) -> Vec<String> {
        self.shared.events.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {event} never happened"))
    }

    pub fn clients_created(&self) -> usize {
        self.clients_created.load(Ordering::SeqCst)
    }
}

impl ClientFactory for ScriptedFactory {
    fn new_client(&self) -> Result<Arc<dyn QueryClient>, ClientError> {
        if self.fail_new_client {
            return Err(ClientError::Transport("connection refused".into()));
        }
        self.clients_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedClient {
            session: Session::default(),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct ScriptedClient {
    session: Session,
    shared: Arc<Shared>,
}

#[async_trait]
impl QueryClient for ScriptedClient {
    fn session(&self) -> &Session {
        &self.session
    }

    fn with_session(&self, session: Session) -> Arc<dyn QueryClient> {
        Arc::new(ScriptedClient {
            session,
            shared: Arc::clone(&self.shared),
        })
    }

    async fn query(&self, text: &str, source: &str) -> Result<Box<dyn QueryHandle>, ClientError> {
        let behavior = self.shared.behavior(text);
        let query_id = format!("q{}", self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        self.shared.submissions.lock().unwrap().push(Submission {
            text: text.to_string(),
            source: source.to_string(),
            session: self.session.clone(),
            query_id: query_id.clone(),
        });
        self.shared.event(format!("start:{text}"));

        if !behavior.submit_delay.is_zero() {
            tokio::time::sleep(behavior.submit_delay).await;
        }
        if behavior.panic {
            panic!("scripted panic for {text}");
        }

        Ok(Box::new(ScriptedHandle {
            info_uri: format!("http://scripted/ui/query.html?{query_id}"),
            id: query_id,
            text: text.to_string(),
            batches: behavior.batches.into_iter().collect(),
            fail: behavior.fail,
            batch_delay: behavior.batch_delay,
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn query_info(&self, query_id: &str) -> Result<Bytes, ClientError> {
        Ok(Bytes::from(format!(r#"{{"queryId":"{query_id}"}}"#)))
    }
}

struct ScriptedHandle {
    id: String,
    info_uri: String,
    text: String,
    batches: VecDeque<Vec<String>>,
    fail: Option<String>,
    batch_delay: Duration,
    shared: Arc<Shared>,
}

#[async_trait]
impl QueryHandle for ScriptedHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn info_uri(&self) -> &str {
        &self.info_uri
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>, ClientError> {
        if !self.batch_delay.is_zero() {
            tokio::time::sleep(self.batch_delay).await;
        }
        match self.batches.pop_front() {
            Some(batch) => Ok(Some(
                batch
                    .into_iter()
                    .map(|row| RawValue::from_string(row).expect("scripted rows are valid json"))
                    .collect(),
            )),
            None => {
                self.shared.event(format!("end:{}", self.text));
                match self.fail.take() {
                    Some(message) => Err(ClientError::Server {
                        query_id: self.id.clone(),
                        name: "SCRIPTED_FAILURE".into(),
                        message,
                    }),
                    None => Ok(None),
                }
            }
        }
    }
}

pub fn run_options(output_root: &Path) -> RunOptions {
    RunOptions {
        output_root: Some(output_root.to_path_buf()),
        logging: LoggingConfig {
            console: false,
            ..LoggingConfig::default()
        },
        ..RunOptions::default()
    }
}

pub fn read_summary(output_dir: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(output_dir.join("summary.csv")).unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}
