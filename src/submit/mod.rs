//! Session submission.
//!
//! Submitting always writes the local backup first. The network POST that
//! follows is best effort: its failure is logged and reported, but the
//! submission still counts as successful.

use crate::models::SessionDocument;
use crate::session::SessionAggregator;
use crate::storage::{BackupStore, StorageError};
use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// Where the submitter is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitStatus {
    #[default]
    Idle,
    Submitting,
    Success,
    Error,
}

/// Result of the network half of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The server answered with a success status.
    Delivered { status: u16 },
    /// The request failed or the server rejected it.
    Failed(String),
    /// No endpoint configured.
    Skipped,
}

/// A successful submission: the document that was stored and what the server said.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub document: SessionDocument,
    pub remote: RemoteOutcome,
}

/// Request body expected by the study backend.
#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    session_data: &'a SessionDocument,
}

/// Stores sessions locally and forwards them to the study backend.
pub struct Submitter {
    backup: Box<dyn BackupStore>,
    endpoint: Option<String>,
    http_client: reqwest::Client,
    status: SubmitStatus,
}

impl Submitter {
    /// Create a submitter. `endpoint: None` keeps submissions local.
    pub fn new(
        backup: Box<dyn BackupStore>,
        endpoint: Option<String>,
        timeout_seconds: u64,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_http_client(backup, endpoint, http_client))
    }

    /// Create a submitter around an existing HTTP client.
    pub fn with_http_client(
        backup: Box<dyn BackupStore>,
        endpoint: Option<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            backup,
            endpoint,
            http_client,
            status: SubmitStatus::Idle,
        }
    }

    pub fn status(&self) -> SubmitStatus {
        self.status
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Snapshot the session, back it up, then try to deliver it.
    ///
    /// Returns `Err` only when the local backup could not be written.
    /// Each call mints a new session id, so repeated calls store repeated copies.
    pub async fn submit(
        &mut self,
        session: &mut SessionAggregator,
    ) -> Result<SubmitOutcome, StorageError> {
        self.status = SubmitStatus::Submitting;

        let document = session.session_data();
        if let Err(e) = self.backup.append(&document) {
            error!("Submit error: {}", e);
            self.status = SubmitStatus::Error;
            return Err(e);
        }

        let remote = match self.endpoint.as_deref() {
            Some(endpoint) => self.post(endpoint, &document).await,
            None => RemoteOutcome::Skipped,
        };

        if let RemoteOutcome::Failed(ref reason) = remote {
            warn!("Backend submit failed, data saved locally: {}", reason);
        }

        self.status = SubmitStatus::Success;
        Ok(SubmitOutcome { document, remote })
    }

    async fn post(&self, endpoint: &str, document: &SessionDocument) -> RemoteOutcome {
        info!("Submitting session {} to {}", document.session_id, endpoint);

        let request = SubmitRequest {
            session_data: document,
        };
        match self.http_client.post(endpoint).json(&request).send().await {
            Ok(response) if response.status().is_success() => RemoteOutcome::Delivered {
                status: response.status().as_u16(),
            },
            Ok(response) => RemoteOutcome::Failed(format!("server returned {}", response.status())),
            Err(e) => RemoteOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileBackupStore, StorageResult};
    use serde_json::Value;
    use std::io;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct FailingStore;

    impl BackupStore for FailingStore {
        fn load(&self) -> StorageResult<Vec<Value>> {
            Ok(Vec::new())
        }

        fn append(&self, _document: &SessionDocument) -> StorageResult<()> {
            Err(StorageError::io(
                "submissions.json",
                io::Error::new(io::ErrorKind::Other, "disk full"),
            ))
        }
    }

    fn test_client() -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    fn make_session() -> SessionAggregator {
        let mut session = SessionAggregator::new();
        session.init_session();
        session.begin_exploration("Pop", "Happy");
        session.record_click("s1", 0.0, 0.0);
        session
    }

    fn header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    /// Accept one request, answer with `status_line`, and hand back the raw request.
    async fn spawn_endpoint(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);

                if let Some(end) = header_end(&buf) {
                    let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                    let length = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + length {
                        break;
                    }
                }
            }

            let response = format!(
                "{}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                status_line
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf).to_string()
        });

        (format!("http://{}/api/submit", addr), handle)
    }

    #[tokio::test]
    async fn test_submit_delivers_wrapped_document() {
        let dir = TempDir::new().unwrap();
        let store = FileBackupStore::new(dir.path().join("submissions.json"));
        let (endpoint, server) = spawn_endpoint("HTTP/1.1 200 OK").await;

        let mut submitter =
            Submitter::with_http_client(Box::new(store.clone()), Some(endpoint), test_client());
        let mut session = make_session();

        let outcome = submitter.submit(&mut session).await.unwrap();
        assert_eq!(outcome.remote, RemoteOutcome::Delivered { status: 200 });
        assert_eq!(submitter.status(), SubmitStatus::Success);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/submit"));
        let body = &request[header_end(request.as_bytes()).unwrap() + 4..];
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["session_data"]["sessionId"], outcome.document.session_id.as_str());

        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_still_succeeds() {
        let dir = TempDir::new().unwrap();
        let store = FileBackupStore::new(dir.path().join("submissions.json"));
        let (endpoint, _server) = spawn_endpoint("HTTP/1.1 500 Internal Server Error").await;

        let mut submitter =
            Submitter::with_http_client(Box::new(store.clone()), Some(endpoint), test_client());
        let mut session = make_session();

        let outcome = submitter.submit(&mut session).await.unwrap();
        assert!(matches!(outcome.remote, RemoteOutcome::Failed(_)));
        assert_eq!(submitter.status(), SubmitStatus::Success);
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_still_succeeds() {
        let dir = TempDir::new().unwrap();
        let store = FileBackupStore::new(dir.path().join("submissions.json"));

        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let endpoint = format!("http://127.0.0.1:{}/api/submit", port);

        let mut submitter =
            Submitter::with_http_client(Box::new(store.clone()), Some(endpoint), test_client());
        let mut session = make_session();

        let outcome = submitter.submit(&mut session).await.unwrap();
        assert!(matches!(outcome.remote, RemoteOutcome::Failed(_)));
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_backup_failure_is_an_error() {
        let mut submitter =
            Submitter::with_http_client(Box::new(FailingStore), None, test_client());
        let mut session = make_session();

        let result = tokio_test::block_on(submitter.submit(&mut session));
        assert!(result.is_err());
        assert_eq!(submitter.status(), SubmitStatus::Error);
    }

    #[test]
    fn test_repeated_submissions_store_distinct_copies() {
        let dir = TempDir::new().unwrap();
        let store = FileBackupStore::new(dir.path().join("submissions.json"));
        let mut submitter = Submitter::new(Box::new(store.clone()), None, 5).unwrap();
        let mut session = make_session();

        let first = tokio_test::block_on(submitter.submit(&mut session)).unwrap();
        let second = tokio_test::block_on(submitter.submit(&mut session)).unwrap();
        assert_eq!(first.remote, RemoteOutcome::Skipped);
        assert_ne!(first.document.session_id, second.document.session_id);

        let stored = store.load().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0]["userId"], stored[1]["userId"]);
    }
}
