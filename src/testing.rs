//! Test doubles shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{TimeZone, Utc};
use tokio::io::BufReader;

use crate::clinical::adapters::completion::{CompletionFuture, CompletionService};
use crate::clinical::core::case_record::CaseRecord;
use crate::clinical::core::config::{ClinicConfig, RetrievalConfig, StorageConfig};
use crate::clinical::core::errors::{ClinicalError, ClinicalResult};
use crate::clinical::core::ids::{DoctorId, SubjectId};
use crate::clinical::core::subject::Subject;
use crate::clinical::embedding::embedder::{EmbedFuture, Embedder, EmbeddingVector};
use crate::clinical::retrieval::similar_cases::SimilarCaseRetriever;
use crate::clinical::storage::record_store::{RecordStore, SqliteRecordStore};
use crate::rpc::client::ToolClient;
use crate::rpc::server::{MessageProcessor, serve};
use crate::tools::prescription_tools::PrescriptionTools;
use crate::tools::registry::ToolRegistry;

/// Deterministic embedder: a letter histogram of the input text.
#[derive(Default)]
pub struct StubEmbedder {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_on: Option<String>,
    hang_on: Option<String>,
}

impl StubEmbedder {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn hanging_on(marker: &str) -> Self {
        Self {
            hang_on: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of embedding calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub fn letter_histogram(text: &str) -> Vec<f64> {
    let mut counts = vec![0.0; 27];
    for ch in text.chars().flat_map(char::to_lowercase) {
        let slot = if ch.is_ascii_lowercase() {
            (ch as usize) - ('a' as usize)
        } else {
            26
        };
        counts[slot] += 1.0;
    }
    counts
}

impl Embedder for StubEmbedder {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, ClinicalResult<EmbeddingVector>> {
        let text = text.to_string();
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.hang_on.as_deref().is_some_and(|m| text.contains(m)) {
                futures::future::pending::<()>().await;
            }
            if self.fail_on.as_deref().is_some_and(|m| text.contains(m)) {
                return Err(ClinicalError::EmbeddingUnavailable(
                    "scripted failure".to_string(),
                ));
            }
            EmbeddingVector::new(letter_histogram(&text))
        })
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

pub fn subject_p1() -> Subject {
    Subject::new(
        SubjectId::new("p1").unwrap(),
        "Ada",
        34,
        "flu",
        vec!["asthma".to_string()],
    )
}

pub fn case_for(subject: &Subject, symptoms: &str, prescription: &str, ms: i64) -> CaseRecord {
    CaseRecord::from_subject(
        subject,
        DoctorId::new("doctor1").unwrap(),
        "Dr. Smith",
        symptoms,
        prescription,
        Utc.timestamp_millis_opt(ms).single().unwrap(),
    )
}

/// In-memory store holding `p1` and the given cases for it.
pub async fn store_with_cases(cases: &[(&str, &str)]) -> Arc<SqliteRecordStore> {
    let store = SqliteRecordStore::open_in_memory(&StorageConfig::default())
        .await
        .unwrap();
    let subject = store.upsert_subject(subject_p1()).await.unwrap();
    for (i, (symptoms, prescription)) in cases.iter().enumerate() {
        let ms = 1_700_000_000_000 + i64::try_from(i).unwrap();
        store
            .append_case_record(case_for(&subject, symptoms, prescription, ms))
            .await
            .unwrap();
    }
    Arc::new(store)
}

/// Registry with the prescription tools over [`store_with_cases`].
pub async fn prescription_registry(cases: &[(&str, &str)]) -> ToolRegistry {
    let store: Arc<dyn RecordStore> = store_with_cases(cases).await;
    let retriever = SimilarCaseRetriever::new(
        Arc::clone(&store),
        Arc::new(StubEmbedder::default()),
        RetrievalConfig::default(),
    );
    let mut clinic = ClinicConfig::default();
    clinic
        .doctor_names
        .insert("doctor1".to_string(), "Dr. Smith".to_string());
    let mut registry = ToolRegistry::new();
    PrescriptionTools::new(store, retriever, clinic)
        .register(&mut registry)
        .unwrap();
    registry
}

/// Initialized client talking to a tool server task over an in-memory pipe.
pub async fn in_process_client(cases: &[(&str, &str)]) -> ToolClient {
    let registry = prescription_registry(cases).await;
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    tokio::spawn(async move {
        let mut processor = MessageProcessor::new(registry);
        serve(&mut processor, BufReader::new(server_read), server_write)
            .await
            .unwrap();
    });
    let (client_read, client_write) = tokio::io::split(client_io);
    let client = ToolClient::from_transport(client_read, client_write);
    client.initialize().await.unwrap();
    client
}

/// Completion service that echoes a fixed reply and records prompts.
#[derive(Default)]
pub struct StubCompletion {
    pub reply: String,
    pub prompts: std::sync::Mutex<Vec<String>>,
}

impl StubCompletion {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ..Self::default()
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

impl CompletionService for StubCompletion {
    fn complete(&self, prompt: &str) -> CompletionFuture<'_, ClinicalResult<String>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self.reply.clone();
        Box::pin(async move { Ok(reply) })
    }
}
