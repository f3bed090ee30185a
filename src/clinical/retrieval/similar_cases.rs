//! Similar prescription retrieval over the whole case log.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::clinical::core::case_record::CaseRecord;
use crate::clinical::core::config::{RetrievalConfig, RetrievalScope};
use crate::clinical::core::errors::{ClinicalError, ClinicalResult};
use crate::clinical::core::ids::SubjectId;
use crate::clinical::embedding::embedder::{Embedder, EmbeddingVector};
use crate::clinical::retrieval::ranking::{Ranked, rank};
use crate::clinical::retrieval::search::{
    NO_SIMILAR_CASES, build_candidate_text, build_query_text, format_similar_case,
};
use crate::clinical::storage::record_store::{CaseFilter, RecordStore};

/// Ranks stored case records against a subject's new symptoms.
#[derive(Clone)]
pub struct SimilarCaseRetriever {
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl SimilarCaseRetriever {
    /// Create a retriever.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Return the top-ranked case records with their scores.
    ///
    /// # Errors
    /// Returns [`ClinicalError::SubjectNotFound`] for an unknown subject,
    /// [`ClinicalError::EmbeddingUnavailable`] if any embedding fails or the
    /// deadline passes, and [`ClinicalError::StoreUnavailable`] on storage errors.
    pub async fn find_similar(
        &self,
        subject_id: &SubjectId,
        symptoms: &str,
    ) -> ClinicalResult<Vec<Ranked<CaseRecord>>> {
        let subject = self
            .store
            .find_subject_by_id(subject_id)
            .await?
            .ok_or_else(|| ClinicalError::SubjectNotFound(subject_id.to_string()))?;

        let filter = match self.config.scope {
            RetrievalScope::AllSubjects => CaseFilter::All,
            RetrievalScope::SameSubject => CaseFilter::Subject(subject_id.clone()),
        };
        let candidates = self.store.find_case_records(filter).await?;
        if candidates.is_empty() {
            debug!(subject = %subject_id, "no candidate records to rank");
            return Ok(Vec::new());
        }

        let query_text = build_query_text(&subject, symptoms);
        let candidate_texts: Vec<String> = candidates.iter().map(build_candidate_text).collect();
        let (query, vectors) = self.embed_all(&query_text, &candidate_texts).await?;

        let ranked = rank(
            &query,
            candidates.into_iter().zip(vectors).collect(),
            self.config.top_k,
        );
        info!(
            subject = %subject_id,
            candidates = candidate_texts.len(),
            returned = ranked.len(),
            "ranked similar prescriptions"
        );
        Ok(ranked)
    }

    /// Return the similar-cases block, or the fallback text when nothing matched.
    ///
    /// # Errors
    /// Same as [`SimilarCaseRetriever::find_similar`].
    pub async fn similar_cases_text(
        &self,
        subject_id: &SubjectId,
        symptoms: &str,
    ) -> ClinicalResult<String> {
        let ranked = self.find_similar(subject_id, symptoms).await?;
        if ranked.is_empty() {
            return Ok(NO_SIMILAR_CASES.to_string());
        }
        Ok(ranked
            .iter()
            .map(|hit| format_similar_case(&hit.item))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn embed_all(
        &self,
        query_text: &str,
        candidate_texts: &[String],
    ) -> ClinicalResult<(EmbeddingVector, Vec<EmbeddingVector>)> {
        let embedder = self.embedder.as_ref();
        let fan_out = async {
            futures::try_join!(
                embedder.embed_text(query_text),
                try_join_all(candidate_texts.iter().map(|text| embedder.embed_text(text))),
            )
        };

        match self.config.embedding_deadline_ms {
            None => fan_out.await,
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), fan_out)
                .await
                .map_err(|_| {
                    warn!(deadline_ms = ms, "embedding fan-out exceeded its deadline");
                    ClinicalError::EmbeddingUnavailable(format!(
                        "embedding calls did not finish within {ms} ms"
                    ))
                })?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinical::core::config::StorageConfig;
    use crate::clinical::core::subject::Subject;
    use crate::clinical::storage::record_store::SqliteRecordStore;
    use crate::testing::{StubEmbedder, case_for, store_with_cases};

    fn retriever(
        store: Arc<SqliteRecordStore>,
        embedder: Arc<StubEmbedder>,
        config: RetrievalConfig,
    ) -> SimilarCaseRetriever {
        SimilarCaseRetriever::new(store, embedder, config)
    }

    fn p1() -> SubjectId {
        SubjectId::new("p1").unwrap()
    }

    #[tokio::test]
    async fn test_no_records_returns_fallback_without_embedding() {
        let store = store_with_cases(&[]).await;
        let embedder = Arc::new(StubEmbedder::default());
        let retriever = retriever(store, embedder.clone(), RetrievalConfig::default());

        let text = retriever.similar_cases_text(&p1(), "cough").await.unwrap();
        assert_eq!(text, "No similar prescriptions found.");
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_subject_fails_before_embedding() {
        let store = store_with_cases(&[("fever", "paracetamol")]).await;
        let embedder = Arc::new(StubEmbedder::default());
        let retriever = retriever(store, embedder.clone(), RetrievalConfig::default());

        let err = retriever
            .similar_cases_text(&SubjectId::new("ghost").unwrap(), "cough")
            .await
            .unwrap_err();
        assert!(matches!(err, ClinicalError::SubjectNotFound(id) if id == "ghost"));
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_returns_top_two_in_score_order() {
        let store = store_with_cases(&[
            ("zzz", "xylophone"),
            ("cough", "honey syrup"),
            ("dry cough", "lozenges"),
        ])
        .await;
        let embedder = Arc::new(StubEmbedder::default());
        let retriever = retriever(store, embedder.clone(), RetrievalConfig::default());

        let ranked = retriever.find_similar(&p1(), "cough").await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].score >= ranked[1].score);
        assert!(ranked.iter().all(|hit| hit.item.symptoms != "zzz"));
        assert_eq!(embedder.calls(), 4);

        let text = retriever.similar_cases_text(&p1(), "cough").await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| line.starts_with("Patient: p1 | Symptoms: ")));
    }

    #[tokio::test]
    async fn test_embeddings_run_concurrently() {
        let store = store_with_cases(&[
            ("fever", "paracetamol"),
            ("cough", "honey syrup"),
            ("rash", "cream"),
        ])
        .await;
        let embedder = Arc::new(StubEmbedder::default());
        let retriever = retriever(store, embedder.clone(), RetrievalConfig::default());

        retriever.find_similar(&p1(), "cough").await.unwrap();
        assert_eq!(embedder.calls(), 4);
        assert_eq!(embedder.max_in_flight(), 4);
    }

    #[tokio::test]
    async fn test_one_failed_embedding_fails_whole_call() {
        let store = store_with_cases(&[
            ("fever", "paracetamol"),
            ("rash", "BROKEN cream"),
            ("cough", "honey syrup"),
        ])
        .await;
        let embedder = Arc::new(StubEmbedder::failing_on("BROKEN"));
        let retriever = retriever(store, embedder, RetrievalConfig::default());

        let err = retriever.find_similar(&p1(), "cough").await.unwrap_err();
        assert!(matches!(err, ClinicalError::EmbeddingUnavailable(_)));

        let outcome = retriever.similar_cases_text(&p1(), "cough").await;
        assert!(matches!(outcome, Err(ClinicalError::EmbeddingUnavailable(_))));
    }

    #[tokio::test]
    async fn test_deadline_exceeded_is_embedding_unavailable() {
        let store = store_with_cases(&[("fever", "SLOW remedy")]).await;
        let embedder = Arc::new(StubEmbedder::hanging_on("SLOW"));
        let config = RetrievalConfig {
            embedding_deadline_ms: Some(50),
            ..RetrievalConfig::default()
        };
        let retriever = retriever(store, embedder, config);

        let err = retriever.similar_cases_text(&p1(), "cough").await.unwrap_err();
        assert!(matches!(err, ClinicalError::EmbeddingUnavailable(msg) if msg.contains("50 ms")));
    }

    #[tokio::test]
    async fn test_scope_controls_candidate_set() {
        let store = SqliteRecordStore::open_in_memory(&StorageConfig::default())
            .await
            .unwrap();
        let p1 = store
            .upsert_subject(crate::testing::subject_p1())
            .await
            .unwrap();
        let p2 = store
            .upsert_subject(Subject::new(
                SubjectId::new("p2").unwrap(),
                "Bo",
                50,
                "flu",
                Vec::new(),
            ))
            .await
            .unwrap();
        store
            .append_case_record(case_for(&p2, "cough", "honey", 1))
            .await
            .unwrap();
        store
            .append_case_record(case_for(&p1, "fever", "paracetamol", 2))
            .await
            .unwrap();
        let store = Arc::new(store);

        let everyone = retriever(
            store.clone(),
            Arc::new(StubEmbedder::default()),
            RetrievalConfig::default(),
        );
        let ranked = everyone.find_similar(&p1.id, "cough").await.unwrap();
        assert_eq!(ranked.len(), 2);

        let same = retriever(
            store,
            Arc::new(StubEmbedder::default()),
            RetrievalConfig {
                scope: RetrievalScope::SameSubject,
                ..RetrievalConfig::default()
            },
        );
        let ranked = same.find_similar(&p1.id, "cough").await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].item.subject_id, p1.id);
    }
}
