//! Similarity retrieval over the prescription log.

pub mod ranking;
pub mod search;
pub mod similar_cases;

pub use ranking::{Ranked, cosine_similarity, rank};
pub use search::{
    NO_HISTORY, NO_SIMILAR_CASES, build_candidate_text, build_query_text, format_similar_case,
};
pub use similar_cases::SimilarCaseRetriever;
