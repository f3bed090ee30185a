//! Persistent storage for patients and prescription logs.

pub mod record_store;

pub use record_store::{CaseFilter, RecordStore, SqliteRecordStore, StoreFuture};
