//! Patient and prescription log storage.

use std::future::Future;
use std::pin::Pin;

use chrono::{TimeZone, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::clinical::core::case_record::CaseRecord;
use crate::clinical::core::config::StorageConfig;
use crate::clinical::core::errors::{ClinicalError, ClinicalResult};
use crate::clinical::core::ids::{CaseRecordId, DoctorId, SubjectId};
use crate::clinical::core::subject::Subject;

/// Boxed future type for record store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which case records to load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaseFilter {
    /// Every record in the store.
    All,
    /// Records belonging to one subject.
    Subject(SubjectId),
    /// Records written by one doctor.
    Doctor(DoctorId),
}

/// Record store boundary consumed by the tools.
///
/// Case records are append-only: there is no update or delete.
pub trait RecordStore: Send + Sync {
    /// Look up a subject.
    ///
    /// # Errors
    /// Returns [`ClinicalError::StoreUnavailable`] if storage access fails.
    fn find_subject_by_id(&self, id: &SubjectId)
    -> StoreFuture<'_, ClinicalResult<Option<Subject>>>;

    /// List every subject.
    ///
    /// # Errors
    /// Returns [`ClinicalError::StoreUnavailable`] if storage access fails.
    fn list_subjects(&self) -> StoreFuture<'_, ClinicalResult<Vec<Subject>>>;

    /// List the subjects booked with a doctor.
    ///
    /// # Errors
    /// Returns [`ClinicalError::StoreUnavailable`] if storage access fails.
    fn list_subjects_by_doctor(
        &self,
        doctor_id: &DoctorId,
    ) -> StoreFuture<'_, ClinicalResult<Vec<Subject>>>;

    /// Create or replace a subject.
    ///
    /// # Errors
    /// Returns [`ClinicalError::StoreUnavailable`] if storage access fails.
    fn upsert_subject(&self, subject: Subject) -> StoreFuture<'_, ClinicalResult<Subject>>;

    /// Load case records in insertion order.
    ///
    /// # Errors
    /// Returns [`ClinicalError::StoreUnavailable`] if storage access fails.
    fn find_case_records(
        &self,
        filter: CaseFilter,
    ) -> StoreFuture<'_, ClinicalResult<Vec<CaseRecord>>>;

    /// Look up one case record.
    ///
    /// # Errors
    /// Returns [`ClinicalError::StoreUnavailable`] if storage access fails.
    fn find_case_record_by_id(
        &self,
        id: &CaseRecordId,
    ) -> StoreFuture<'_, ClinicalResult<Option<CaseRecord>>>;

    /// Append a case record.
    ///
    /// # Errors
    /// Returns [`ClinicalError::SubjectNotFound`] if the subject reference does
    /// not resolve, [`ClinicalError::InvalidRecord`] if the id is taken, or
    /// [`ClinicalError::StoreUnavailable`] if storage access fails.
    fn append_case_record(&self, record: CaseRecord) -> StoreFuture<'_, ClinicalResult<()>>;
}

/// `SQLite` implementation of the record store.
pub struct SqliteRecordStore {
    conn: Connection,
    subject_table: String,
    case_table: String,
}

type SubjectRow = (String, String, i64, Option<String>, String, String, Option<String>);

type CaseRow = (
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    String,
    String,
    String,
    i64,
);

enum AppendOutcome {
    Appended,
    MissingSubject,
    DuplicateId,
}

impl SqliteRecordStore {
    /// Open (and create if needed) the store at the configured path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(config: &StorageConfig) -> ClinicalResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        info!("Opened record store at {}", config.sqlite_path.display());
        Self::init(conn, config).await
    }

    /// Open an ephemeral in-memory store.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn open_in_memory(config: &StorageConfig) -> ClinicalResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn, config).await
    }

    async fn init(conn: Connection, config: &StorageConfig) -> ClinicalResult<Self> {
        let subject_table = config.subject_table.clone();
        let case_table = config.case_table.clone();
        let (subjects, cases) = (subject_table.clone(), case_table.clone());

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {subjects} (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    age INTEGER NOT NULL,
                    email TEXT,
                    diagnosis TEXT NOT NULL,
                    history_json TEXT NOT NULL,
                    selected_doctor TEXT,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{subjects}_doctor ON {subjects}(selected_doctor);
                CREATE TABLE IF NOT EXISTS {cases} (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    patient_id TEXT NOT NULL REFERENCES {subjects}(id),
                    patient_name TEXT NOT NULL,
                    doctor_id TEXT NOT NULL,
                    doctor_name TEXT NOT NULL,
                    age INTEGER NOT NULL,
                    diagnosis TEXT NOT NULL,
                    history_json TEXT NOT NULL,
                    symptoms TEXT NOT NULL,
                    prescription TEXT NOT NULL,
                    created_at_ns INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{cases}_patient ON {cases}(patient_id);
                CREATE INDEX IF NOT EXISTS idx_{cases}_doctor ON {cases}(doctor_id);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            subject_table,
            case_table,
        })
    }

    /// Close the underlying connection.
    ///
    /// # Errors
    /// Returns an error if pending work cannot be flushed.
    pub async fn close(self) -> ClinicalResult<()> {
        self.conn.close().await?;
        info!("Closed record store");
        Ok(())
    }

    async fn query_subjects(
        &self,
        filter: Option<DoctorId>,
    ) -> ClinicalResult<Vec<Subject>> {
        let table = self.subject_table.clone();
        let rows = self
            .conn
            .call(move |conn| {
                let base = format!(
                    "SELECT id, name, age, email, diagnosis, history_json, selected_doctor FROM {table}"
                );
                let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<SubjectRow> {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                };
                let rows = match filter {
                    Some(doctor) => conn
                        .prepare(&format!("{base} WHERE selected_doctor = ?1 ORDER BY rowid"))?
                        .query_map(rusqlite::params![doctor], map_row)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?,
                    None => conn
                        .prepare(&format!("{base} ORDER BY rowid"))?
                        .query_map([], map_row)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?,
                };
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(subject_from_row).collect()
    }
}

fn subject_from_row(row: SubjectRow) -> ClinicalResult<Subject> {
    let (id, name, age, email, diagnosis, history_json, selected_doctor) = row;
    Ok(Subject {
        id: SubjectId::new(id).map_err(|err| ClinicalError::InvalidRecord(err.to_string()))?,
        name,
        age: u32::try_from(age)
            .map_err(|_| ClinicalError::InvalidRecord(format!("invalid age {age}")))?,
        email,
        diagnosis,
        history: serde_json::from_str(&history_json)?,
        selected_doctor: selected_doctor
            .map(DoctorId::new)
            .transpose()
            .map_err(|err| ClinicalError::InvalidRecord(err.to_string()))?,
    })
}

fn case_from_row(row: CaseRow) -> ClinicalResult<CaseRecord> {
    let (
        id,
        patient_id,
        patient_name,
        doctor_id,
        doctor_name,
        age,
        diagnosis,
        history_json,
        symptoms,
        prescription,
        created_at_ns,
    ) = row;
    let invalid = |err: crate::clinical::core::ids::EmptyIdError| {
        ClinicalError::InvalidRecord(err.to_string())
    };
    Ok(CaseRecord {
        id: CaseRecordId::new(id).map_err(invalid)?,
        subject_id: SubjectId::new(patient_id).map_err(invalid)?,
        subject_name: patient_name,
        doctor_id: DoctorId::new(doctor_id).map_err(invalid)?,
        doctor_name,
        age: u32::try_from(age)
            .map_err(|_| ClinicalError::InvalidRecord(format!("invalid age {age}")))?,
        diagnosis,
        history: serde_json::from_str(&history_json)?,
        symptoms,
        prescription,
        created_at: Utc.timestamp_nanos(created_at_ns),
    })
}

fn map_case_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CaseRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

const CASE_COLUMNS: &str = "id, patient_id, patient_name, doctor_id, doctor_name, age, diagnosis, \
                            history_json, symptoms, prescription, created_at_ns";

impl RecordStore for SqliteRecordStore {
    fn find_subject_by_id(
        &self,
        id: &SubjectId,
    ) -> StoreFuture<'_, ClinicalResult<Option<Subject>>> {
        let id = id.clone();
        Box::pin(async move {
            let table = self.subject_table.clone();
            let row = self
                .conn
                .call(move |conn| {
                    let row: Option<SubjectRow> = conn
                        .query_row(
                            &format!(
                                "SELECT id, name, age, email, diagnosis, history_json, selected_doctor
                                 FROM {table} WHERE id = ?1"
                            ),
                            rusqlite::params![id],
                            |row| {
                                Ok((
                                    row.get(0)?,
                                    row.get(1)?,
                                    row.get(2)?,
                                    row.get(3)?,
                                    row.get(4)?,
                                    row.get(5)?,
                                    row.get(6)?,
                                ))
                            },
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            row.map(subject_from_row).transpose()
        })
    }

    fn list_subjects(&self) -> StoreFuture<'_, ClinicalResult<Vec<Subject>>> {
        Box::pin(self.query_subjects(None))
    }

    fn list_subjects_by_doctor(
        &self,
        doctor_id: &DoctorId,
    ) -> StoreFuture<'_, ClinicalResult<Vec<Subject>>> {
        Box::pin(self.query_subjects(Some(doctor_id.clone())))
    }

    fn upsert_subject(&self, subject: Subject) -> StoreFuture<'_, ClinicalResult<Subject>> {
        Box::pin(async move {
            let table = self.subject_table.clone();
            let history_json = serde_json::to_string(&subject.history)?;
            let updated_at = Utc::now().timestamp_millis();
            let row = subject.clone();

            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table}
                                (id, name, age, email, diagnosis, history_json, selected_doctor, updated_at)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                             ON CONFLICT(id) DO UPDATE SET
                                name = excluded.name,
                                age = excluded.age,
                                email = excluded.email,
                                diagnosis = excluded.diagnosis,
                                history_json = excluded.history_json,
                                selected_doctor = excluded.selected_doctor,
                                updated_at = excluded.updated_at"
                        ),
                        rusqlite::params![
                            row.id,
                            row.name,
                            i64::from(row.age),
                            row.email,
                            row.diagnosis,
                            history_json,
                            row.selected_doctor,
                            updated_at
                        ],
                    )?;
                    Ok(())
                })
                .await?;

            debug!("Saved subject {}", subject.id);
            Ok(subject)
        })
    }

    fn find_case_records(
        &self,
        filter: CaseFilter,
    ) -> StoreFuture<'_, ClinicalResult<Vec<CaseRecord>>> {
        Box::pin(async move {
            let table = self.case_table.clone();
            let rows = self
                .conn
                .call(move |conn| {
                    let base = format!("SELECT {CASE_COLUMNS} FROM {table}");
                    let rows = match filter {
                        CaseFilter::All => conn
                            .prepare(&format!("{base} ORDER BY seq"))?
                            .query_map([], map_case_row)?
                            .collect::<Result<Vec<_>, rusqlite::Error>>()?,
                        CaseFilter::Subject(subject_id) => conn
                            .prepare(&format!("{base} WHERE patient_id = ?1 ORDER BY seq"))?
                            .query_map(rusqlite::params![subject_id], map_case_row)?
                            .collect::<Result<Vec<_>, rusqlite::Error>>()?,
                        CaseFilter::Doctor(doctor_id) => conn
                            .prepare(&format!("{base} WHERE doctor_id = ?1 ORDER BY seq"))?
                            .query_map(rusqlite::params![doctor_id], map_case_row)?
                            .collect::<Result<Vec<_>, rusqlite::Error>>()?,
                    };
                    Ok(rows)
                })
                .await?;

            rows.into_iter().map(case_from_row).collect()
        })
    }

    fn find_case_record_by_id(
        &self,
        id: &CaseRecordId,
    ) -> StoreFuture<'_, ClinicalResult<Option<CaseRecord>>> {
        let id = id.clone();
        Box::pin(async move {
            let table = self.case_table.clone();
            let row = self
                .conn
                .call(move |conn| {
                    let row: Option<CaseRow> = conn
                        .query_row(
                            &format!("SELECT {CASE_COLUMNS} FROM {table} WHERE id = ?1"),
                            rusqlite::params![id],
                            map_case_row,
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            row.map(case_from_row).transpose()
        })
    }

    fn append_case_record(&self, record: CaseRecord) -> StoreFuture<'_, ClinicalResult<()>> {
        Box::pin(async move {
            let subjects = self.subject_table.clone();
            let cases = self.case_table.clone();
            let history_json = serde_json::to_string(&record.history)?;
            let created_at = record.created_at.timestamp_nanos_opt().ok_or_else(|| {
                ClinicalError::InvalidRecord(format!(
                    "timestamp {} is outside the storable range",
                    record.created_at
                ))
            })?;
            let record_id = record.id.clone();
            let subject_id = record.subject_id.clone();

            let outcome = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let subject_exists: bool = tx.query_row(
                        &format!("SELECT EXISTS(SELECT 1 FROM {subjects} WHERE id = ?1)"),
                        rusqlite::params![record.subject_id],
                        |row| row.get(0),
                    )?;
                    if !subject_exists {
                        return Ok(AppendOutcome::MissingSubject);
                    }
                    let id_taken: bool = tx.query_row(
                        &format!("SELECT EXISTS(SELECT 1 FROM {cases} WHERE id = ?1)"),
                        rusqlite::params![record.id],
                        |row| row.get(0),
                    )?;
                    if id_taken {
                        return Ok(AppendOutcome::DuplicateId);
                    }
                    tx.execute(
                        &format!(
                            "INSERT INTO {cases} ({CASE_COLUMNS})
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                        ),
                        rusqlite::params![
                            record.id,
                            record.subject_id,
                            record.subject_name,
                            record.doctor_id,
                            record.doctor_name,
                            i64::from(record.age),
                            record.diagnosis,
                            history_json,
                            record.symptoms,
                            record.prescription,
                            created_at
                        ],
                    )?;
                    tx.commit()?;
                    Ok(AppendOutcome::Appended)
                })
                .await?;

            match outcome {
                AppendOutcome::Appended => {
                    debug!("Appended case record {record_id} for subject {subject_id}");
                    Ok(())
                }
                AppendOutcome::MissingSubject => {
                    Err(ClinicalError::SubjectNotFound(subject_id.into_string()))
                }
                AppendOutcome::DuplicateId => Err(ClinicalError::InvalidRecord(format!(
                    "prescription id {record_id} already exists"
                ))),
            }
        })
    }
}
