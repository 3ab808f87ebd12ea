//! End-to-end loads through the in-memory store.

use async_trait::async_trait;
use relational_import::app::demo;
use relational_import::domain::convert::ConversionKind;
use relational_import::domain::model::examples::{school_tables, university_history_tables, university_tables};
use relational_import::domain::model::ModelRegistry;
use relational_import::domain::record::{Record, StoredRecord, SurrogateKey};
use relational_import::domain::report::RejectionReason;
use relational_import::domain::source::records_from_csv_str;
use relational_import::storage::StoreTransaction;
use relational_import::{
    BatchSpec, Criteria, DuplicateKeyPolicy, DuplicateLinkPolicy, ImportService, LoadError, LoadPlan,
    Loader, LoaderOptions, MemoryStore, PlanError, Store, StoreError, StoreFaults, TableSpec,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn rec(value: Value) -> Record {
    value.as_object().cloned().expect("record literal must be an object")
}

fn recs(values: Vec<Value>) -> Vec<Record> {
    values.into_iter().map(rec).collect()
}

/// teachers(name unique, subject) <- students(name, teacher_id)
fn minimal_school() -> Vec<TableSpec> {
    serde_json::from_value(json!([
        {
            "table_name": "teachers",
            "columns": [
                {"name": "name", "col_type": "text", "unique": true},
                {"name": "subject", "col_type": "text", "nullable": true}
            ]
        },
        {
            "table_name": "students",
            "columns": [
                {"name": "name", "col_type": "text"},
                {"name": "grade", "col_type": "int", "nullable": true},
                {"name": "teacher_id", "col_type": "big_int",
                 "references": {"table": "teachers", "on_delete_cascade": true}}
            ]
        }
    ]))
    .expect("valid schema")
}

fn teachers_batch(records: Vec<Value>) -> BatchSpec {
    BatchSpec::new("teachers", "teachers")
        .natural_key("name")
        .records(recs(records))
}

fn students_batch(records: Vec<Value>) -> BatchSpec {
    BatchSpec::new("students", "students")
        .reference("teacher_name", "teachers", "teacher_id")
        .records(recs(records))
}

fn enrollment_plan(link_policy: DuplicateLinkPolicy, enrollments: Vec<Value>) -> LoadPlan {
    LoadPlan::new(vec![
        BatchSpec::new("students", "university_students")
            .natural_key("email")
            .records(recs(vec![
                json!({"name": "Alice Smith", "email": "alice@example.com"}),
                json!({"name": "Bob Johnson", "email": "bob@example.com"}),
            ])),
        BatchSpec::new("courses", "courses")
            .natural_key("title")
            .records(recs(vec![
                json!({"title": "Python Programming", "description": "Basics"}),
                json!({"title": "Machine Learning", "description": null}),
            ])),
        BatchSpec::new("enrollments", "student_course_links")
            .reference("student_email", "students", "student_id")
            .reference("course_title", "courses", "course_id")
            .convert("enrollment_date", ConversionKind::date_time())
            .link(["student_id", "course_id"], link_policy)
            .records(recs(enrollments)),
    ])
}

async fn rows(store: &MemoryStore, table: &str) -> Vec<StoredRecord> {
    store.query(table, &Criteria::all()).await.expect("query")
}

#[tokio::test]
async fn unresolved_teacher_is_rejected_and_the_rest_commits() -> anyhow::Result<()> {
    let store = MemoryStore::with_schema(&minimal_school()).await?;
    let plan = LoadPlan::new(vec![
        teachers_batch(vec![json!({"name": "Ms. Johnson", "subject": "Math"})]),
        students_batch(vec![
            json!({"name": "Alice", "teacher_name": "Ms. Johnson"}),
            json!({"name": "Bob", "teacher_name": "Mr. Ghost"}),
        ]),
    ]);

    let report = Loader::new(&store).load(&plan).await?;

    let teachers = report.batch("teachers").expect("teachers batch");
    assert_eq!(teachers.committed.len(), 1);
    let johnson = teachers.committed_id("Ms. Johnson").expect("Ms. Johnson committed");

    let students = report.batch("students").expect("students batch");
    assert_eq!(students.committed.len(), 1);
    assert_eq!(students.committed[0].stored["name"], json!("Alice"));
    assert_eq!(students.committed[0].stored["teacher_id"], json!(johnson));
    assert!(!students.committed[0].stored.contains_key("teacher_name"));

    assert_eq!(students.rejected.len(), 1);
    assert_eq!(students.rejected[0].row, 1);
    assert_eq!(students.rejected[0].record["name"], json!("Bob"));
    assert_eq!(
        students.rejected[0].reason,
        RejectionReason::UnresolvedReference {
            field: "teacher_name".into(),
            batch: "teachers".into(),
            key: "Mr. Ghost".into(),
        }
    );

    let persisted = rows(&store, "students").await;
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].fields["teacher_id"], json!(johnson));
    assert_eq!(store.commits().await, 1);
    Ok(())
}

#[tokio::test]
async fn repeated_enrollment_is_rejected_under_a_composite_key() -> anyhow::Result<()> {
    let store = MemoryStore::with_schema(&university_tables()).await?;
    let plan = enrollment_plan(
        DuplicateLinkPolicy::Reject,
        vec![
            json!({"student_email": "bob@example.com", "course_title": "Machine Learning", "enrollment_date": "2025-01-20"}),
            json!({"student_email": "bob@example.com", "course_title": "Python Programming", "enrollment_date": "2025-01-20"}),
            json!({"student_email": "bob@example.com", "course_title": "Machine Learning", "enrollment_date": "2025-02-01"}),
        ],
    );

    let report = Loader::new(&store).load(&plan).await?;
    let links = report.batch("enrollments").expect("enrollments batch");
    assert_eq!(links.committed.len(), 2);
    assert_eq!(links.rejected.len(), 1);
    assert_eq!(links.rejected[0].row, 2);
    assert_eq!(
        links.rejected[0].reason,
        RejectionReason::DuplicateLink {
            columns: vec!["student_id".into(), "course_id".into()],
            first_row: 0,
        }
    );
    assert_eq!(rows(&store, "student_course_links").await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn repeated_enrollment_is_kept_as_history_when_allowed() -> anyhow::Result<()> {
    let store = MemoryStore::with_schema(&university_history_tables()).await?;
    let plan = enrollment_plan(
        DuplicateLinkPolicy::Allow,
        vec![
            json!({"student_email": "bob@example.com", "course_title": "Machine Learning", "enrollment_date": "2025-01-20"}),
            json!({"student_email": "bob@example.com", "course_title": "Machine Learning", "enrollment_date": "2025-02-01"}),
        ],
    );

    let report = Loader::new(&store).load(&plan).await?;
    let links = report.batch("enrollments").expect("enrollments batch");
    assert_eq!(links.committed.len(), 2);
    assert!(links.rejected.is_empty());

    let dates: Vec<Value> = rows(&store, "student_course_links")
        .await
        .into_iter()
        .map(|r| r.fields["enrollment_date"].clone())
        .collect();
    assert_eq!(dates, vec![json!("2025-01-20T00:00:00Z"), json!("2025-02-01T00:00:00Z")]);
    Ok(())
}

#[tokio::test]
async fn allowing_duplicates_against_a_unique_pair_aborts_the_load() -> anyhow::Result<()> {
    let store = MemoryStore::with_schema(&university_tables()).await?;
    let plan = enrollment_plan(
        DuplicateLinkPolicy::Allow,
        vec![
            json!({"student_email": "bob@example.com", "course_title": "Machine Learning", "enrollment_date": "2025-01-20"}),
            json!({"student_email": "bob@example.com", "course_title": "Machine Learning", "enrollment_date": "2025-02-01"}),
        ],
    );

    let err = Loader::new(&store).load(&plan).await.unwrap_err();
    match err {
        LoadError::PersistenceUnavailable { stage, source } => {
            assert_eq!(stage, "batch 'enrollments'");
            assert!(matches!(source, StoreError::Constraint { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(rows(&store, "university_students").await.is_empty());
    assert!(rows(&store, "courses").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn impossible_enrollment_date_is_rejected_alone() -> anyhow::Result<()> {
    let store = MemoryStore::with_schema(&university_tables()).await?;
    let plan = enrollment_plan(
        DuplicateLinkPolicy::Reject,
        vec![
            json!({"student_email": "alice@example.com", "course_title": "Python Programming", "enrollment_date": "2024-13-40"}),
            json!({"student_email": "alice@example.com", "course_title": "Machine Learning", "enrollment_date": "2025-01-15"}),
        ],
    );

    let report = Loader::new(&store).load(&plan).await?;
    let links = report.batch("enrollments").expect("enrollments batch");
    assert_eq!(links.rejected.len(), 1);
    match &links.rejected[0].reason {
        RejectionReason::FieldConversion { field, value, .. } => {
            assert_eq!(field, "enrollment_date");
            assert_eq!(value, &json!("2024-13-40"));
        }
        other => panic!("unexpected rejection: {:?}", other),
    }
    assert_eq!(links.committed.len(), 1);
    assert_eq!(links.committed[0].stored["enrollment_date"], json!("2025-01-15T00:00:00Z"));

    let stored = rows(&store, "student_course_links").await;
    assert_eq!(stored.len(), 1);
    Ok(())
}

#[tokio::test]
async fn every_committed_link_points_at_its_parents() -> anyhow::Result<()> {
    let dataset = demo::university()?;
    let store = MemoryStore::with_schema(&dataset.tables).await?;
    let report = Loader::new(&store).load(&dataset.plan).await?;
    assert_eq!(report.rejected_count(), 0);

    let students = report.batch("students").expect("students batch");
    let courses = report.batch("courses").expect("courses batch");
    let links = report.batch("enrollments").expect("enrollments batch");
    assert_eq!(links.committed.len(), 10);

    for link in &links.committed {
        let email = link.source["student_email"].as_str().expect("email");
        let title = link.source["course_title"].as_str().expect("title");
        assert_eq!(link.stored["student_id"], json!(students.committed_id(email).expect("student")));
        assert_eq!(link.stored["course_id"], json!(courses.committed_id(title).expect("course")));
    }

    // Same check against what the store actually holds.
    let by_email: Vec<(String, SurrogateKey)> = rows(&store, "university_students")
        .await
        .into_iter()
        .map(|r| (r.fields["email"].as_str().unwrap_or_default().to_string(), r.id))
        .collect();
    let bob = by_email
        .iter()
        .find(|(email, _)| email == "bob@example.com")
        .map(|(_, id)| *id)
        .expect("bob stored");
    let bobs_links = store
        .query("student_course_links", &Criteria::eq("student_id", bob))
        .await?;
    assert_eq!(bobs_links.len(), 3);
    Ok(())
}

#[tokio::test]
async fn duplicate_teacher_names_abort_the_whole_load() -> anyhow::Result<()> {
    let store = MemoryStore::with_schema(&minimal_school()).await?;
    let plan = LoadPlan::new(vec![
        teachers_batch(vec![
            json!({"name": "Ms. Johnson", "subject": "Math"}),
            json!({"name": "Mr. Smith", "subject": "History"}),
            json!({"name": "Ms. Johnson", "subject": "Physics"}),
        ]),
        students_batch(vec![json!({"name": "Alice", "teacher_name": "Mr. Smith"})]),
    ]);

    let err = Loader::new(&store).load(&plan).await.unwrap_err();
    match err {
        LoadError::DuplicateNaturalKey { batch, key, rows } => {
            assert_eq!(batch, "teachers");
            assert_eq!(key, "Ms. Johnson");
            assert_eq!(rows, vec![0, 2]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(rows(&store, "teachers").await.is_empty());
    assert_eq!(store.commits().await, 0);
    Ok(())
}

#[tokio::test]
async fn reject_all_policy_keeps_loading_around_duplicates() -> anyhow::Result<()> {
    let store = MemoryStore::with_schema(&minimal_school()).await?;
    let plan = LoadPlan::new(vec![
        teachers_batch(vec![
            json!({"name": "Ms. Johnson", "subject": "Math"}),
            json!({"name": "Mr. Smith", "subject": "History"}),
            json!({"name": " Ms. Johnson ", "subject": "Physics"}),
        ])
        .on_duplicate_key(DuplicateKeyPolicy::RejectAll),
        students_batch(vec![
            json!({"name": "Alice", "teacher_name": "Ms. Johnson"}),
            json!({"name": "Diana", "teacher_name": "Mr. Smith"}),
        ]),
    ]);

    let report = Loader::new(&store).load(&plan).await?;
    let teachers = report.batch("teachers").expect("teachers batch");
    assert_eq!(teachers.committed.len(), 1);
    assert_eq!(
        teachers.rejected.iter().map(|r| r.row).collect::<Vec<_>>(),
        vec![0, 2]
    );
    assert!(teachers
        .rejected
        .iter()
        .all(|r| r.reason == RejectionReason::DuplicateNaturalKey { key: "Ms. Johnson".into() }));

    let students = report.batch("students").expect("students batch");
    assert_eq!(students.committed.len(), 1);
    assert!(matches!(
        &students.rejected[0].reason,
        RejectionReason::AmbiguousReference { key, .. } if key == "Ms. Johnson"
    ));
    Ok(())
}

#[tokio::test]
async fn missing_keys_and_references_are_rejected_per_record() -> anyhow::Result<()> {
    let store = MemoryStore::with_schema(&minimal_school()).await?;
    let plan = LoadPlan::new(vec![
        teachers_batch(vec![
            json!({"name": "Ms. Johnson", "subject": "Math"}),
            json!({"name": "   ", "subject": "Art"}),
        ]),
        students_batch(vec![
            json!({"name": "Alice", "teacher_name": "Ms. Johnson"}),
            json!({"name": "Orphan"}),
            json!({"name": "Nully", "teacher_name": null}),
        ]),
    ]);

    let report = Loader::new(&store).load(&plan).await?;
    let teachers = report.batch("teachers").expect("teachers batch");
    assert_eq!(
        teachers.rejected[0].reason,
        RejectionReason::MissingNaturalKey { field: "name".into() }
    );
    let students = report.batch("students").expect("students batch");
    assert_eq!(students.committed.len(), 1);
    assert_eq!(students.rejected.len(), 2);
    assert!(students
        .rejected
        .iter()
        .all(|r| r.reason == RejectionReason::MissingReference { field: "teacher_name".into() }));
    Ok(())
}

#[tokio::test]
async fn csv_students_are_converted_before_insert() -> anyhow::Result<()> {
    let store = MemoryStore::with_schema(&school_tables()).await?;
    let students = records_from_csv_str(
        "name,grade,teacher_name\n\
         Alice,95,Ms. Johnson\n\
         Bob,eighty,Ms. Johnson\n\
         Diana,82,Mr. Smith\n",
    )?;
    let plan = LoadPlan::new(vec![
        teachers_batch(vec![
            json!({"name": "Ms. Johnson", "subject": "Mathematics"}),
            json!({"name": "Mr. Smith", "subject": "History"}),
        ]),
        BatchSpec::new("students", "students")
            .reference("teacher_name", "teachers", "teacher_id")
            .convert("grade", ConversionKind::Integer)
            .records(students),
    ]);

    let report = Loader::new(&store).load(&plan).await?;
    let batch = report.batch("students").expect("students batch");
    assert_eq!(batch.committed.len(), 2);
    assert_eq!(batch.committed[0].stored["grade"], json!(95));
    assert!(matches!(
        &batch.rejected[0].reason,
        RejectionReason::FieldConversion { field, .. } if field == "grade"
    ));
    Ok(())
}

#[tokio::test]
async fn lost_connection_mid_load_leaves_nothing_behind() -> anyhow::Result<()> {
    let dataset = demo::school()?;
    let store = MemoryStore::with_schema(&dataset.tables).await?;
    // Three teachers go in, the second student insert fails.
    store
        .set_faults(StoreFaults {
            fail_after_inserts: Some(4),
            ..StoreFaults::default()
        })
        .await;

    let err = Loader::new(&store).load(&dataset.plan).await.unwrap_err();
    match err {
        LoadError::PersistenceUnavailable { stage, source } => {
            assert_eq!(stage, "batch 'students'");
            assert!(matches!(source, StoreError::Unavailable { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    store.set_faults(StoreFaults::default()).await;
    assert!(rows(&store, "teachers").await.is_empty());
    assert!(rows(&store, "students").await.is_empty());
    assert_eq!(store.commits().await, 0);
    Ok(())
}

#[tokio::test]
async fn failed_commit_leaves_nothing_behind() -> anyhow::Result<()> {
    let dataset = demo::school()?;
    let store = MemoryStore::with_schema(&dataset.tables).await?;
    store
        .set_faults(StoreFaults {
            fail_on_commit: true,
            ..StoreFaults::default()
        })
        .await;

    let err = Loader::new(&store).load(&dataset.plan).await.unwrap_err();
    assert!(matches!(err, LoadError::PersistenceUnavailable { ref stage, .. } if stage == "commit"));

    store.set_faults(StoreFaults::default()).await;
    assert!(rows(&store, "teachers").await.is_empty());
    assert!(rows(&store, "students").await.is_empty());
    // Keys were flushed for every batch before the commit was attempted.
    assert!(store.flushes().await >= 2);
    Ok(())
}

#[tokio::test]
async fn failed_flush_leaves_nothing_behind() -> anyhow::Result<()> {
    let dataset = demo::school()?;
    let store = MemoryStore::with_schema(&dataset.tables).await?;
    store
        .set_faults(StoreFaults {
            fail_on_flush: true,
            ..StoreFaults::default()
        })
        .await;

    let err = Loader::new(&store).load(&dataset.plan).await.unwrap_err();
    match err {
        LoadError::PersistenceUnavailable { stage, source } => {
            assert_eq!(stage, "batch 'teachers'");
            assert!(matches!(source, StoreError::Unavailable { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    store.set_faults(StoreFaults::default()).await;
    assert!(rows(&store, "teachers").await.is_empty());
    assert!(rows(&store, "students").await.is_empty());
    assert_eq!(store.flushes().await, 0);
    assert_eq!(store.commits().await, 0);
    Ok(())
}

#[tokio::test]
async fn unreachable_store_fails_at_begin() -> anyhow::Result<()> {
    let dataset = demo::school()?;
    let store = MemoryStore::with_schema(&dataset.tables).await?;
    store
        .set_faults(StoreFaults {
            unavailable: true,
            ..StoreFaults::default()
        })
        .await;

    let err = Loader::new(&store).load(&dataset.plan).await.unwrap_err();
    assert!(matches!(
        err,
        LoadError::PersistenceUnavailable { ref stage, source: StoreError::Unavailable { .. } }
            if stage == "begin"
    ));

    store.set_faults(StoreFaults::default()).await;
    assert_eq!(store.count("teachers").await?, 0);
    assert_eq!(store.commits().await, 0);
    Ok(())
}

#[tokio::test]
async fn stray_record_field_is_a_plan_error() -> anyhow::Result<()> {
    let store = MemoryStore::with_schema(&minimal_school()).await?;
    let plan = LoadPlan::new(vec![
        teachers_batch(vec![json!({"name": "Ms. Johnson", "subject": "Math"})]),
        students_batch(vec![
            json!({"name": "Alice", "teacher_name": "Ms. Johnson"}),
            json!({"name": "Bob", "notes": "transferred", "teacher_name": "Ms. Johnson"}),
        ]),
    ]);

    let err = Loader::new(&store).load(&plan).await.unwrap_err();
    assert!(matches!(
        err,
        LoadError::Plan(PlanError::UnknownColumn { ref batch, ref column, .. })
            if batch == "students" && column == "notes"
    ));
    assert!(rows(&store, "teachers").await.is_empty());
    assert_eq!(store.commits().await, 0);
    Ok(())
}

#[tokio::test]
async fn untyped_text_in_a_numeric_column_aborts_the_load() -> anyhow::Result<()> {
    let store = MemoryStore::with_schema(&minimal_school()).await?;
    let plan = LoadPlan::new(vec![
        teachers_batch(vec![json!({"name": "Ms. Johnson", "subject": "Math"})]),
        students_batch(vec![json!({"name": "Alice", "grade": "eighty", "teacher_name": "Ms. Johnson"})]),
    ]);

    let err = Loader::new(&store).load(&plan).await.unwrap_err();
    assert!(matches!(
        err,
        LoadError::PersistenceUnavailable { ref stage, source: StoreError::Constraint { .. } }
            if stage == "batch 'students'"
    ));
    assert!(rows(&store, "teachers").await.is_empty());
    assert!(rows(&store, "students").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn same_input_into_fresh_targets_gives_the_same_outcome() -> anyhow::Result<()> {
    let plan = LoadPlan::new(vec![
        teachers_batch(vec![
            json!({"name": "Ms. Johnson", "subject": "Math"}),
            json!({"name": "Dr. Garcia", "subject": "Science"}),
        ]),
        students_batch(vec![
            json!({"name": "Alice", "teacher_name": "Ms. Johnson"}),
            json!({"name": "Bob", "teacher_name": "Mr. Ghost"}),
            json!({"name": "Fatima", "teacher_name": "Dr. Garcia"}),
        ]),
    ]);

    let first = MemoryStore::with_schema(&minimal_school()).await?;
    let second = MemoryStore::with_schema(&minimal_school()).await?;
    // Burn a few sequence values so surrogate keys differ between targets.
    let mut tx = second.begin().await?;
    for name in ["x", "y", "z"] {
        tx.insert("teachers", &rec(json!({"name": name}))).await?;
    }
    tx.rollback().await?;

    let a = Loader::new(&first).load(&plan).await?;
    let b = Loader::new(&second).load(&plan).await?;

    assert_ne!(
        a.batch("teachers").and_then(|t| t.committed_id("Ms. Johnson")),
        b.batch("teachers").and_then(|t| t.committed_id("Ms. Johnson"))
    );
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.rejected_count(), 1);
    assert_eq!(b.rejected_count(), 1);
    Ok(())
}

#[tokio::test]
async fn batches_must_target_registered_tables() -> anyhow::Result<()> {
    let store = MemoryStore::with_schema(&minimal_school()).await?;
    let plan = LoadPlan::new(vec![BatchSpec::new("rooms", "classrooms")
        .natural_key("code")
        .records(recs(vec![json!({"code": "A1"})]))]);

    let err = Loader::new(&store).load(&plan).await.unwrap_err();
    assert!(matches!(err, LoadError::Plan(PlanError::UnknownTable { .. })));

    let err = Loader::new(&store).load(&LoadPlan::default()).await.unwrap_err();
    assert!(matches!(err, LoadError::Plan(PlanError::Empty)));
    Ok(())
}

/// Delegates to a [`MemoryStore`] but makes every insert slow.
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

struct SlowTransaction {
    inner: Box<dyn StoreTransaction>,
    delay: Duration,
}

#[async_trait]
impl StoreTransaction for SlowTransaction {
    async fn insert(&mut self, table: &str, record: &Record) -> Result<SurrogateKey, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert(table, record).await
    }

    async fn flush(&mut self) -> Result<(), StoreError> {
        self.inner.flush().await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

#[async_trait]
impl Store for SlowStore {
    async fn apply_schema(&self, tables: &[TableSpec]) -> Result<(), StoreError> {
        self.inner.apply_schema(tables).await
    }

    async fn registry(&self) -> ModelRegistry {
        self.inner.registry().await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(SlowTransaction {
            inner: self.inner.begin().await?,
            delay: self.delay,
        }))
    }

    async fn query(&self, table: &str, criteria: &Criteria) -> Result<Vec<StoredRecord>, StoreError> {
        self.inner.query(table, criteria).await
    }

    async fn count(&self, table: &str) -> Result<u64, StoreError> {
        self.inner.count(table).await
    }

    async fn delete(&self, table: &str, criteria: &Criteria) -> Result<u64, StoreError> {
        self.inner.delete(table, criteria).await
    }

    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_tables().await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

#[tokio::test]
async fn a_timed_out_load_is_rolled_back() -> anyhow::Result<()> {
    let dataset = demo::school()?;
    let inner = MemoryStore::with_schema(&dataset.tables).await?;
    let store = SlowStore {
        inner: inner.clone(),
        delay: Duration::from_millis(50),
    };

    let err = Loader::new(&store)
        .with_options(LoaderOptions {
            timeout: Some(Duration::from_millis(120)),
        })
        .load(&dataset.plan)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::TimedOut { budget } if budget == Duration::from_millis(120)
    ));
    assert!(err.to_string().contains("120ms"));
    assert_eq!(inner.count("teachers").await?, 0);
    assert_eq!(inner.commits().await, 0);
    Ok(())
}

#[tokio::test]
async fn service_skips_populated_targets_and_cascades_deletes() -> anyhow::Result<()> {
    let dataset = demo::school()?;
    let service = ImportService::new(Arc::new(MemoryStore::new()));
    service.apply_schema(&dataset.tables).await?;

    let first = service.import_once(dataset.sentinel, &dataset.plan).await?;
    assert_eq!(first.map(|r| r.committed_count()), Some(11));
    assert!(service.import_once(dataset.sentinel, &dataset.plan).await?.is_none());

    let counts = service.summarize(&dataset.table_names()).await?;
    assert_eq!(counts["teachers"], 3);
    assert_eq!(counts["students"], 8);

    let deleted = service
        .delete("teachers", &Criteria::eq("name", "Dr. Garcia"))
        .await?;
    assert_eq!(deleted, 1);
    let counts = service.summarize(&["teachers", "students"]).await?;
    assert_eq!(counts["teachers"], 2);
    assert_eq!(counts["students"], 5);
    Ok(())
}
