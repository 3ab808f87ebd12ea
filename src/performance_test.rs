// src/performance_test.rs
// Times a synthetic one-to-many load (teachers -> students) through the in-memory store.
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;
use std::time::Instant;

use relational_import::domain::model::examples::school_tables;
use relational_import::domain::Record;
use relational_import::{BatchSpec, ImportService, LoadPlan, MemoryStore};
use std::sync::Arc;

fn record(value: serde_json::Value) -> Record {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Record::new(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let num_teachers = 200;
    let num_students = 10_000;
    println!(
        "--- Import Performance Test: {} teachers, {} students ---",
        num_teachers, num_students
    );

    let store = MemoryStore::with_schema(&school_tables()).await?;
    let service = ImportService::new(Arc::new(store));
    let mut rng = rand::thread_rng();

    let teacher_names: Vec<String> = (0..num_teachers).map(|i| format!("teacher_{}", i)).collect();
    let teachers: Vec<Record> = teacher_names
        .iter()
        .map(|name| record(json!({ "name": name, "subject": format!("subject_{}", name.len()) })))
        .collect();

    // Roughly 1% of students point at a teacher that does not exist.
    let students: Vec<Record> = (0..num_students)
        .map(|i| {
            let teacher = if rng.gen_ratio(1, 100) {
                "nobody".to_string()
            } else {
                teacher_names.choose(&mut rng).cloned().unwrap_or_default()
            };
            record(json!({
                "name": format!("student_{}", i),
                "grade": rng.gen_range(50..=100),
                "teacher_name": teacher,
            }))
        })
        .collect();

    let plan = LoadPlan::new(vec![
        BatchSpec::new("teachers", "teachers")
            .natural_key("name")
            .records(teachers),
        BatchSpec::new("students", "students")
            .reference("teacher_name", "teachers", "teacher_id")
            .records(students),
    ]);

    let start_time = Instant::now();
    let report = service.import(&plan).await?;
    let duration = start_time.elapsed();

    let total = plan.total_records();
    let avg_time_per_item = duration.as_micros() as f64 / total as f64;

    println!("\n--- Results ---");
    println!("Committed: {}", report.committed_count());
    println!("Rejected (unresolved teacher): {}", report.rejected_count());
    println!("Report fingerprint: {}", report.fingerprint());
    println!("\nTotal time to load {} records: {} ms", total, duration.as_millis());
    println!("Average time per record: {:.2} µs (microseconds)", avg_time_per_item);

    println!(
        "\nNote: This test uses the in-memory store. \
         A PostgreSQL target adds one round trip per insert."
    );
    Ok(())
}
