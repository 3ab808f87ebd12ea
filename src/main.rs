//! `relational-import`: loads related tabular data, resolving natural keys
//! to surrogate keys, and prints what ended up in the database.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use relational_import::app::demo::{self, Dataset};
use relational_import::domain::model::TableSpec;
use relational_import::domain::source::{records_from_csv_reader, records_from_json_str};
use relational_import::infra::config::{self, DatabaseConfig, ServerConfig};
use relational_import::infra::telemetry;
use relational_import::storage::{Criteria, OrderDirection};
use relational_import::{
    ImportService, LoadPlan, LoadReport, LoaderOptions, MemoryStore, PgStore, Store,
};
use serde_json::Value as JsonValue;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "relational-import",
    version,
    about = "Load related tabular data, resolving natural keys to surrogate keys"
)]
struct Cli {
    /// Use an in-process store instead of PostgreSQL (nothing persists).
    #[arg(long, global = true)]
    memory: bool,

    /// Debug-level logging (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Teachers and their students (one-to-many).
    School,
    /// Students, courses and dated enrollments (many-to-many).
    University,
    /// Run a load plan read from a JSON file.
    Import {
        /// Load plan: `{"batches": [...]}`.
        plan: PathBuf,
        /// Tables to create first: `[{"table_name": ..., "columns": [...]}, ...]`.
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Replace a batch's records with the rows of a CSV file, or the
        /// objects of a JSON array when FILE ends in `.json`.
        #[arg(long = "records", alias = "csv", value_name = "BATCH=FILE")]
        records: Vec<String>,
        /// Write the full load report as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

async fn open_store(memory: bool) -> Result<Arc<dyn Store>> {
    if memory {
        tracing::info!("using the in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let db = DatabaseConfig::from_env()?;
    Ok(Arc::new(PgStore::connect(&db).await?))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("parsing {}", path.display()))
}

fn attach_records(plan: &mut LoadPlan, spec: &str) -> Result<()> {
    let (batch, path) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("--records expects BATCH=FILE, got '{}'", spec))?;
    let target = plan
        .batches
        .iter_mut()
        .find(|b| b.name == batch)
        .ok_or_else(|| anyhow!("--records names unknown batch '{}'", batch))?;
    let is_json = Path::new(path)
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    target.records = if is_json {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
        records_from_json_str(&text).with_context(|| format!("parsing {}", path))?
    } else {
        let file = File::open(path).with_context(|| format!("opening {}", path))?;
        records_from_csv_reader(file).with_context(|| format!("parsing {}", path))?
    };
    tracing::info!(batch, path, rows = target.records.len(), "records attached");
    Ok(())
}

fn print_report(report: &LoadReport) {
    for batch in &report.batches {
        println!(
            "> {} -> {}: {} committed, {} rejected",
            batch.name,
            batch.table,
            batch.committed.len(),
            batch.rejected.len()
        );
        for r in &batch.rejected {
            println!("    row {}: {}", r.row, r.reason);
        }
    }
    println!("> Fingerprint: {}", report.fingerprint());
}

fn text(record: &serde_json::Map<String, JsonValue>, field: &str) -> String {
    match record.get(field) {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn day(record: &serde_json::Map<String, JsonValue>, field: &str) -> String {
    text(record, field).chars().take(10).collect()
}

async fn print_counts(service: &ImportService, tables: &[&str]) -> Result<()> {
    println!("\nDatabase contains:");
    for (table, count) in service.summarize(tables).await? {
        println!("- {} {}", count, table);
    }
    Ok(())
}

async fn verify_school(service: &ImportService) -> Result<()> {
    print_counts(service, &["teachers", "students"]).await?;

    let by_id = Criteria::all().order_by("id", OrderDirection::Asc);
    for teacher in service.query("teachers", &by_id).await? {
        println!(
            "\nTeacher: {} (Subject: {})",
            text(&teacher.fields, "name"),
            text(&teacher.fields, "subject")
        );
        println!("Students:");
        let students = Criteria::eq("teacher_id", teacher.id).order_by("id", OrderDirection::Asc);
        for student in service.query("students", &students).await? {
            println!(
                "  - {}: Grade {}",
                text(&student.fields, "name"),
                text(&student.fields, "grade")
            );
        }
    }
    Ok(())
}

async fn verify_university(service: &ImportService) -> Result<()> {
    print_counts(service, &["university_students", "courses", "student_course_links"]).await?;

    let by_id = Criteria::all().order_by("id", OrderDirection::Asc);
    let students = service.query("university_students", &by_id).await?;
    let courses = service.query("courses", &by_id).await?;
    let title_of = |id: &JsonValue| {
        courses
            .iter()
            .find(|c| Some(c.id) == id.as_i64())
            .map(|c| text(&c.fields, "title"))
            .unwrap_or_default()
    };
    let name_of = |id: &JsonValue| {
        students
            .iter()
            .find(|s| Some(s.id) == id.as_i64())
            .map(|s| text(&s.fields, "name"))
            .unwrap_or_default()
    };

    println!("\n=== Students and Their Courses ===");
    for student in &students {
        println!(
            "\nStudent: {} ({})",
            text(&student.fields, "name"),
            text(&student.fields, "email")
        );
        let links = Criteria::eq("student_id", student.id).order_by("id", OrderDirection::Asc);
        for link in service.query("student_course_links", &links).await? {
            let course = link.fields.get("course_id").map(&title_of).unwrap_or_default();
            println!(
                "    - {} (enrolled on {})",
                course,
                day(&link.fields, "enrollment_date")
            );
        }
    }

    println!("\n=== Courses and Enrolled Students ===");
    for course in &courses {
        println!("\nCourse: {}", text(&course.fields, "title"));
        let links = Criteria::eq("course_id", course.id).order_by("id", OrderDirection::Asc);
        for link in service.query("student_course_links", &links).await? {
            let student = link.fields.get("student_id").map(&name_of).unwrap_or_default();
            println!(
                "  - {} (enrolled on {})",
                student,
                day(&link.fields, "enrollment_date")
            );
        }
    }
    Ok(())
}

async fn run_dataset(service: &ImportService, dataset: &Dataset) -> Result<()> {
    println!("> Dataset '{}': tables {:?}", dataset.name, dataset.table_names());
    service.apply_schema(&dataset.tables).await?;
    match service.import_once(dataset.sentinel, &dataset.plan).await? {
        Some(report) => {
            print_report(&report);
            println!("> Successfully imported '{}'.", dataset.name);
        }
        None => println!("> Database already contains data. Skipping import."),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    let cli = Cli::parse();
    telemetry::init_tracing(cli.verbose).ok();

    let server = ServerConfig::from_env()?;
    let store = open_store(cli.memory).await?;
    let service = ImportService::with_options(
        store,
        LoaderOptions {
            timeout: server.load_timeout,
        },
    );

    match cli.command {
        Command::School => {
            run_dataset(&service, &demo::school()?).await?;
            verify_school(&service).await?;
        }
        Command::University => {
            run_dataset(&service, &demo::university()?).await?;
            verify_university(&service).await?;
        }
        Command::Import {
            plan,
            schema,
            records,
            report,
        } => {
            if let Some(schema) = schema {
                let tables: Vec<TableSpec> = read_json(&schema)?;
                let models = service.apply_schema(&tables).await?;
                println!("> Registered models: {}", models.join(", "));
            }
            let mut plan: LoadPlan = read_json(&plan)?;
            for spec in &records {
                attach_records(&mut plan, spec)?;
            }
            let outcome = service.import(&plan).await?;
            print_report(&outcome);
            if let Some(path) = report {
                let file = File::create(&path)
                    .with_context(|| format!("creating {}", path.display()))?;
                serde_json::to_writer_pretty(file, &outcome)?;
                println!("> Report written to {}", path.display());
            }
            let tables: Vec<&str> = plan.batches.iter().map(|b| b.table.as_str()).collect();
            print_counts(&service, &tables).await?;
        }
    }

    Ok(())
}
