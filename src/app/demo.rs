//! Sample datasets: a school (teachers and their students) and a university
//! (students, courses and dated enrollments between them).

use crate::domain::convert::ConversionKind;
use crate::domain::model::examples::{school_tables, university_tables};
use crate::domain::model::TableSpec;
use crate::domain::plan::{BatchSpec, DuplicateLinkPolicy, LoadPlan};
use crate::domain::source::records_from_columns;
use crate::error::SourceError;
use serde_json::{json, Value as JsonValue};

/// A schema plus the plan that fills it.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: &'static str,
    pub tables: Vec<TableSpec>,
    pub plan: LoadPlan,
    /// A table whose rows mean the dataset was already imported.
    pub sentinel: &'static str,
}

impl Dataset {
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.table_name.as_str()).collect()
    }
}

fn strings(values: &[&str]) -> Vec<JsonValue> {
    values.iter().map(|v| json!(v)).collect()
}

pub fn school() -> Result<Dataset, SourceError> {
    let teachers = records_from_columns([
        ("name", strings(&["Ms. Johnson", "Mr. Smith", "Dr. Garcia"])),
        ("subject", strings(&["Mathematics", "History", "Science"])),
    ])?;
    let students = records_from_columns([
        (
            "name",
            strings(&["Alice", "Bob", "Charlie", "Diana", "Edward", "Fatima", "George", "Hannah"]),
        ),
        ("grade", [95, 87, 91, 82, 88, 94, 79, 90].iter().map(|g| json!(g)).collect()),
        (
            "teacher_name",
            strings(&[
                "Ms. Johnson",
                "Ms. Johnson",
                "Ms. Johnson",
                "Mr. Smith",
                "Mr. Smith",
                "Dr. Garcia",
                "Dr. Garcia",
                "Dr. Garcia",
            ]),
        ),
    ])?;

    Ok(Dataset {
        name: "school",
        tables: school_tables(),
        plan: LoadPlan::new(vec![
            BatchSpec::new("teachers", "teachers")
                .natural_key("name")
                .records(teachers),
            BatchSpec::new("students", "students")
                .reference("teacher_name", "teachers", "teacher_id")
                .convert("grade", ConversionKind::Integer)
                .records(students),
        ]),
        sentinel: "teachers",
    })
}

pub fn university() -> Result<Dataset, SourceError> {
    let students = records_from_columns([
        (
            "name",
            strings(&[
                "Alice Smith",
                "Bob Johnson",
                "Charlie Brown",
                "Diana Prince",
                "Edward Stark",
            ]),
        ),
        (
            "email",
            strings(&[
                "alice@example.com",
                "bob@example.com",
                "charlie@example.com",
                "diana@example.com",
                "edward@example.com",
            ]),
        ),
    ])?;
    let courses = records_from_columns([
        (
            "title",
            strings(&[
                "Python Programming",
                "Data Science Fundamentals",
                "Machine Learning",
                "Database Design",
                "Web Development",
            ]),
        ),
        (
            "description",
            strings(&[
                "Learn Python from basics to advanced concepts.",
                "Introduction to data analysis and visualization.",
                "Algorithms and techniques for predictive modeling.",
                "Relational database theory and SQL.",
                "HTML, CSS, and JavaScript fundamentals.",
            ]),
        ),
    ])?;
    let enrollments = records_from_columns([
        (
            "student_email",
            strings(&[
                "alice@example.com",
                "alice@example.com",
                "bob@example.com",
                "bob@example.com",
                "bob@example.com",
                "charlie@example.com",
                "charlie@example.com",
                "diana@example.com",
                "diana@example.com",
                "edward@example.com",
            ]),
        ),
        (
            "course_title",
            strings(&[
                "Python Programming",
                "Data Science Fundamentals",
                "Python Programming",
                "Data Science Fundamentals",
                "Machine Learning",
                "Machine Learning",
                "Database Design",
                "Database Design",
                "Web Development",
                "Web Development",
            ]),
        ),
        (
            "enrollment_date",
            strings(&[
                "2025-01-15",
                "2025-01-15",
                "2025-01-20",
                "2025-01-20",
                "2025-02-01",
                "2025-01-25",
                "2025-02-10",
                "2025-02-05",
                "2025-02-05",
                "2025-02-15",
            ]),
        ),
    ])?;

    Ok(Dataset {
        name: "university",
        tables: university_tables(),
        plan: LoadPlan::new(vec![
            BatchSpec::new("students", "university_students")
                .natural_key("email")
                .records(students),
            BatchSpec::new("courses", "courses")
                .natural_key("title")
                .records(courses),
            BatchSpec::new("enrollments", "student_course_links")
                .reference("student_email", "students", "student_id")
                .reference("course_title", "courses", "course_id")
                .convert("enrollment_date", ConversionKind::date_time())
                .link(["student_id", "course_id"], DuplicateLinkPolicy::Reject)
                .records(enrollments),
        ]),
        sentinel: "courses",
    })
}
