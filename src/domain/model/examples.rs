//! Demo schemas: a school (one-to-many) and a university (many-to-many).

use super::{ColumnSpec, ColumnType, ForeignKeySpec, TableSpec};

fn column(name: &str, col_type: ColumnType) -> ColumnSpec {
    ColumnSpec {
        name: name.to_string(),
        col_type,
        nullable: false,
        unique: false,
        references: None,
    }
}

fn unique(name: &str, col_type: ColumnType) -> ColumnSpec {
    ColumnSpec {
        unique: true,
        ..column(name, col_type)
    }
}

fn optional(name: &str, col_type: ColumnType) -> ColumnSpec {
    ColumnSpec {
        nullable: true,
        ..column(name, col_type)
    }
}

fn foreign_key(name: &str, table: &str) -> ColumnSpec {
    ColumnSpec {
        references: Some(ForeignKeySpec {
            table: table.to_string(),
            column: None,
            on_delete_cascade: true,
        }),
        ..column(name, ColumnType::BigInt)
    }
}

fn table(name: &str, columns: Vec<ColumnSpec>) -> TableSpec {
    TableSpec {
        table_name: name.to_string(),
        primary_key_field: "id".to_string(),
        columns,
        unique_together: Vec::new(),
    }
}

/// `teachers` 1 — n `students`; deleting a teacher deletes their students.
pub fn school_tables() -> Vec<TableSpec> {
    vec![
        table(
            "teachers",
            vec![
                unique("name", ColumnType::Text),
                column("subject", ColumnType::Text),
            ],
        ),
        table(
            "students",
            vec![
                column("name", ColumnType::Text),
                column("grade", ColumnType::Int),
                foreign_key("teacher_id", "teachers"),
            ],
        ),
    ]
}

/// `university_students` n — m `courses` through `student_course_links`.
///
/// The link table treats `(student_id, course_id)` as a composite unique key.
pub fn university_tables() -> Vec<TableSpec> {
    let mut links = table(
        "student_course_links",
        vec![
            foreign_key("student_id", "university_students"),
            foreign_key("course_id", "courses"),
            column("enrollment_date", ColumnType::Timestamptz),
        ],
    );
    links.unique_together = vec![vec!["student_id".to_string(), "course_id".to_string()]];

    vec![
        table(
            "university_students",
            vec![
                column("name", ColumnType::Text),
                unique("email", ColumnType::Text),
            ],
        ),
        table(
            "courses",
            vec![
                unique("title", ColumnType::Text),
                optional("description", ColumnType::Text),
            ],
        ),
        links,
    ]
}

/// Same as [`university_tables`] but enrollments are kept as history:
/// the same pair may appear more than once.
pub fn university_history_tables() -> Vec<TableSpec> {
    let mut tables = university_tables();
    for t in &mut tables {
        if t.table_name == "student_course_links" {
            t.unique_together.clear();
        }
    }
    tables
}
