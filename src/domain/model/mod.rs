//! Entity models: the tables a load writes into.

pub mod dynamic;
pub mod examples;
pub mod registry;
pub mod schema;

pub use dynamic::DynamicModel;
pub use registry::ModelRegistry;
pub use schema::{
    creation_order, resolve_references, validate_ident, ColumnSpec, ColumnType, ForeignKeySpec,
    TableSpec,
};

/// Contract for any table the loader and stores can work with.
///
/// Stores use it to generate DDL, cast dynamic values on insert, and
/// enforce foreign keys when deleting.
pub trait EntityModel: Send + Sync {
    /// Returns the name of the database table for this model.
    fn table_name(&self) -> &str;

    /// Returns the name of the surrogate key column.
    fn primary_key_field(&self) -> &str;

    /// Returns the SQL CREATE TABLE statement for this model.
    fn create_table_sql(&self) -> String;

    /// Declared column type, used for explicit casts when binding values.
    fn column_type(&self, _column: &str) -> Option<ColumnType> {
        None
    }

    /// The full declaration backing this model.
    fn spec(&self) -> &TableSpec;
}
