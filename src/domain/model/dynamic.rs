use crate::domain::model::{ColumnType, EntityModel, TableSpec};

/// Runtime model built from a [`TableSpec`] (bootstrap request or the `loader_models` table).
#[derive(Debug, Clone)]
pub struct DynamicModel {
    spec: TableSpec,
}

impl DynamicModel {
    pub fn new(spec: TableSpec) -> Self {
        Self { spec }
    }
}

impl EntityModel for DynamicModel {
    fn table_name(&self) -> &str {
        &self.spec.table_name
    }

    fn primary_key_field(&self) -> &str {
        &self.spec.primary_key_field
    }

    fn create_table_sql(&self) -> String {
        self.spec.create_table_sql()
    }

    fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.spec.column_type(column)
    }

    fn spec(&self) -> &TableSpec {
        &self.spec
    }
}
