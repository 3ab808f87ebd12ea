pub mod app;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod infra;
pub mod storage;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::ImportService;
pub use domain::model::{ModelRegistry, TableSpec};
pub use domain::{
    BatchSpec, DuplicateKeyPolicy, DuplicateLinkPolicy, LoadPlan, LoadReport, Loader, LoaderOptions,
};
pub use error::{LoadError, PlanError, StoreError};
pub use storage::{Criteria, MemoryStore, PgStore, Store, StoreFaults};
