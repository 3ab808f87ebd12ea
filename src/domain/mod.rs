pub mod convert;
pub mod loader;
pub mod lookup;
pub mod model;
pub mod plan;
pub mod record;
pub mod report;
pub mod source;

pub use loader::{Loader, LoaderOptions};
pub use plan::{BatchSpec, DuplicateKeyPolicy, DuplicateLinkPolicy, LoadPlan};
pub use record::{Record, StoredRecord, SurrogateKey};
pub use report::{BatchReport, LoadReport, RejectionReason};
