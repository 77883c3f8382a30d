// Application layer - use cases and orchestration.
// `DropzoneService` is the only way in: the ledger coordinator, manifest
// operations and roster management all hang off it.

pub mod error;
mod ledger;
mod manifest;
pub mod reporting;
mod service;

pub use error::*;
pub use ledger::*;
pub use manifest::*;
pub use reporting::*;
pub use service::*;
