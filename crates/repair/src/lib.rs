pub mod error;
pub mod legacy;
pub mod source;

pub use error::{RepairCliError, Result};
pub use legacy::{
    importer::{ImportSummary, LegacyImporter},
    models::{LegacyExport, LegacyVoteDocument},
    validator::{LegacyValidator, ValidationReport},
};
pub use source::{JsonFileSource, LegacyVoteSource};
