//! Vote documents exported from the previous voting backend.

pub mod importer;
pub mod models;
pub mod validator;
