//! One-off customer import from the agency's spreadsheet

pub mod customers;
pub mod spreadsheet;

pub use customers::{import_customers, ImportSummary};
pub use spreadsheet::read_rows;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Cannot read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Spreadsheet has no worksheets")]
    NoWorksheet,

    #[error("Spreadsheet is missing a '{0}' column")]
    MissingColumn(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
