//! Business rules shared by the HTTP layer, the stores and the import script

pub mod content;
pub mod imei;
pub mod reminder;
pub mod tax;

pub use content::{Platform, PostFormat};
pub use imei::{Imei, ImeiError};
pub use tax::{Money, TaxBreakdown};
