//! Data store modules over the SQLite pool

pub mod approvals;
pub mod content_calendar;
pub mod customers;
pub mod db;
pub mod files;
pub mod income;
pub mod inventory;
pub mod messages;
pub mod tasks;
pub mod users;

pub use approvals::ApprovalStore;
pub use content_calendar::ContentCalendarStore;
pub use customers::CustomerStore;
pub use db::StoreError;
pub use files::FileStore;
pub use income::IncomeStore;
pub use inventory::InventoryStore;
pub use messages::MessageStore;
pub use tasks::TaskStore;
pub use users::UserStore;
