//! HTTP layer: router, auth middleware and per-resource handlers

pub mod approvals;
pub mod content;
pub mod customers;
pub mod income;
pub mod inventory;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod tasks;

pub use routes::{build_router, AppError};

#[cfg(test)]
mod tests;
