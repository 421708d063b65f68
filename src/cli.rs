//! Command line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::store::users::Role;

/// Marketing agency back office
#[derive(Debug, Parser)]
#[command(name = "agency_backoffice", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Create every table and index, then print row counts
    SetupDb,
    /// Replace all customers with the rows of a spreadsheet
    ImportCustomers(ImportArgs),
    /// Create a team member and print a 30-day bearer token
    CreateTestUser(CreateUserArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Spreadsheet to read (defaults to CUSTOMER_IMPORT_PATH)
    #[arg(long)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CreateUserArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub name: String,
    /// admin, manager or member
    #[arg(long, default_value = "member", value_parser = parse_role)]
    pub role: Role,
}

fn parse_role(raw: &str) -> Result<Role, String> {
    match raw.trim().to_lowercase().as_str() {
        "admin" => Ok(Role::Admin),
        "manager" => Ok(Role::Manager),
        "member" => Ok(Role::Member),
        other => Err(format!("unknown role '{other}'")),
    }
}
