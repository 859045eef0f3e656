pub mod api;
pub mod cli;
pub mod config;
pub mod crm;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;

pub use db::Database;
pub use error::{CrmError, Result};
