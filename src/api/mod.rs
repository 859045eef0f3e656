//! JSON-over-HTTP surface for the CRM service.

pub mod server;
pub mod types;

pub use server::{ApiServer, HEADER_PREPARER_ID, HEADER_USER_ID, HEADER_USER_ROLE};
pub use types::ApiResponse;
