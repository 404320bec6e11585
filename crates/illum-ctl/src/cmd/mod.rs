//! CLI command modules.

pub mod http;
pub mod session;
pub mod status;
