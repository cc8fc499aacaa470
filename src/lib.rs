pub mod cli;
pub mod config;
pub mod import;
pub mod logging;
pub mod records;
pub mod store;
pub mod users;
pub mod validate;
