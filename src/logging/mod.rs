pub mod console;
pub mod ndjson;
