pub mod config_cmd;
pub mod ingest;
pub mod init;
pub mod query;
pub mod runtime;
pub mod stats;
pub mod trim;
