//!
//! src/errors.rs
//!
//! Defines enums and methods of error conversion
//! for errors the backup tool uses
//!

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SptoolsError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("api error: status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("db error: {0}")]
    Db(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("file already exists: {}", .0.display())]
    FileExists(PathBuf),
    #[error("no backup found in the snapshot store, run `backup` first")]
    NoBackup,
}

impl From<reqwest::Error> for SptoolsError {
    fn from(e: reqwest::Error) -> Self { SptoolsError::Http(e.to_string()) }
}

impl From<serde_json::Error> for SptoolsError {
    fn from(e: serde_json::Error) -> Self { SptoolsError::Parse(e.to_string()) }
}

impl From<sqlx::Error> for SptoolsError {
    fn from(e: sqlx::Error) -> Self { SptoolsError::Db(e.to_string()) }
}

impl From<toml::de::Error> for SptoolsError {
    fn from(e: toml::de::Error) -> Self { SptoolsError::Config(e.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_read_plainly() {
        let err = SptoolsError::RateLimited("gave up after 4 attempts".into());
        assert_eq!(err.to_string(), "rate limited: gave up after 4 attempts");

        let err = SptoolsError::Api { status: 404, body: "missing".into() };
        assert_eq!(err.to_string(), "api error: status 404: missing");

        let err = SptoolsError::FileExists(PathBuf::from("out.json"));
        assert_eq!(err.to_string(), "file already exists: out.json");
    }
}
