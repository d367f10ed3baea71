use rusqlite::Error as RusqliteError;
use std::io;
use thiserror::Error;

use crate::reputation::CheckError;

#[derive(Error, Debug)]
pub enum DomainWatchError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Invalid domain: '{0}'")]
    InvalidDomain(String),

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Domain '{0}' is already registered")]
    DuplicateDomain(String),

    #[error("Domain with id {0} not found")]
    DomainNotFound(i64),

    #[error("Reputation check failed: {0}")]
    CheckFailed(#[from] CheckError),

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}
