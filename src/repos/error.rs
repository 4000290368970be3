/*
 * Responsibility
 * - what the record store reports upward
 */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("invalid record: {0}")]
    Invalid(String),
    #[error("storage error: {0}")]
    Storage(String),
}
