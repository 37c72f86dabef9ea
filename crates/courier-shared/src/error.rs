use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Path segment is empty")]
    EmptySegment,

    #[error("Path segment contains '/': {0}")]
    SlashInSegment(String),
}
