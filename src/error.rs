use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("level {0} is outside 1-5")]
    InvalidLevel(u8),

    #[error("unknown skill: {0}")]
    UnknownSkill(String),

    #[error("unknown badge: {0}")]
    UnknownBadge(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("import error: {0}")]
    Import(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProgressError>;
