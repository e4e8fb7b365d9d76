use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrustError {
    #[error("malformed record at row {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    #[error("invalid scoring mode: {0} (expected \"average\" or \"rev2\")")]
    InvalidMode(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, TrustError>;

impl TrustError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        TrustError::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }
}
