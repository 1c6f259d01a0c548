#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid process number: {0}")]
    InvalidProcessNumber(String),
}
