use thiserror::Error;

#[derive(Debug, Error)]
pub enum StockadeError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StockadeError {
    /// Short, stable error code for operator-facing output.
    pub fn code(&self) -> &'static str {
        match self {
            StockadeError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, StockadeError>;
