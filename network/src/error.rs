#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("invalid network shape: {0}")]
    InvalidShape(String),
    #[error("{what} has width {actual}, network expects {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("cannot train on an empty batch")]
    EmptyBatch,
    #[error("optimizer failure: {0}")]
    Optimizer(String),
}
