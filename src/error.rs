pub type CoinjarResult<T> = Result<T, CoinjarError>;

#[derive(thiserror::Error, Debug)]
pub enum CoinjarError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("placement error: {0}")]
    Placement(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoinjarError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn placement(msg: impl Into<String>) -> Self {
        Self::Placement(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}
