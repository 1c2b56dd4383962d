use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestInfraError {
    #[error("container error: {0}")]
    Container(#[from] testcontainers::TestcontainersError),
    #[error("startup error: {0}")]
    Startup(String),
}

pub type Result<T> = std::result::Result<T, TestInfraError>;
