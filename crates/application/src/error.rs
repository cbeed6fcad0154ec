use domain::{DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}

impl ApplicationError {
    /// 回传给消息发起方的原因描述。
    ///
    /// 校验和授权错误原样透出；存储细节不暴露给客户端。
    pub fn reason(&self) -> String {
        match self {
            Self::Domain(err) => err.to_string(),
            Self::Repository(_) => "failed to store message".to_string(),
        }
    }
}
