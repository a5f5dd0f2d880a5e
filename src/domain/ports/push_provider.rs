use crate::domain::entities::PushPayload;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PushFailure {
    /// The target will never accept deliveries again.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("transient failure: {0}")]
    Transient(String),
}

#[async_trait::async_trait]
pub trait PushProvider: Send + Sync {
    async fn deliver(&self, target: &str, payload: &PushPayload) -> Result<(), PushFailure>;

    fn provider_name(&self) -> &'static str;
}
