use crate::domain::entities::DeviceToken;
use crate::domain::errors::DomainResult;

#[async_trait::async_trait]
pub trait DeviceTokenRepository: Send + Sync {
    async fn register(
        &self,
        owner_id: &str,
        token: &str,
        platform: Option<&str>,
    ) -> DomainResult<DeviceToken>;

    async fn list_for_owner(&self, owner_id: &str) -> DomainResult<Vec<DeviceToken>>;

    async fn remove_tokens(&self, owner_id: &str, tokens: &[String]) -> DomainResult<u64>;
}
