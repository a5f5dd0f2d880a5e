pub mod broadcaster;
pub mod conversation_repository;
pub mod device_token_repository;
pub mod message_repository;
pub mod presence;
pub mod push_provider;
pub mod task_spawner;

pub use broadcaster::Broadcaster;
pub use conversation_repository::ConversationRepository;
pub use device_token_repository::DeviceTokenRepository;
pub use message_repository::MessageRepository;
pub use presence::PresenceRegistry;
pub use push_provider::{PushFailure, PushProvider};
pub use task_spawner::TaskSpawner;
