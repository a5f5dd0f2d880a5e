use super::test_db::{setup_test_db, TestDb};
use evdesk::application::services::{AssignmentService, AssignmentSettings, NotificationService};
use evdesk::domain::entities::PushPayload;
use evdesk::domain::events::RealtimeEvent;
use evdesk::infrastructure::persistence::Database;
use evdesk::domain::ports::{
    Broadcaster, ConversationRepository, DeviceTokenRepository, MessageRepository,
    PresenceRegistry, PushFailure, PushProvider, TaskSpawner,
};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Room(String),
    User(String),
    AllStaff,
}

/// Records every emitted event with its addressing.
#[derive(Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<(Target, RealtimeEvent)>>,
}

impl RecordingBroadcaster {
    pub fn events(&self) -> Vec<(Target, RealtimeEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds_for(&self, target: &Target) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter(|(t, _)| t == target)
            .map(|(_, e)| e.kind())
            .collect()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.events().iter().filter(|(_, e)| e.kind() == kind).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn to_room(&self, conversation_id: &str, event: RealtimeEvent) {
        self.events
            .lock()
            .unwrap()
            .push((Target::Room(conversation_id.to_string()), event));
    }

    fn to_user(&self, user_id: &str, event: RealtimeEvent) {
        self.events
            .lock()
            .unwrap()
            .push((Target::User(user_id.to_string()), event));
    }

    fn to_all_staff(&self, event: RealtimeEvent) {
        self.events.lock().unwrap().push((Target::AllStaff, event));
    }
}

/// Presence set by hand.
#[derive(Default)]
pub struct StaticPresence {
    online: Mutex<HashSet<String>>,
    staff: Mutex<HashSet<String>>,
}

impl StaticPresence {
    pub fn set_online(&self, user_id: &str, is_staff: bool) {
        self.online.lock().unwrap().insert(user_id.to_string());
        if is_staff {
            self.staff.lock().unwrap().insert(user_id.to_string());
        }
    }

    pub fn set_offline(&self, user_id: &str) {
        self.online.lock().unwrap().remove(user_id);
        self.staff.lock().unwrap().remove(user_id);
    }
}

impl PresenceRegistry for StaticPresence {
    fn is_online(&self, user_id: &str) -> bool {
        self.online.lock().unwrap().contains(user_id)
    }

    fn online_staff(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.staff.lock().unwrap().iter().cloned().collect();
        ids.sort();
        ids
    }
}

/// Accepts every target except those marked invalid.
#[derive(Default)]
pub struct MockPushProvider {
    invalid: Mutex<HashSet<String>>,
    delivered: Mutex<Vec<(String, PushPayload)>>,
}

impl MockPushProvider {
    pub fn mark_invalid(&self, target: &str) {
        self.invalid.lock().unwrap().insert(target.to_string());
    }

    pub fn delivered(&self) -> Vec<(String, PushPayload)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PushProvider for MockPushProvider {
    async fn deliver(&self, target: &str, payload: &PushPayload) -> Result<(), PushFailure> {
        if self.invalid.lock().unwrap().contains(target) {
            return Err(PushFailure::InvalidTarget(format!("{} unregistered", target)));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((target.to_string(), payload.clone()));
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Holds scheduled work until the test runs it.
#[derive(Default)]
pub struct RecordingSpawner {
    pending: Mutex<Vec<BoxFuture<'static, ()>>>,
}

impl RecordingSpawner {
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub async fn run_pending(&self) {
        let tasks: Vec<_> = self.pending.lock().unwrap().drain(..).collect();
        for task in tasks {
            task.await;
        }
    }
}

impl TaskSpawner for RecordingSpawner {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        self.pending.lock().unwrap().push(future);
    }
}

pub struct ChatHarness {
    pub test_db: TestDb,
    pub service: AssignmentService,
    pub notifications: NotificationService,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub presence: Arc<StaticPresence>,
    pub push: Arc<MockPushProvider>,
    pub spawner: Arc<RecordingSpawner>,
}

pub async fn chat_harness() -> ChatHarness {
    chat_harness_with(AssignmentSettings::default()).await
}

pub async fn chat_harness_with(settings: AssignmentSettings) -> ChatHarness {
    build_harness(settings, |db| Arc::new(db) as Arc<dyn MessageRepository>).await
}

/// Harness whose message store is built from the test database by `messages`.
pub async fn chat_harness_with_messages<F>(messages: F) -> ChatHarness
where
    F: FnOnce(Database) -> Arc<dyn MessageRepository>,
{
    build_harness(AssignmentSettings::default(), messages).await
}

async fn build_harness<F>(settings: AssignmentSettings, messages: F) -> ChatHarness
where
    F: FnOnce(Database) -> Arc<dyn MessageRepository>,
{
    let test_db = setup_test_db().await;
    let db = test_db.db.clone();

    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let presence = Arc::new(StaticPresence::default());
    let push = Arc::new(MockPushProvider::default());
    let spawner = Arc::new(RecordingSpawner::default());

    let notifications = NotificationService::new(
        Arc::clone(&push) as Arc<dyn PushProvider>,
        Arc::new(db.clone()) as Arc<dyn DeviceTokenRepository>,
        Arc::clone(&presence) as Arc<dyn PresenceRegistry>,
    );
    let service = AssignmentService::new(
        Arc::new(db.clone()) as Arc<dyn ConversationRepository>,
        messages(db.clone()),
        Arc::clone(&presence) as Arc<dyn PresenceRegistry>,
        Arc::clone(&broadcaster) as Arc<dyn Broadcaster>,
        notifications.clone(),
        Arc::clone(&spawner) as Arc<dyn TaskSpawner>,
        settings,
    );

    ChatHarness {
        test_db,
        service,
        notifications,
        broadcaster,
        presence,
        push,
        spawner,
    }
}
