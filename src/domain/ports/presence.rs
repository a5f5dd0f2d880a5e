/// Read side of presence, as the engine sees it.
///
/// Answers reflect this process only and may be stale by the time a caller
/// acts on them.
pub trait PresenceRegistry: Send + Sync {
    fn is_online(&self, user_id: &str) -> bool;

    /// Staff ids with at least one live connection.
    fn online_staff(&self) -> Vec<String>;
}
