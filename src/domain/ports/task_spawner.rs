use futures::future::BoxFuture;

/// Runs best-effort work detached from the request that scheduled it.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, future: BoxFuture<'static, ()>);
}
