use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::session::{BoxError, SessionBackend};
use crate::types::SessionId;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe wrapper for SessionBackend (needed for Arc<dyn>).
trait SessionBackendDyn: Send + Sync {
    fn is_active_dyn<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, Result<bool, BoxError>>;

    fn start_dyn<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, Result<(), BoxError>>;

    fn get_dyn<'a>(
        &'a self,
        id: &'a SessionId,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<Value>, BoxError>>;

    fn set_dyn<'a>(
        &'a self,
        id: &'a SessionId,
        key: &'a str,
        value: Value,
    ) -> BoxFuture<'a, Result<(), BoxError>>;

    fn remove_dyn<'a>(
        &'a self,
        id: &'a SessionId,
        key: &'a str,
    ) -> BoxFuture<'a, Result<(), BoxError>>;
}

impl<T: SessionBackend> SessionBackendDyn for T {
    fn is_active_dyn<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, Result<bool, BoxError>> {
        Box::pin(self.is_active(id))
    }

    fn start_dyn<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(self.start(id))
    }

    fn get_dyn<'a>(
        &'a self,
        id: &'a SessionId,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<Value>, BoxError>> {
        Box::pin(self.get(id, key))
    }

    fn set_dyn<'a>(
        &'a self,
        id: &'a SessionId,
        key: &'a str,
        value: Value,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(self.set(id, key, value))
    }

    fn remove_dyn<'a>(
        &'a self,
        id: &'a SessionId,
        key: &'a str,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(self.remove(id, key))
    }
}

/// Type-erased backend shared by every request.
#[derive(Clone)]
pub(super) struct SharedBackend(Arc<dyn SessionBackendDyn>);

impl SharedBackend {
    pub(super) fn new<B: SessionBackend>(backend: B) -> Self {
        Self(Arc::new(backend))
    }
}

impl SessionBackend for SharedBackend {
    async fn is_active(&self, id: &SessionId) -> Result<bool, BoxError> {
        self.0.is_active_dyn(id).await
    }

    async fn start(&self, id: &SessionId) -> Result<(), BoxError> {
        self.0.start_dyn(id).await
    }

    async fn get(&self, id: &SessionId, key: &str) -> Result<Option<Value>, BoxError> {
        self.0.get_dyn(id, key).await
    }

    async fn set(&self, id: &SessionId, key: &str, value: Value) -> Result<(), BoxError> {
        self.0.set_dyn(id, key, value).await
    }

    async fn remove(&self, id: &SessionId, key: &str) -> Result<(), BoxError> {
        self.0.remove_dyn(id, key).await
    }
}
