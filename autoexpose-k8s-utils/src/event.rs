use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// A change observed on a single object.
///
/// Events are typed by the resource they carry, so a handler registered for
/// one kind can never be handed an object of another.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceEvent<K> {
    Add(Arc<K>),
    Update { old: Arc<K>, new: Arc<K> },
    /// Carries the last known state of the deleted object.
    Delete(Arc<K>),
}

impl<K> ResourceEvent<K>
where
    K: Send + Sync,
{
    pub fn action(&self) -> &'static str {
        match self {
            ResourceEvent::Add(_) => "add",
            ResourceEvent::Update { .. } => "update",
            ResourceEvent::Delete(_) => "delete",
        }
    }

    /// Most recent known state of the object.
    pub fn resource(&self) -> &K {
        match self {
            ResourceEvent::Add(k) | ResourceEvent::Delete(k) => k,
            ResourceEvent::Update { new, .. } => new,
        }
    }

    pub async fn dispatch<H>(self, handler: &H) -> Result<(), H::Error>
    where
        H: EventHandler<K>,
    {
        match self {
            ResourceEvent::Add(k) => handler.on_add(k).await,
            ResourceEvent::Update { old, new } => handler.on_update(old, new).await,
            ResourceEvent::Delete(k) => handler.on_delete(k).await,
        }
    }
}

/// Callbacks invoked by an [`Informer`](crate::Informer), one at a time and in
/// delivery order for a given resource kind.
pub trait EventHandler<K>: Send + Sync {
    type Error: Display + Send;

    fn on_add(&self, obj: Arc<K>) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn on_update(
        &self,
        old: Arc<K>,
        new: Arc<K>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn on_delete(&self, obj: Arc<K>) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
