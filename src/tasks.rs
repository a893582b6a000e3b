use crate::events::{EventBus, LapseEvent};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawn a background task whose panic is reported as `InternalError` instead of being lost.
///
/// The returned handle resolves once the supervised task has finished.
pub fn spawn_supervised<F>(
    component: &'static str,
    event_bus: Arc<EventBus>,
    future: F,
) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(future);
    tokio::spawn(async move {
        match task.await {
            Ok(()) => debug!("Background task '{}' finished", component),
            Err(e) if e.is_panic() => {
                error!("Background task '{}' panicked", component);
                let _ = event_bus
                    .publish(LapseEvent::InternalError {
                        component: component.to_string(),
                        error: "task panicked".to_string(),
                    })
                    .await;
            }
            Err(_) => debug!("Background task '{}' was cancelled", component),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_is_published_as_internal_error() {
        let event_bus = Arc::new(EventBus::new(10));
        let mut receiver = event_bus.subscribe();

        let handle = spawn_supervised("exploder", Arc::clone(&event_bus), async {
            panic!("boom");
        });
        handle.await.unwrap();

        match receiver.recv().await.unwrap() {
            LapseEvent::InternalError { component, .. } => assert_eq!(component, "exploder"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
