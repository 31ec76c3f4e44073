use std::sync::Arc;

use poem_openapi::payload::Json;

use crate::{
    connectivity::{ConnectivityChanged, ConnectivityMonitor, ReconnectTrigger},
    reader_api::models::{
        ConnectivityResponseDto, ConnectivityStateDto, DrainResponseDto, ErrorDto,
        QueueClearResponseDto, QueueClearedDto, QueueListResponseDto,
    },
    storage::SyncQueue,
    sync::ProgressSyncCoordinator,
};

pub struct ConnectivityService<'a> {
    pub connectivity: &'a ConnectivityMonitor,
    pub coordinator: &'a Arc<ProgressSyncCoordinator>,
    pub queue: &'a dyn SyncQueue,
}

impl<'a> ConnectivityService<'a> {
    pub fn new(
        connectivity: &'a ConnectivityMonitor,
        coordinator: &'a Arc<ProgressSyncCoordinator>,
        queue: &'a dyn SyncQueue,
    ) -> Self {
        Self {
            connectivity,
            coordinator,
            queue,
        }
    }

    fn state(&self, trigger: Option<ReconnectTrigger>) -> ConnectivityResponseDto {
        ConnectivityResponseDto::Ok(Json(ConnectivityStateDto {
            online: self.connectivity.is_online(),
            reconnect_triggered: trigger.is_some(),
        }))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn set_online(&self, online: bool) -> ConnectivityResponseDto {
        self.state(self.connectivity.set_online(online))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn set_visible(&self, visible: bool) -> ConnectivityResponseDto {
        let event = if visible {
            ConnectivityChanged::Visible
        } else {
            ConnectivityChanged::Hidden
        };
        self.state(self.connectivity.notify(event))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_queue(&self) -> QueueListResponseDto {
        match self.queue.list().await {
            Ok(items) => QueueListResponseDto::Ok(Json(items.into_iter().map(Into::into).collect())),
            Err(e) => {
                tracing::error!(error = %format!("{:?}", e), "failed to list sync queue");
                QueueListResponseDto::InternalError(Json(ErrorDto {
                    message: format!("Local store error: {}", e),
                }))
            }
        }
    }

    /// Drop every queued update without sending it.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn clear_queue(&self) -> QueueClearResponseDto {
        match self.queue.clear().await {
            Ok(removed) => {
                tracing::info!(removed, "cleared sync queue");
                QueueClearResponseDto::Ok(Json(QueueClearedDto { removed }))
            }
            Err(e) => {
                tracing::error!(error = %format!("{:?}", e), "failed to clear sync queue");
                QueueClearResponseDto::InternalError(Json(ErrorDto {
                    message: format!("Local store error: {}", e),
                }))
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn drain(&self) -> DrainResponseDto {
        let report = self.coordinator.on_reconnect().await;
        DrainResponseDto::Ok(Json(report.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sync::SyncSettings,
        testing::{FakeRemote, MemoryProgressStore, MemorySyncQueue},
    };

    #[tokio::test]
    async fn manual_drain_delivers_queued_updates() {
        let queue = Arc::new(MemorySyncQueue::default());
        let remote = Arc::new(FakeRemote::default());
        let connectivity = Arc::new(ConnectivityMonitor::new(false));
        let coordinator = ProgressSyncCoordinator::new(
            Arc::new(MemoryProgressStore::default()),
            queue.clone(),
            remote.clone(),
            connectivity.clone(),
            SyncSettings::default(),
        );
        queue.enqueue("B1", Some("loc-40"), 40).await.unwrap();
        let service = ConnectivityService::new(&connectivity, &coordinator, queue.as_ref());

        let DrainResponseDto::Ok(Json(report)) = service.drain().await;
        assert_eq!(report.delivered, 0);

        let ConnectivityResponseDto::Ok(Json(state)) = service.set_online(true);
        assert!(state.online);
        assert!(state.reconnect_triggered);

        let DrainResponseDto::Ok(Json(report)) = service.drain().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(remote.upserts().len(), 1);

        let QueueListResponseDto::Ok(Json(items)) = service.list_queue().await else {
            panic!("expected 200");
        };
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn clear_reports_removed_items() {
        let queue = Arc::new(MemorySyncQueue::default());
        let connectivity = Arc::new(ConnectivityMonitor::new(false));
        let coordinator = ProgressSyncCoordinator::new(
            Arc::new(MemoryProgressStore::default()),
            queue.clone(),
            Arc::new(FakeRemote::default()),
            connectivity.clone(),
            SyncSettings::default(),
        );
        queue.enqueue("A", Some("a"), 10).await.unwrap();
        queue.enqueue("B", Some("b"), 20).await.unwrap();
        let service = ConnectivityService::new(&connectivity, &coordinator, queue.as_ref());

        let QueueClearResponseDto::Ok(Json(cleared)) = service.clear_queue().await else {
            panic!("expected 200");
        };
        assert_eq!(cleared.removed, 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn hidden_does_not_trigger() {
        let connectivity = ConnectivityMonitor::new(true);
        let coordinator = ProgressSyncCoordinator::new(
            Arc::new(MemoryProgressStore::default()),
            Arc::new(MemorySyncQueue::default()),
            Arc::new(FakeRemote::default()),
            Arc::new(ConnectivityMonitor::new(true)),
            SyncSettings::default(),
        );
        let queue = MemorySyncQueue::default();
        let service = ConnectivityService::new(&connectivity, &coordinator, &queue);

        let ConnectivityResponseDto::Ok(Json(state)) = service.set_visible(false);
        assert!(!state.reconnect_triggered);
        let ConnectivityResponseDto::Ok(Json(state)) = service.set_visible(true);
        assert!(state.reconnect_triggered);
    }
}
