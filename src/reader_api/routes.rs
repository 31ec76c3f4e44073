use std::sync::Arc;

use poem_openapi::{OpenApi, param::Path, payload::Json};

use super::models::{
    ConnectivityDto, ConnectivityResponseDto, DrainResponseDto, HealthResponseDto,
    NoContentResponseDto, PositionChangedDto, PositionResponseDto, ProgressGetResponseDto,
    ProgressListResponseDto, QueueClearResponseDto, QueueListResponseDto, ResolveResponseDto, VisibilityDto,
};
use super::services::{
    connectivity::ConnectivityService, health::HealthService, progress::ProgressService,
};
use crate::{
    connectivity::ConnectivityMonitor,
    remote_client::RemoteProgress,
    restoration::{RestorationService, SeekRetryPolicy},
    storage::{ProgressStore, SyncQueue},
    sync::ProgressSyncCoordinator,
};

pub struct ReaderApi {
    pub coordinator: Arc<ProgressSyncCoordinator>,
    pub restoration: Arc<RestorationService>,
    pub store: Arc<dyn ProgressStore>,
    pub queue: Arc<dyn SyncQueue>,
    pub remote: Arc<dyn RemoteProgress>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub seek_retry: SeekRetryPolicy,
}

impl ReaderApi {
    fn progress_service(&self) -> ProgressService<'_> {
        ProgressService::new(
            &self.coordinator,
            &self.restoration,
            self.store.as_ref(),
            self.seek_retry,
        )
    }

    fn connectivity_service(&self) -> ConnectivityService<'_> {
        ConnectivityService::new(&self.connectivity, &self.coordinator, self.queue.as_ref())
    }
}

#[OpenApi]
impl ReaderApi {
    #[oai(path = "/health", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn health(&self) -> HealthResponseDto {
        HealthService::new(&self.connectivity, self.remote.as_ref(), self.queue.as_ref())
            .status()
            .await
    }

    // ===== Renderer events =====

    /// Report the renderer's current location
    #[oai(path = "/books/:book_id/position", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, book_id, body))]
    async fn position_changed(
        &self,
        book_id: Path<String>,
        body: Json<PositionChangedDto>,
    ) -> PositionResponseDto {
        self.progress_service().position_changed(&book_id.0, body.0)
    }

    /// Resolve where a freshly opened book should start
    #[oai(path = "/books/:book_id/open", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, book_id))]
    async fn open_book(&self, book_id: Path<String>) -> ResolveResponseDto {
        self.progress_service().open_book(&book_id.0).await
    }

    /// Save pending progress immediately, e.g. when the book is closed
    #[oai(path = "/books/:book_id/flush", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, book_id))]
    async fn flush_book(&self, book_id: Path<String>) -> NoContentResponseDto {
        self.progress_service().flush(&book_id.0).await
    }

    // ===== Local progress =====

    #[oai(path = "/progress", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_progress(&self) -> ProgressListResponseDto {
        self.progress_service().list().await
    }

    #[oai(path = "/progress/:book_id", method = "get")]
    #[tracing::instrument(level = "debug", skip(self, book_id))]
    async fn get_progress(&self, book_id: Path<String>) -> ProgressGetResponseDto {
        self.progress_service().get(&book_id.0).await
    }

    // ===== Platform notifications =====

    #[oai(path = "/connectivity", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn connectivity_changed(&self, body: Json<ConnectivityDto>) -> ConnectivityResponseDto {
        tracing::debug!(online = body.online, "handling /connectivity");
        self.connectivity_service().set_online(body.online)
    }

    #[oai(path = "/visibility", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn visibility_changed(&self, body: Json<VisibilityDto>) -> ConnectivityResponseDto {
        tracing::debug!(visible = body.visible, "handling /visibility");
        self.connectivity_service().set_visible(body.visible)
    }

    // ===== Sync queue =====

    #[oai(path = "/queue", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_queue(&self) -> QueueListResponseDto {
        self.connectivity_service().list_queue().await
    }

    /// Discard every queued update
    #[oai(path = "/queue", method = "delete")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn clear_queue(&self) -> QueueClearResponseDto {
        self.connectivity_service().clear_queue().await
    }

    /// Drain the queue now instead of waiting for a reconnect
    #[oai(path = "/queue/drain", method = "post")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn drain_queue(&self) -> DrainResponseDto {
        self.connectivity_service().drain().await
    }
}
