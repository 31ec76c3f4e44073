use poem_openapi::payload::Json;

use crate::{
    connectivity::ConnectivityMonitor,
    reader_api::models::{HealthDto, HealthResponseDto},
    remote_client::RemoteProgress,
    storage::SyncQueue,
};

pub struct HealthService<'a> {
    pub connectivity: &'a ConnectivityMonitor,
    pub remote: &'a dyn RemoteProgress,
    pub queue: &'a dyn SyncQueue,
}

impl<'a> HealthService<'a> {
    pub fn new(
        connectivity: &'a ConnectivityMonitor,
        remote: &'a dyn RemoteProgress,
        queue: &'a dyn SyncQueue,
    ) -> Self {
        Self {
            connectivity,
            remote,
            queue,
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn status(&self) -> HealthResponseDto {
        let pending_sync = match self.queue.list().await {
            Ok(items) => Some(items.len() as u64),
            Err(e) => {
                tracing::warn!(error = %e, "failed to count sync queue");
                None
            }
        };
        HealthResponseDto::Ok(Json(HealthDto {
            status: "ok".into(),
            online: self.connectivity.is_online(),
            remote_authorized: self.remote.is_authorized(),
            pending_sync,
        }))
    }
}
