use std::sync::Arc;

use poem_openapi::payload::Json;

use crate::{
    reader_api::models::{
        ErrorDto, NoContentResponseDto, PositionAckDto, PositionChangedDto, PositionResponseDto,
        ProgressGetResponseDto, ProgressListResponseDto, ResolveResponseDto, ResolvedPositionDto,
    },
    restoration::{RestorationService, SeekRetryPolicy},
    storage::ProgressStore,
    sync::ProgressSyncCoordinator,
};

pub struct ProgressService<'a> {
    pub coordinator: &'a Arc<ProgressSyncCoordinator>,
    pub restoration: &'a RestorationService,
    pub store: &'a dyn ProgressStore,
    pub seek_retry: SeekRetryPolicy,
}

fn invalid_book_id(book_id: &str) -> Option<ErrorDto> {
    book_id
        .trim()
        .is_empty()
        .then(|| ErrorDto::from("Book id is required".to_string()))
}

impl<'a> ProgressService<'a> {
    pub fn new(
        coordinator: &'a Arc<ProgressSyncCoordinator>,
        restoration: &'a RestorationService,
        store: &'a dyn ProgressStore,
        seek_retry: SeekRetryPolicy,
    ) -> Self {
        Self {
            coordinator,
            restoration,
            store,
            seek_retry,
        }
    }

    #[tracing::instrument(level = "debug", skip(self, body), fields(fraction = body.fraction))]
    pub fn position_changed(&self, book_id: &str, body: PositionChangedDto) -> PositionResponseDto {
        if let Some(err) = invalid_book_id(book_id) {
            return PositionResponseDto::BadRequest(Json(err));
        }
        if body.position.trim().is_empty() {
            return PositionResponseDto::BadRequest(Json(ErrorDto {
                message: "Position is required".into(),
            }));
        }
        if !body.fraction.is_finite() {
            return PositionResponseDto::BadRequest(Json(ErrorDto {
                message: "Fraction must be a number between 0 and 1".into(),
            }));
        }
        let accepted = self
            .coordinator
            .on_position_changed(book_id, &body.position, body.fraction);
        PositionResponseDto::Accepted(Json(PositionAckDto {
            accepted,
            high_water_mark: self.coordinator.high_water_mark(book_id),
        }))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn open_book(&self, book_id: &str) -> ResolveResponseDto {
        if let Some(err) = invalid_book_id(book_id) {
            return ResolveResponseDto::BadRequest(Json(err));
        }
        let resolved = self.restoration.resolve(book_id).await;
        ResolveResponseDto::Ok(Json(ResolvedPositionDto::new(resolved, self.seek_retry)))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn flush(&self, book_id: &str) -> NoContentResponseDto {
        if let Some(err) = invalid_book_id(book_id) {
            return NoContentResponseDto::BadRequest(Json(err));
        }
        self.coordinator.flush_now(book_id).await;
        NoContentResponseDto::NoContent
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list(&self) -> ProgressListResponseDto {
        match self.store.get_all().await {
            Ok(records) => {
                ProgressListResponseDto::Ok(Json(records.into_iter().map(Into::into).collect()))
            }
            Err(e) => {
                tracing::error!(error = %format!("{:?}", e), "failed to list progress");
                ProgressListResponseDto::InternalError(Json(ErrorDto {
                    message: format!("Local store error: {}", e),
                }))
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get(&self, book_id: &str) -> ProgressGetResponseDto {
        match self.store.get(book_id).await {
            Ok(Some(record)) => ProgressGetResponseDto::Ok(Json(record.into())),
            Ok(None) => ProgressGetResponseDto::NotFound(Json(ErrorDto {
                message: format!("No progress for {}", book_id),
            })),
            Err(e) => {
                tracing::error!(error = %format!("{:?}", e), %book_id, "failed to read progress");
                ProgressGetResponseDto::InternalError(Json(ErrorDto {
                    message: format!("Local store error: {}", e),
                }))
            }
        }
    }
}
