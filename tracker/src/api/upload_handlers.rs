use axum::{extract::State, http::StatusCode, response::Json};

use crate::manager::progress;
use crate::views::UploadedPhotos;

use super::{
    ApiErr, ApiMultipart, AppState,
    dto::{self, Envelope},
    jwt::OfficerUser,
    progress_handlers::read_form,
};

/// Pre-upload photos; the returned URLs can be sent as `photo_urls` when the
/// report is filed.
pub async fn upload_progress_photos(
    OfficerUser(officer): OfficerUser,
    State(state): State<AppState>,
    ApiMultipart(multipart): ApiMultipart,
) -> Result<(StatusCode, Json<Envelope<UploadedPhotos>>), ApiErr> {
    let form = read_form(multipart).await?;
    let uploaded =
        progress::upload_photos(state.photos.as_ref(), &state.upload, &officer, form.photos).await?;
    Ok(dto::created("Photos uploaded", uploaded))
}
