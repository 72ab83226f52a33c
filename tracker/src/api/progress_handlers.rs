use axum::{
    extract::{State, multipart::Multipart},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::manager::progress::{self, ProgressFilter, ProgressForm};
use crate::photos::PhotoUpload;
use crate::policy;
use crate::views::ProgressView;

use super::{
    ApiErr, ApiMultipart, ApiPath, ApiQuery, AppState,
    dto::{self, Envelope, ListProgressQuery, PaginatedEnvelope, Paged},
    jwt::{CurrentUser, OfficerUser},
};

/// Read a progress form from multipart parts. File parts become uploads;
/// `photo_urls` may repeat or carry a JSON array.
pub(crate) async fn read_form(mut multipart: Multipart) -> Result<ProgressForm, ApiErr> {
    let mut form = ProgressForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field
            .name()
            .unwrap_or_default()
            .trim_end_matches("[]")
            .to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?;
            if file_name.is_empty() && bytes.is_empty() {
                continue;
            }
            form.photos.push(PhotoUpload {
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let text = field.text().await?;
        match name.as_str() {
            "description" => form.description = Some(text),
            "report_date" => form.report_date = Some(text),
            "progress_percentage" => form.progress_percentage = Some(text),
            "milestone_id" => form.milestone_id = Some(text),
            "photo_urls" => form.photo_urls.extend(split_urls(&text)),
            _ => {}
        }
    }

    Ok(form)
}

fn split_urls(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.starts_with('[')
        && let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed)
    {
        return list;
    }
    vec![trimmed.to_string()]
}

fn filter_from(params: ListProgressQuery) -> ProgressFilter {
    ProgressFilter {
        event_id: params.event_id,
        milestone_id: params.milestone_id,
        officer_id: params.officer_id,
    }
}

pub async fn list_for_event(
    CurrentUser(viewer): CurrentUser,
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<Uuid>,
    ApiQuery(params): ApiQuery<ListProgressQuery>,
) -> Result<Json<PaginatedEnvelope<ProgressView>>, ApiErr> {
    let access = policy::can_access_event(&state.db, &viewer, event_id).await?;
    let req = params.page_request();
    let page = progress::list_for_event(&state.db, &access, filter_from(params), req).await?;
    Ok(dto::paginated("Progress reports retrieved", page))
}

pub async fn list_progress(
    CurrentUser(viewer): CurrentUser,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListProgressQuery>,
) -> Result<Json<PaginatedEnvelope<ProgressView>>, ApiErr> {
    let req = params.page_request();
    let page = progress::list(&state.db, &viewer, filter_from(params), req).await?;
    Ok(dto::paginated("Progress reports retrieved", page))
}

pub async fn get_progress(
    CurrentUser(viewer): CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<ProgressView>>, ApiErr> {
    let report = progress::get(&state.db, &viewer, id).await?;
    Ok(dto::ok("Progress report retrieved", report))
}

/// Role and assignment are checked before the body is read.
pub async fn create_progress(
    OfficerUser(officer): OfficerUser,
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<Uuid>,
    ApiMultipart(multipart): ApiMultipart,
) -> Result<(StatusCode, Json<Envelope<ProgressView>>), ApiErr> {
    let access = policy::can_access_event(&state.db, officer.identity(), event_id).await?;
    let form = read_form(multipart).await?;
    let report = progress::create(
        &state.db,
        state.photos.as_ref(),
        &state.upload,
        &officer,
        &access,
        form,
    )
    .await?;
    Ok(dto::created("Progress report created", report))
}

pub async fn update_progress(
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiMultipart(multipart): ApiMultipart,
) -> Result<Json<Envelope<ProgressView>>, ApiErr> {
    let ownership = policy::can_modify_progress(&state.db, &caller, id).await?;
    let form = read_form(multipart).await?;
    let report = progress::update(
        &state.db,
        state.photos.as_ref(),
        &state.upload,
        ownership,
        form,
    )
    .await?;
    Ok(dto::ok("Progress report updated", report))
}

pub async fn delete_progress(
    CurrentUser(caller): CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Envelope<()>>, ApiErr> {
    let ownership = policy::can_modify_progress(&state.db, &caller, id).await?;
    progress::soft_delete(&state.db, ownership).await?;
    Ok(dto::done("Progress report deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_urls_accept_json_arrays() {
        assert_eq!(
            split_urls(r#"["https://a/1.jpg","https://a/2.jpg"]"#),
            ["https://a/1.jpg", "https://a/2.jpg"]
        );
        assert_eq!(split_urls(" https://a/1.jpg "), ["https://a/1.jpg"]);
        assert_eq!(split_urls("[not json"), ["[not json"]);
    }
}
