//! HTTP handlers for image operations.
//!
//! The caller is identified by the `x-user-id` header; authenticating that
//! header happens in front of this service. Everything else is delegated to
//! [`ImageService`](crate::services::ImageService).

use crate::{
    errors::AppError,
    imaging::codec,
    models::{image::ImageMetadata, transformation::Transformation},
    state::AppState,
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{FromRequestParts, Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Caller identity taken from the `x-user-id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts.headers.get(USER_ID_HEADER).ok_or_else(|| {
            AppError::new(StatusCode::UNAUTHORIZED, "missing x-user-id header")
        })?;
        raw.to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(UserId)
            .ok_or_else(|| AppError::bad_request("x-user-id must be a UUID"))
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    fn resolve(&self) -> (u32, u32) {
        (
            self.page.unwrap_or(1),
            self.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct TransformRequest {
    pub transformations: Vec<Transformation>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImageSummary {
    #[serde(flatten)]
    pub metadata: ImageMetadata,
    /// Base64 of the stored preview object.
    pub preview: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub images: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

/// PUT `/images/{name}?description=` — store the raw request body.
pub async fn upload_image(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(name): Path<String>,
    Query(q): Query<UploadQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let description = q.description.unwrap_or_default();
    let meta = state
        .images
        .upload(user, &name, &description, body)
        .await?;
    Ok((StatusCode::CREATED, Json(meta)))
}

/// GET `/images/{name}` — full-resolution bytes.
pub async fn get_image(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let (meta, bytes) = state.images.get(user, &name).await?;
    Ok(image_response(&meta, bytes))
}

/// GET `/images?page=&limit=` — the caller's images with base64 previews.
pub async fn list_images(
    State(state): State<AppState>,
    UserId(user): UserId,
    Query(q): Query<PageQuery>,
) -> Result<Json<ListResponse<ImageSummary>>, AppError> {
    let (page, limit) = q.resolve();
    let result = state.images.get_all(user, page, limit).await?;
    let images = result
        .items
        .into_iter()
        .map(|entry| ImageSummary {
            metadata: entry.metadata,
            preview: general_purpose::STANDARD.encode(&entry.preview),
        })
        .collect();

    Ok(Json(ListResponse {
        images,
        total: result.total,
        page,
        limit,
    }))
}

/// POST `/images/{name}/transform` — apply a chain, respond with the result.
pub async fn transform_image(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(name): Path<String>,
    payload: Result<Json<TransformRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let (meta, bytes) = state
        .images
        .transform(user, &name, &req.transformations)
        .await?;
    Ok(image_response(&meta, bytes))
}

/// PATCH `/images/{name}` — rename and/or re-describe.
pub async fn update_image(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(name): Path<String>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<ImageMetadata>, AppError> {
    let Json(req) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let meta = state
        .images
        .update_details(
            user,
            &name,
            req.name.as_deref(),
            req.description.as_deref(),
        )
        .await?;
    Ok(Json(meta))
}

/// DELETE `/images/{name}`
pub async fn delete_image(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    state.images.delete(user, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/admin/images?page=&limit=` — metadata for every user's images.
pub async fn admin_list_images(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<ListResponse<ImageMetadata>>, AppError> {
    let (page, limit) = q.resolve();
    let (images, total) = state.images.admin_list_all_images(page, limit).await?;
    Ok(Json(ListResponse {
        images,
        total,
        page,
        limit,
    }))
}

/// DELETE `/admin/images/{id}`
pub async fn admin_delete_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.images.admin_delete_image(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn image_response(meta: &ImageMetadata, bytes: Bytes) -> Response {
    let content_type = image::guess_format(&bytes)
        .map(codec::content_type)
        .unwrap_or("application/octet-stream");
    let mut response = Response::new(Body::from(bytes));
    set_image_headers(response.headers_mut(), meta, content_type);
    response
}

fn set_image_headers(headers: &mut HeaderMap, meta: &ImageMetadata, content_type: &'static str) {
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&meta.id.to_string()) {
        headers.insert(HeaderName::from_static("x-image-id"), value);
    }
    if let Ok(value) = HeaderValue::from_str(&meta.updated_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
