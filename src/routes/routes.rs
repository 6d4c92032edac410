//! Route table.
//!
//! - **Probes**
//!   - `GET    /healthz`, `GET /readyz`
//!
//! - **Caller's images** (identity from `x-user-id`)
//!   - `GET    /images` — list with previews (`?page=&limit=`)
//!   - `PUT    /images/{name}` — upload raw body (`?description=`)
//!   - `GET    /images/{name}` — full-resolution bytes
//!   - `PATCH  /images/{name}` — rename / re-describe
//!   - `DELETE /images/{name}` — delete image and preview
//!   - `POST   /images/{name}/transform` — apply a transformation chain
//!
//! - **Admin**
//!   - `GET    /admin/images`, `DELETE /admin/images/{id}`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        image_handlers::{
            admin_delete_image, admin_list_images, delete_image, get_image, list_images,
            transform_image, update_image, upload_image,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};

/// Slack on top of the image limit so the service, not the body limit,
/// reports slightly oversized uploads.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Build the router. `max_image_size` bounds request bodies.
pub fn routes(max_image_size: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/images", get(list_images))
        .route(
            "/images/{name}",
            put(upload_image)
                .get(get_image)
                .patch(update_image)
                .delete(delete_image),
        )
        .route("/images/{name}/transform", post(transform_image))
        .route("/admin/images", get(admin_list_images))
        .route("/admin/images/{id}", delete(admin_delete_image))
        .layer(DefaultBodyLimit::max(
            max_image_size.saturating_add(BODY_LIMIT_SLACK),
        ))
}
