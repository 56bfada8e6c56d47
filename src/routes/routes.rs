//! Defines routes for browsing how-tos and uploading new ones.
//!
//! ## Structure
//! - **Health**
//!   - `GET  /healthz`, `GET /readyz`
//!
//! - **How-tos**
//!   - `GET  /howtos`: list, newest first
//!   - `GET  /howtos/{slug}`: fetch one by slug
//!   - `GET  /slug-check?title=`: derive a slug and report whether it is free
//!
//! - **Uploads**
//!   - `POST /uploads`: reserve an id for a new how-to
//!   - `POST /uploads/{id}`: multipart upload of the how-to form
//!   - `GET  /uploads/{id}/status`: per-phase progress
//!
//! - **Files**
//!   - `GET|HEAD /files/{*path}`: stored cover images, step images and attachments

use crate::{
    handlers::{
        file_handlers::{get_file, head_file},
        health_handlers::{healthz, readyz},
        howto_handlers::{
            check_slug, create_upload_id, get_howto, list_howtos, upload_howto, upload_status,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router. `max_upload_bytes` caps the multipart upload body.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/howtos", get(list_howtos))
        .route("/howtos/{slug}", get(get_howto))
        .route("/slug-check", get(check_slug))
        .route("/uploads", post(create_upload_id))
        .route(
            "/uploads/{id}",
            post(upload_howto).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/uploads/{id}/status", get(upload_status))
        .route("/files/{*path}", get(get_file).head(head_file))
}
