//! HTTP handlers for browsing how-tos and running the upload workflow.
//!
//! An upload is two requests: `POST /uploads` reserves an id (its status is
//! observable from then on), `POST /uploads/{id}` sends the multipart form.

use crate::{
    errors::AppError,
    models::{
        file_meta::FileInput,
        howto::{Howto, HowtoFormInput, HowtoValues, slugify},
        upload_status::UploadStatus,
    },
    services::howto_store::HowtoError,
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State, multipart::Field},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Header carrying the owner reference stamped on new how-tos.
pub const USER_HEADER: &str = "x-user-id";
const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Deserialize)]
pub struct SlugCheckQuery {
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SlugCheck {
    pub slug: String,
    pub unique: bool,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratedId {
    pub id: String,
}

/// `GET /howtos`: newest first.
pub async fn list_howtos(State(state): State<AppState>) -> Result<Json<Vec<Howto>>, AppError> {
    Ok(Json(state.howtos.get_doc_list().await?))
}

/// `GET /howtos/{slug}`
pub async fn get_howto(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Howto>, AppError> {
    state
        .howtos
        .get_doc_by_slug(&slug)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("how-to `{}` not found", slug)))
}

/// `GET /slug-check?title=`: a taken slug is reported, not rejected.
pub async fn check_slug(
    State(state): State<AppState>,
    Query(q): Query<SlugCheckQuery>,
) -> Result<Json<SlugCheck>, AppError> {
    let slug = slugify(&q.title);
    match state.howtos.validate_title(&q.title).await {
        Ok(slug) => Ok(Json(SlugCheck {
            slug,
            unique: true,
            message: None,
        })),
        Err(HowtoError::Validation(message)) if !slug.is_empty() => Ok(Json(SlugCheck {
            slug,
            unique: false,
            message: Some(message),
        })),
        Err(err) => Err(err.into()),
    }
}

/// `POST /uploads`
pub async fn create_upload_id(State(state): State<AppState>) -> impl IntoResponse {
    let id = state.howtos.generate_id();
    (StatusCode::CREATED, Json(GeneratedId { id }))
}

/// `GET /uploads/{id}/status`
pub async fn upload_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UploadStatus>, AppError> {
    state
        .howtos
        .upload_status(&id)
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("upload `{}` not found", id)))
}

/// `POST /uploads/{id}`: multipart form with a JSON `values` part, one
/// `cover_image`, any number of `files` and `steps.{n}.images` parts.
pub async fn upload_howto(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    if state.howtos.upload_status(&id).is_none() {
        return Err(AppError::not_found(format!("upload `{}` not found", id)));
    }
    let owner = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string();

    let form = read_submission(&mut multipart).await?.into_form()?;
    state.howtos.is_slug_unique(&form.slug).await?;

    let howto = state.howtos.upload_howto(form, &id, &owner).await?;
    info!(howto_id = %id, slug = %howto.slug, "how-to published");
    Ok((StatusCode::CREATED, Json(howto)))
}

#[derive(Default)]
struct Submission {
    values: Option<HowtoValues>,
    cover_image: Option<FileInput>,
    step_images: BTreeMap<usize, Vec<FileInput>>,
    files: Vec<FileInput>,
}

impl Submission {
    fn into_form(self) -> Result<HowtoFormInput, AppError> {
        let values = self
            .values
            .ok_or_else(|| AppError::bad_request("missing `values` part"))?;
        let cover_image = self
            .cover_image
            .ok_or_else(|| AppError::bad_request("missing `cover_image` part"))?;

        let step_count = values.steps.len();
        let mut step_images = vec![Vec::new(); step_count];
        for (index, images) in self.step_images {
            let slot = step_images.get_mut(index).ok_or_else(|| {
                AppError::bad_request(format!(
                    "images sent for step {} but only {} steps were submitted",
                    index, step_count
                ))
            })?;
            *slot = images;
        }

        Ok(values.into_form(cover_image, step_images, self.files))
    }
}

async fn read_submission(multipart: &mut Multipart) -> Result<Submission, AppError> {
    let mut submission = Submission::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "values" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(err.to_string()))?;
                let values = serde_json::from_str(&text)
                    .map_err(|err| AppError::bad_request(format!("invalid `values`: {}", err)))?;
                submission.values = Some(values);
            }
            "cover_image" => {
                if submission.cover_image.is_some() {
                    return Err(AppError::bad_request("more than one `cover_image` part"));
                }
                submission.cover_image = Some(read_file(field).await?);
            }
            "files" => submission.files.push(read_file(field).await?),
            other => match step_index(other) {
                Some(index) => submission
                    .step_images
                    .entry(index)
                    .or_default()
                    .push(read_file(field).await?),
                None => {
                    return Err(AppError::bad_request(format!(
                        "unexpected form field `{}`",
                        other
                    )));
                }
            },
        }
    }

    Ok(submission)
}

async fn read_file(field: Field<'_>) -> Result<FileInput, AppError> {
    let field_name = field.name().unwrap_or_default().to_string();
    let name = field
        .file_name()
        .map(str::to_string)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::bad_request(format!("`{}` part has no file name", field_name)))?;
    let content_type = field.content_type().map(str::to_string);
    let data = field
        .bytes()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    Ok(FileInput::new(name, content_type, data))
}

/// `steps.{n}.images` -> `n`
fn step_index(field_name: &str) -> Option<usize> {
    field_name
        .strip_prefix("steps.")?
        .strip_suffix(".images")?
        .parse()
        .ok()
}
