//! ABOUTME: Image endpoints: upload with aura generation, detail, delete, regenerate
//! ABOUTME: Upload runs the pipeline; only owners may delete or regenerate

use crate::{
    error::{ApiError, ApiResult},
    middleware::auth::AuthUser,
    models::{AuraResponse, ErrorResponse, ImageDetailResponse, ImageWithAuraResponse, UploadForm},
    upload_pipeline::{read_multipart, UploadPipeline},
    AppState,
};
use actix_multipart::Multipart;
use actix_web::{delete, get, post, web, HttpResponse};
use tracing::{info, warn};

/// Upload an image; its aura is generated before it is stored
#[utoipa::path(
    post,
    path = "/api/images",
    tag = "images",
    security(("bearer_auth" = [])),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Image stored with its aura", body = ImageWithAuraResponse),
        (status = 400, description = "Invalid file, AI or storage failure", body = ErrorResponse),
    )
)]
#[post("")]
pub async fn upload_image(
    state: web::Data<AppState>,
    auth: AuthUser,
    payload: Multipart,
) -> ApiResult<HttpResponse> {
    let upload = read_multipart(payload, &state.upload).await?;
    let created = UploadPipeline::new(&state).process(&auth.id, upload).await?;

    Ok(HttpResponse::Created().json(ImageWithAuraResponse::from(created)))
}

/// Image with aura and engagement counts
#[utoipa::path(
    get,
    path = "/api/images/{id}",
    tag = "images",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Image id")),
    responses(
        (status = 200, description = "Image detail", body = ImageDetailResponse),
        (status = 404, description = "Unknown image", body = ErrorResponse),
    )
)]
#[get("/{id}")]
pub async fn get_image(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let found = state
        .db
        .images()
        .find_with_aura(&path)
        .await?
        .ok_or_else(|| ApiError::not_found("Image not found"))?;

    let likes = state.db.likes();
    let shares = state.db.shares();
    let (like_count, share_count) = tokio::try_join!(
        likes.count_for_image(&found.image.id),
        shares.count_for_image(&found.image.id),
    )?;

    Ok(HttpResponse::Ok().json(ImageDetailResponse {
        image: found.image.into(),
        aura: found.aura.map(Into::into),
        like_count,
        share_count,
    }))
}

/// Delete an owned image and its stored object
#[utoipa::path(
    delete,
    path = "/api/images/{id}",
    tag = "images",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Image id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "Unknown image", body = ErrorResponse),
    )
)]
#[delete("/{id}")]
pub async fn delete_image(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let image = state
        .db
        .images()
        .find_by_id(&path)
        .await?
        .ok_or_else(|| ApiError::not_found("Image not found"))?;

    if image.user_id != auth.id {
        return Err(ApiError::forbidden("Only the owner can delete this image"));
    }

    state.db.images().delete(&image.id).await?;
    if let Err(e) = state.store.delete(&image.public_id).await {
        warn!("Failed to remove stored object {}: {}", image.public_id, e);
    }

    info!(image_id = %image.id, "Image deleted");
    Ok(HttpResponse::NoContent().finish())
}

/// Generate a new aura for an owned image
#[utoipa::path(
    post,
    path = "/api/images/{id}/aura",
    tag = "images",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Image id")),
    responses(
        (status = 200, description = "Replacement aura", body = AuraResponse),
        (status = 400, description = "Fetch or AI failure", body = ErrorResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "Unknown image", body = ErrorResponse),
    )
)]
#[post("/{id}/aura")]
pub async fn regenerate_aura(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let aura = UploadPipeline::new(&state)
        .regenerate(&path, &auth.id)
        .await?;

    Ok(HttpResponse::Ok().json(AuraResponse::from(aura)))
}
