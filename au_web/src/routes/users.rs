//! ABOUTME: Profile endpoints for the caller and other users
//! ABOUTME: Read, update and delete the own profile; view public profiles and galleries

use crate::{
    error::{ApiError, ApiResult},
    middleware::auth::AuthUser,
    models::{
        ErrorResponse, ImageWithAuraResponse, PageQuery, PublicProfile, UpdateProfileRequest,
        UserProfile,
    },
    AppState,
};
use actix_web::{delete, get, patch, web, HttpResponse};
use au_db::User;
use tracing::{info, warn};
use validator::Validate;

async fn load_user(state: &AppState, id: &str) -> ApiResult<User> {
    state
        .db
        .users()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Own profile", body = UserProfile),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Account no longer exists", body = ErrorResponse),
    )
)]
#[get("/me")]
pub async fn me(state: web::Data<AppState>, auth: AuthUser) -> ApiResult<HttpResponse> {
    let user = load_user(&state, &auth.id).await?;
    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

/// Update profile fields; omitted fields are left unchanged
#[utoipa::path(
    patch,
    path = "/api/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Invalid or empty update", body = ErrorResponse),
        (status = 409, description = "Username taken", body = ErrorResponse),
    )
)]
#[patch("/me")]
pub async fn update_me(
    state: web::Data<AppState>,
    auth: AuthUser,
    payload: web::Json<UpdateProfileRequest>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;

    let user = state
        .db
        .users()
        .update_profile(&auth.id, payload.into_inner().into())
        .await?;

    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

/// Delete the account and everything it owns
#[utoipa::path(
    delete,
    path = "/api/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 404, description = "Account no longer exists", body = ErrorResponse),
    )
)]
#[delete("/me")]
pub async fn delete_me(state: web::Data<AppState>, auth: AuthUser) -> ApiResult<HttpResponse> {
    let public_ids = state.db.images().public_ids_for_user(&auth.id).await?;
    state.db.users().delete(&auth.id).await?;

    for public_id in &public_ids {
        if let Err(e) = state.store.delete(public_id).await {
            warn!("Failed to remove stored object {}: {}", public_id, e);
        }
    }

    info!(user_id = %auth.id, images = public_ids.len(), "Account deleted");
    Ok(HttpResponse::NoContent().finish())
}

/// Public profile with social counters
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Profile", body = PublicProfile),
        (status = 404, description = "Unknown user", body = ErrorResponse),
    )
)]
#[get("/{id}")]
pub async fn get_user(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user = load_user(&state, &path).await?;

    let users = state.db.users();
    let follows = state.db.follows();
    let (stats, is_following) = tokio::try_join!(
        users.profile_stats(&user.id),
        follows.is_following(&auth.id, &user.id),
    )?;

    Ok(HttpResponse::Ok().json(PublicProfile {
        id: user.id,
        username: user.username,
        display_name: user.display_name,
        bio: user.bio,
        avatar_url: user.avatar_url,
        created_at: user.created_at,
        follower_count: stats.follower_count,
        following_count: stats.following_count,
        image_count: stats.image_count,
        total_aura_score: stats.total_aura_score,
        is_following,
    }))
}

/// A user's images, newest first
#[utoipa::path(
    get,
    path = "/api/users/{id}/images",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User id"), PageQuery),
    responses(
        (status = 200, description = "Images with auras", body = [ImageWithAuraResponse]),
        (status = 404, description = "Unknown user", body = ErrorResponse),
    )
)]
#[get("/{id}/images")]
pub async fn user_images(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    let user = load_user(&state, &path).await?;
    let images = state.db.images().list_by_user(&user.id, query.page()).await?;

    Ok(HttpResponse::Ok().json(
        images
            .into_iter()
            .map(ImageWithAuraResponse::from)
            .collect::<Vec<_>>(),
    ))
}
