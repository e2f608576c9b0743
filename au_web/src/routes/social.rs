//! ABOUTME: Social graph endpoints: follow, like and share
//! ABOUTME: Follow and like toggle; shares are append-only records

use crate::{
    error::{ApiError, ApiResult},
    middleware::auth::AuthUser,
    models::{
        ErrorResponse, FollowResponse, FollowUserResponse, LikeResponse, PageQuery, ShareRequest,
        ShareResponse,
    },
    AppState,
};
use actix_web::{get, post, web, HttpResponse};
use validator::Validate;

async fn ensure_user(state: &AppState, id: &str) -> ApiResult<()> {
    match state.db.users().find_by_id(id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found("User not found")),
    }
}

/// Follow a user, or unfollow if already following
#[utoipa::path(
    post,
    path = "/api/social/follow/{user_id}",
    tag = "social",
    security(("bearer_auth" = [])),
    params(("user_id" = String, Path, description = "User to follow")),
    responses(
        (status = 200, description = "New follow state", body = FollowResponse),
        (status = 400, description = "Cannot follow yourself", body = ErrorResponse),
        (status = 404, description = "Unknown user", body = ErrorResponse),
    )
)]
#[post("/follow/{user_id}")]
pub async fn toggle_follow(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let following = state.db.follows().toggle(&auth.id, &path).await?;
    let follower_count = state.db.follows().follower_count(&path).await?;

    Ok(HttpResponse::Ok().json(FollowResponse {
        following,
        follower_count,
    }))
}

/// Users following `user_id`
#[utoipa::path(
    get,
    path = "/api/social/{user_id}/followers",
    tag = "social",
    security(("bearer_auth" = [])),
    params(("user_id" = String, Path, description = "User id"), PageQuery),
    responses(
        (status = 200, description = "Followers, newest first", body = [FollowUserResponse]),
        (status = 404, description = "Unknown user", body = ErrorResponse),
    )
)]
#[get("/{user_id}/followers")]
pub async fn list_followers(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    ensure_user(&state, &path).await?;
    let users = state.db.follows().followers(&path, query.page()).await?;

    Ok(HttpResponse::Ok().json(
        users
            .into_iter()
            .map(FollowUserResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Users that `user_id` follows
#[utoipa::path(
    get,
    path = "/api/social/{user_id}/following",
    tag = "social",
    security(("bearer_auth" = [])),
    params(("user_id" = String, Path, description = "User id"), PageQuery),
    responses(
        (status = 200, description = "Followed users, newest first", body = [FollowUserResponse]),
        (status = 404, description = "Unknown user", body = ErrorResponse),
    )
)]
#[get("/{user_id}/following")]
pub async fn list_following(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    ensure_user(&state, &path).await?;
    let users = state.db.follows().following(&path, query.page()).await?;

    Ok(HttpResponse::Ok().json(
        users
            .into_iter()
            .map(FollowUserResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Like an image, or remove the like
#[utoipa::path(
    post,
    path = "/api/social/like/{image_id}",
    tag = "social",
    security(("bearer_auth" = [])),
    params(("image_id" = String, Path, description = "Image id")),
    responses(
        (status = 200, description = "New like state", body = LikeResponse),
        (status = 404, description = "Unknown image", body = ErrorResponse),
    )
)]
#[post("/like/{image_id}")]
pub async fn toggle_like(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let liked = state.db.likes().toggle(&auth.id, &path).await?;
    let like_count = state.db.likes().count_for_image(&path).await?;

    Ok(HttpResponse::Ok().json(LikeResponse { liked, like_count }))
}

/// Record a share of an image
#[utoipa::path(
    post,
    path = "/api/social/share/{image_id}",
    tag = "social",
    security(("bearer_auth" = [])),
    params(("image_id" = String, Path, description = "Image id")),
    request_body(content = Option<ShareRequest>),
    responses(
        (status = 200, description = "Share recorded", body = ShareResponse),
        (status = 400, description = "Malformed body", body = ErrorResponse),
        (status = 404, description = "Unknown image", body = ErrorResponse),
    )
)]
#[post("/share/{image_id}")]
pub async fn share_image(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    body: web::Bytes,
) -> ApiResult<HttpResponse> {
    // An empty body means no platform; anything else must be a valid ShareRequest
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ShareRequest::default()
    } else {
        serde_json::from_slice::<ShareRequest>(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid share body: {}", e)))?
    };
    request.validate()?;

    let share = state
        .db
        .shares()
        .create(&auth.id, &path, request.platform.as_deref())
        .await?;
    let share_count = state.db.shares().count_for_image(&share.image_id).await?;

    Ok(HttpResponse::Ok().json(ShareResponse {
        share_count,
        share_url: format!(
            "{}/api/images/{}",
            state.public_base_url.trim_end_matches('/'),
            share.image_id
        ),
    }))
}
