//! ABOUTME: Discovery endpoints: global feed, leaderboard and user search

use crate::{
    error::ApiResult,
    models::{
        ErrorResponse, FeedItemResponse, LeaderboardEntryResponse, PageQuery, SearchQuery,
        UserSummary,
    },
    AppState,
};
use actix_web::{get, web, HttpResponse};
use tracing::info;
use validator::Validate;

const SEARCH_LIMIT: i64 = 20;

/// Recent images from everyone, newest first
#[utoipa::path(
    get,
    path = "/api/explore/feed",
    tag = "explore",
    params(PageQuery),
    responses((status = 200, description = "Feed page", body = [FeedItemResponse]))
)]
#[get("/feed")]
pub async fn feed(
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    let items = state.db.images().feed(query.page()).await?;

    Ok(HttpResponse::Ok().json(
        items
            .into_iter()
            .map(FeedItemResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Ranked users; computed on demand when nothing is stored yet
#[utoipa::path(
    get,
    path = "/api/explore/leaderboard",
    tag = "explore",
    params(PageQuery),
    responses((status = 200, description = "Leaderboard page", body = [LeaderboardEntryResponse]))
)]
#[get("/leaderboard")]
pub async fn leaderboard(
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    let board = state.db.leaderboard();
    if board.count().await? == 0 {
        let ranked = board.recompute().await?;
        state.metrics.inc_leaderboard_refresh();
        info!(ranked, "Leaderboard computed on first read");
    }

    let rows = board.list(query.page()).await?;
    Ok(HttpResponse::Ok().json(
        rows.into_iter()
            .map(LeaderboardEntryResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Prefix search over usernames and display names
#[utoipa::path(
    get,
    path = "/api/explore/users",
    tag = "explore",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching users", body = [UserSummary]),
        (status = 400, description = "Query missing or too long", body = ErrorResponse),
    )
)]
#[get("/users")]
pub async fn search_users(
    state: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> ApiResult<HttpResponse> {
    query.validate()?;

    let users = state.db.users().search(query.q.trim(), SEARCH_LIMIT).await?;
    Ok(HttpResponse::Ok().json(
        users
            .into_iter()
            .map(UserSummary::from)
            .collect::<Vec<_>>(),
    ))
}
