//! ABOUTME: Data models for web API with validation and OpenAPI schemas
//! ABOUTME: Defines request/response structures with serde and validation

use std::collections::HashMap;

use au_db::{Aura, FeedItem, FollowUser, Image, ImageWithAura, LeaderboardRow, User};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

/// RFC 7807 problem document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(flatten)]
    pub extensions: HashMap<String, serde_json::Value>,
}

impl ProblemDetails {
    pub fn new(problem_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            problem_type: problem_type.into(),
            title: title.into(),
            status: None,
            detail: None,
            extensions: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_extension(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extensions.insert(key.to_string(), value);
        self
    }

    pub fn validation_error(detail: impl Into<String>) -> Self {
        Self::new(
            "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.1",
            "Bad Request",
        )
        .with_status(400)
        .with_detail(detail)
    }

    pub fn rate_limit_error(retry_after: Option<u64>) -> Self {
        let problem = Self::new(
            "https://datatracker.ietf.org/rfc/rfc6585.html#section-4",
            "Too Many Requests",
        )
        .with_status(429)
        .with_detail("Rate limit exceeded, slow down");

        match retry_after {
            Some(seconds) => problem.with_extension("retry_after", serde_json::json!(seconds)),
            None => problem,
        }
    }
}

/// Problem document as it appears in the OpenAPI schema
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: Option<String>,
}

/// Field-level validation failure listed under the `errors` extension
#[derive(Debug, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub phone: String,
    pub exp: usize,
    pub iat: usize,
}

// ---------------------------------------------------------------------------
// Auth

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct SendOtpRequest {
    #[validate(length(min = 8, max = 24))]
    #[schema(example = "+15551234567")]
    pub phone_number: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendOtpResponse {
    pub message: String,
    /// Seconds until the code expires
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct VerifyOtpRequest {
    #[validate(length(min = 8, max = 24))]
    pub phone_number: String,
    #[validate(length(min = 4, max = 8))]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: UserProfile,
    pub is_new_user: bool,
}

// ---------------------------------------------------------------------------
// Users

/// The caller's own profile, including the phone number
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: String,
    pub phone_number: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            phone_number: user.phone_number,
            username: user.username,
            display_name: user.display_name,
            bio: user.bio,
            avatar_url: user.avatar_url,
            is_verified: user.is_verified,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Another user's profile as seen by the caller
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublicProfile {
    pub id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
    pub follower_count: i64,
    pub following_count: i64,
    pub image_count: i64,
    pub total_aura_score: i64,
    pub is_following: bool,
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    let valid = username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("username_charset")
            .with_message("Use lowercase letters, digits and underscores".into()))
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 3, max = 30), custom(function = validate_username))]
    pub username: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub display_name: Option<String>,
    #[validate(length(max = 160))]
    pub bio: Option<String>,
    #[validate(url)]
    pub avatar_url: Option<String>,
}

impl From<UpdateProfileRequest> for au_db::UpdateProfile {
    fn from(req: UpdateProfileRequest) -> Self {
        Self {
            username: req.username,
            display_name: req.display_name,
            bio: req.bio,
            avatar_url: req.avatar_url,
        }
    }
}

/// Owner summary embedded in feed and leaderboard rows
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Images

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImageResponse {
    pub id: String,
    pub user_id: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub provider: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub original_filename: Option<String>,
    pub created_at: String,
}

impl From<Image> for ImageResponse {
    fn from(image: Image) -> Self {
        Self {
            id: image.id,
            user_id: image.user_id,
            url: image.url,
            thumbnail_url: image.thumbnail_url,
            provider: image.provider,
            content_type: image.content_type,
            size_bytes: image.size_bytes,
            original_filename: image.original_filename,
            created_at: image.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuraResponse {
    pub id: String,
    pub image_id: String,
    pub caption: String,
    pub mood: String,
    /// `#RRGGBB`
    pub color: String,
    /// 0..=100
    pub score: i64,
    pub tags: Vec<String>,
    pub model: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Aura> for AuraResponse {
    fn from(aura: Aura) -> Self {
        Self {
            id: aura.id,
            image_id: aura.image_id,
            caption: aura.caption,
            mood: aura.mood,
            color: aura.color,
            score: aura.score,
            tags: aura.tags.0,
            model: aura.model,
            created_at: aura.created_at,
            updated_at: aura.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImageWithAuraResponse {
    pub image: ImageResponse,
    pub aura: Option<AuraResponse>,
}

impl From<ImageWithAura> for ImageWithAuraResponse {
    fn from(item: ImageWithAura) -> Self {
        Self {
            image: item.image.into(),
            aura: item.aura.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImageDetailResponse {
    pub image: ImageResponse,
    pub aura: Option<AuraResponse>,
    pub like_count: i64,
    pub share_count: i64,
}

/// Multipart body of `POST /api/images`
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// Optional prompt hint, at most 200 characters
    pub hint: Option<String>,
}

// ---------------------------------------------------------------------------
// Social

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FollowResponse {
    pub following: bool,
    pub follower_count: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FollowUserResponse {
    pub id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub followed_at: String,
}

impl From<FollowUser> for FollowUserResponse {
    fn from(user: FollowUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            followed_at: user.followed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LikeResponse {
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShareRequest {
    #[validate(length(min = 1, max = 30))]
    #[schema(example = "instagram")]
    pub platform: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ShareResponse {
    pub share_count: i64,
    pub share_url: String,
}

// ---------------------------------------------------------------------------
// Explore

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FeedItemResponse {
    pub image: ImageResponse,
    pub aura: Option<AuraResponse>,
    pub owner: UserSummary,
    pub like_count: i64,
}

impl From<FeedItem> for FeedItemResponse {
    fn from(item: FeedItem) -> Self {
        let owner = UserSummary {
            id: item.image.user_id.clone(),
            username: item.owner_username,
            display_name: item.owner_display_name,
            avatar_url: item.owner_avatar_url,
        };
        Self {
            image: item.image.into(),
            aura: item.aura.map(Into::into),
            owner,
            like_count: item.like_count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardEntryResponse {
    pub rank: i64,
    pub user: UserSummary,
    pub total_score: i64,
    pub image_count: i64,
    pub like_count: i64,
    pub computed_at: String,
}

impl From<LeaderboardRow> for LeaderboardEntryResponse {
    fn from(row: LeaderboardRow) -> Self {
        Self {
            rank: row.entry.rank,
            user: UserSummary {
                id: row.entry.user_id,
                username: row.username,
                display_name: row.display_name,
                avatar_url: row.avatar_url,
            },
            total_score: row.entry.total_score,
            image_count: row.entry.image_count,
            like_count: row.entry.like_count,
            computed_at: row.entry.computed_at,
        }
    }
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
        }
    }
}

/// `limit` defaults to 20 and is capped at 100
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> au_db::Page {
        au_db::Page::new(self.limit, self.offset)
    }
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Username or display-name prefix
    #[validate(length(min = 1, max = 30), custom(function = validate_search_term))]
    pub q: String,
}

fn validate_search_term(q: &str) -> Result<(), ValidationError> {
    if q.trim().is_empty() {
        Err(ValidationError::new("blank").with_message("Search query must not be blank".into()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_details_serialization() {
        let problem = ProblemDetails::validation_error("bad phone")
            .with_extension("field", serde_json::json!("phone_number"));
        let value = serde_json::to_value(&problem).unwrap();

        assert_eq!(value["type"], "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.1");
        assert_eq!(value["status"], 400);
        assert_eq!(value["detail"], "bad phone");
        assert_eq!(value["field"], "phone_number");
    }

    #[test]
    fn test_update_profile_validation() {
        let ok = UpdateProfileRequest {
            username: Some("aura_fan_01".to_string()),
            bio: Some("Chasing light".to_string()),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let bad_charset = UpdateProfileRequest {
            username: Some("Aura Fan".to_string()),
            ..Default::default()
        };
        assert!(bad_charset.validate().is_err());

        let too_short = UpdateProfileRequest {
            username: Some("ab".to_string()),
            ..Default::default()
        };
        assert!(too_short.validate().is_err());

        let bad_avatar = UpdateProfileRequest {
            avatar_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(bad_avatar.validate().is_err());
    }

    #[test]
    fn test_search_query_rejects_blank() {
        let ok = SearchQuery { q: " ali ".to_string() };
        assert!(ok.validate().is_ok());

        let blank = SearchQuery { q: "   ".to_string() };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_page_query_defaults() {
        let page = PageQuery::default().page();
        assert_eq!(page.limit, 20);
        assert_eq!(page.offset, 0);

        let page = PageQuery {
            limit: Some(500),
            offset: Some(-3),
        }
        .page();
        assert_eq!(page.limit, 100);
        assert_eq!(page.offset, 0);
    }
}
