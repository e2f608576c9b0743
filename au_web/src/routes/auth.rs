//! ABOUTME: Phone authentication endpoints
//! ABOUTME: Sends one-time codes by SMS and exchanges them for access tokens

use crate::{
    error::ApiResult,
    models::{AuthResponse, ErrorResponse, SendOtpRequest, SendOtpResponse, VerifyOtpRequest},
    otp_service::OtpService,
    AppState,
};
use actix_web::{post, web, HttpResponse};
use validator::Validate;

/// Send a verification code to a phone number
#[utoipa::path(
    post,
    path = "/api/auth/otp/send",
    tag = "auth",
    request_body = SendOtpRequest,
    responses(
        (status = 200, description = "Code sent", body = SendOtpResponse),
        (status = 400, description = "Invalid phone number or SMS failure", body = ErrorResponse),
        (status = 409, description = "A code was sent too recently", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
    )
)]
#[post("/otp/send")]
pub async fn send_otp(
    state: web::Data<AppState>,
    payload: web::Json<SendOtpRequest>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;

    let issued = OtpService::new(&state).send(&payload.phone_number).await?;

    Ok(HttpResponse::Ok().json(SendOtpResponse {
        message: format!("Verification code sent to {}", issued.phone_number),
        expires_in: issued.expires_in,
    }))
}

/// Verify a code and receive a bearer token
#[utoipa::path(
    post,
    path = "/api/auth/otp/verify",
    tag = "auth",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Verified", body = AuthResponse),
        (status = 400, description = "Expired code or too many attempts", body = ErrorResponse),
        (status = 401, description = "Wrong code", body = ErrorResponse),
        (status = 404, description = "No pending code", body = ErrorResponse),
    )
)]
#[post("/otp/verify")]
pub async fn verify_otp(
    state: web::Data<AppState>,
    payload: web::Json<VerifyOtpRequest>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;

    let verified = OtpService::new(&state)
        .verify(&payload.phone_number, &payload.code)
        .await?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token: verified.access_token,
        token_type: "Bearer".to_string(),
        expires_in: verified.expires_in,
        user: verified.user.into(),
        is_new_user: verified.is_new_user,
    }))
}
