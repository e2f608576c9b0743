//! ABOUTME: One-time passcode issuance and verification over SMS
//! ABOUTME: Enforces resend cooldown, expiry and attempt limits before issuing tokens

use crate::auth::{normalize_phone, JwtAuth, OtpCodes};
use crate::AppState;
use au_core::{unix_now, Error, Result};
use au_db::{NewOtp, User};
use au_notify::SmsMessage;
use tracing::{info, instrument, warn};

/// Result of a successful send
#[derive(Debug)]
pub struct OtpIssued {
    pub phone_number: String,
    pub expires_in: i64,
}

/// Result of a successful verification
#[derive(Debug)]
pub struct OtpVerified {
    pub user: User,
    pub is_new_user: bool,
    pub access_token: String,
    pub expires_in: u64,
}

/// Text of the verification SMS; the lifetime is rounded up to whole minutes
fn sms_text(code: &str, ttl_seconds: i64) -> String {
    let minutes = ((ttl_seconds + 59) / 60).max(1);
    format!(
        "Your Aura verification code is {}. It expires in {} minutes.",
        code, minutes
    )
}

pub struct OtpService<'a> {
    state: &'a AppState,
}

impl<'a> OtpService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    fn sms_body(&self, code: &str) -> String {
        sms_text(code, self.state.otp.ttl_seconds)
    }

    /// Issue a fresh code and text it to the phone
    #[instrument(skip(self))]
    pub async fn send(&self, raw_phone: &str) -> Result<OtpIssued> {
        let phone = normalize_phone(raw_phone)?;
        let config = &self.state.otp;
        let otps = self.state.db.otps();
        let now = unix_now();

        if let Some(pending) = otps.latest_for_phone(&phone).await? {
            let elapsed = now - pending.created_at;
            if !pending.is_expired(now) && elapsed < config.resend_cooldown_seconds {
                return Err(Error::Conflict(format!(
                    "A code was sent recently; retry in {} seconds",
                    config.resend_cooldown_seconds - elapsed
                )));
            }
        }

        let code = OtpCodes::generate(config.code_length);
        let otp = otps
            .replace_for_phone(NewOtp {
                phone_number: phone.clone(),
                code_hash: OtpCodes::hash(&code)?,
                expires_at: now + config.ttl_seconds,
                created_at: now,
            })
            .await?;

        let message = SmsMessage::new(&phone, self.sms_body(&code));
        if let Err(e) = self.state.sms.send(&message).await {
            warn!(sender = self.state.sms.name(), "Failed to deliver code: {}", e);
            if let Err(cleanup) = otps.delete(&otp.id).await {
                warn!("Failed to remove undelivered code: {}", cleanup);
            }
            return Err(e.into());
        }

        self.state.metrics.inc_otp_sent();
        info!(sender = self.state.sms.name(), "Verification code sent");

        Ok(OtpIssued {
            phone_number: phone,
            expires_in: config.ttl_seconds,
        })
    }

    /// Check a code; on success the user is created or marked verified
    #[instrument(skip(self, code))]
    pub async fn verify(&self, raw_phone: &str, code: &str) -> Result<OtpVerified> {
        let phone = normalize_phone(raw_phone)?;
        let otps = self.state.db.otps();

        let pending = otps
            .latest_for_phone(&phone)
            .await?
            .ok_or_else(|| Error::NotFound("No pending code for this phone number".to_string()))?;

        if pending.is_expired(unix_now()) {
            otps.delete(&pending.id).await?;
            self.state.metrics.inc_otp_failed();
            return Err(Error::Validation(
                "Code has expired; request a new one".to_string(),
            ));
        }

        if pending.attempts >= self.state.otp.max_attempts {
            otps.delete(&pending.id).await?;
            self.state.metrics.inc_otp_failed();
            return Err(Error::Validation(
                "Too many attempts; request a new code".to_string(),
            ));
        }

        if !OtpCodes::verify(code.trim(), &pending.code_hash)? {
            let attempts = otps.increment_attempts(&pending.id).await?;
            self.state.metrics.inc_otp_failed();
            warn!(attempts, "Incorrect verification code");
            return Err(Error::Unauthorized("Invalid verification code".to_string()));
        }

        otps.delete(&pending.id).await?;
        let (user, is_new_user) = self.state.db.users().find_or_create_verified(&phone).await?;

        let security = &self.state.security;
        let access_token = JwtAuth::create_token(
            &user.id,
            &user.phone_number,
            &security.jwt_secret,
            security.token_ttl_seconds,
        )?;

        self.state.metrics.inc_otp_verified();
        info!(user_id = %user.id, is_new_user, "Phone number verified");

        Ok(OtpVerified {
            user,
            is_new_user,
            access_token,
            expires_in: security.token_ttl_seconds,
        })
    }
}
