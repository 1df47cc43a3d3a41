//! One-time passcode endpoints. Responses never include the code.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{CleanupResponse, OtpResponse, SendOtpRequest, VerifyOtpRequest, VerifyOtpResponse},
    error::PaymentError,
    AppState,
};

pub async fn send_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendOtpRequest>,
) -> Result<(StatusCode, Json<OtpResponse>), AppError> {
    let otp = state
        .otp
        .issue(payload.subject_id, payload.purpose, payload.channel)
        .await?;

    Ok((StatusCode::CREATED, Json(OtpResponse::from(otp))))
}

/// Every failure reason yields the same 401 body.
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<VerifyOtpResponse>, AppError> {
    payload.validate()?;

    if !state
        .otp
        .verify(payload.subject_id, &payload.code, payload.purpose)
    {
        return Err(PaymentError::VerificationFailed.into());
    }

    Ok(Json(VerifyOtpResponse { verified: true }))
}

pub async fn resend_otp(
    State(state): State<AppState>,
    Path(otp_id): Path<Uuid>,
) -> Result<Json<OtpResponse>, AppError> {
    let otp = state.otp.resend(otp_id).await?;
    Ok(Json(OtpResponse::from(otp)))
}

pub async fn cleanup_otps(State(state): State<AppState>) -> Json<CleanupResponse> {
    let removed = state.otp.sweep(state.clock.now());
    Json(CleanupResponse { removed })
}
