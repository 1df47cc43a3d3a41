//! Dynamic QR code endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        CleanupResponse, CreateQrCodeRequest, QrCodeResponse, QrImageResponse, ScanQrCodeRequest,
        ScanQrCodeResponse, TransactionResponse, ValidateQrCodeRequest, ValidateQrCodeResponse,
    },
    error::PaymentError,
    AppState,
};

pub async fn create_qr_code(
    State(state): State<AppState>,
    Json(payload): Json<CreateQrCodeRequest>,
) -> Result<(StatusCode, Json<QrCodeResponse>), AppError> {
    payload.validate()?;

    let code = state
        .qr_codes
        .issue(
            payload.merchant_id,
            payload.amount,
            &payload.purpose,
            &payload.description,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(QrCodeResponse::at(code, state.clock.now())),
    ))
}

pub async fn get_qr_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QrCodeResponse>, AppError> {
    let code = state
        .qr_codes
        .find(id)
        .ok_or_else(|| PaymentError::not_found("QR code"))?;
    Ok(Json(QrCodeResponse::at(code, state.clock.now())))
}

pub async fn get_qr_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QrImageResponse>, AppError> {
    let code = state
        .qr_codes
        .find(id)
        .ok_or_else(|| PaymentError::not_found("QR code"))?;
    let image_base64 = state.qr_codes.render_png_base64(id)?;

    Ok(Json(QrImageResponse {
        id,
        qr_data: code.qr_data,
        image_base64,
    }))
}

/// Active codes of one merchant.
pub async fn list_merchant_qr_codes(
    State(state): State<AppState>,
    Path(merchant_id): Path<Uuid>,
) -> Json<Vec<QrCodeResponse>> {
    let now = state.clock.now();
    Json(
        state
            .qr_codes
            .active_for_merchant(merchant_id)
            .into_iter()
            .map(|code| QrCodeResponse::at(code, now))
            .collect(),
    )
}

pub async fn validate_qr_code(
    State(state): State<AppState>,
    Json(payload): Json<ValidateQrCodeRequest>,
) -> Result<Json<ValidateQrCodeResponse>, AppError> {
    payload.validate()?;
    Ok(Json(ValidateQrCodeResponse {
        valid: state.qr_codes.validate(&payload.qr_data),
    }))
}

/// Redeem a code and open the transaction it pays for.
pub async fn scan_qr_code(
    State(state): State<AppState>,
    Json(payload): Json<ScanQrCodeRequest>,
) -> Result<(StatusCode, Json<ScanQrCodeResponse>), AppError> {
    payload.validate()?;

    let transaction = state
        .transactions
        .create_from_scan(&payload.qr_data, payload.scanned_by, payload.amount)
        .await?;
    let code = state
        .qr_codes
        .find_by_data(&payload.qr_data)
        .ok_or_else(|| PaymentError::not_found("QR code"))?;

    Ok((
        StatusCode::CREATED,
        Json(ScanQrCodeResponse {
            qr_code: QrCodeResponse::at(code, state.clock.now()),
            transaction: TransactionResponse::from(transaction),
        }),
    ))
}

pub async fn deactivate_qr_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QrCodeResponse>, AppError> {
    let code = state.qr_codes.deactivate(id)?;
    Ok(Json(QrCodeResponse::at(code, state.clock.now())))
}

pub async fn cleanup_qr_codes(State(state): State<AppState>) -> Json<CleanupResponse> {
    let removed = state.qr_codes.sweep_expired(state.clock.now());
    Json(CleanupResponse { removed })
}
