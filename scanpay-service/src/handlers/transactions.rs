//! Transaction endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        CreateTransactionRequest, ProcessPaymentRequest, RefundRequest, TransactionListQuery,
        TransactionResponse,
    },
    error::PaymentError,
    models::{OtpPurpose, TransactionStatus},
    AppState,
};

pub async fn create_transaction(
    State(state): State<AppState>,
    Json(payload): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    payload.validate()?;

    let transaction = state
        .transactions
        .create(
            payload.merchant_id,
            payload.amount,
            payload.currency.as_deref(),
            &payload.description,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TransactionResponse::from(transaction)),
    ))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, AppError> {
    let transaction = state
        .transactions
        .find(id)
        .ok_or_else(|| PaymentError::not_found("Transaction"))?;
    Ok(Json(TransactionResponse::from(transaction)))
}

pub async fn get_transaction_by_reference(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<TransactionResponse>, AppError> {
    let transaction = state
        .transactions
        .find_by_reference(&reference)
        .ok_or_else(|| PaymentError::not_found("Transaction"))?;
    Ok(Json(TransactionResponse::from(transaction)))
}

/// Merchant history, newest first, optionally narrowed by `?status=`.
pub async fn list_merchant_transactions(
    State(state): State<AppState>,
    Path(merchant_id): Path<Uuid>,
    Query(query): Query<TransactionListQuery>,
) -> Json<Vec<TransactionResponse>> {
    Json(
        state
            .transactions
            .list_for_merchant(merchant_id)
            .into_iter()
            .filter(|t| query.status.map_or(true, |status| t.status == status))
            .map(TransactionResponse::from)
            .collect(),
    )
}

/// Verify the customer's payment code, then authorize and settle.
/// A rejected code never reaches the gateway, and a request that cannot
/// settle is refused before the code is spent.
pub async fn process_payment(
    State(state): State<AppState>,
    Json(payload): Json<ProcessPaymentRequest>,
) -> Result<Json<TransactionResponse>, AppError> {
    payload.validate()?;

    let pending = state
        .transactions
        .find_by_reference(&payload.reference)
        .ok_or_else(|| PaymentError::not_found("Transaction"))?;
    if pending.status != TransactionStatus::Pending {
        return Err(PaymentError::InvalidState(format!(
            "Transaction is {}, only PENDING transactions can be paid",
            pending.status
        ))
        .into());
    }

    if !state
        .otp
        .verify(payload.customer_id, &payload.otp_code, OtpPurpose::Payment)
    {
        return Err(PaymentError::VerificationFailed.into());
    }

    let transaction = state
        .transactions
        .authorize_and_settle(
            &payload.reference,
            payload.customer_id,
            &payload.payment_method,
        )
        .await?;

    Ok(Json(TransactionResponse::from(transaction)))
}

pub async fn refund_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RefundRequest>,
) -> Result<Json<TransactionResponse>, AppError> {
    let transaction = state.transactions.refund(id, payload.amount).await?;
    Ok(Json(TransactionResponse::from(transaction)))
}
