use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{dtos::WalletResponse, AppState};

pub async fn get_wallet(
    State(state): State<AppState>,
    Path(merchant_id): Path<Uuid>,
) -> Json<WalletResponse> {
    Json(WalletResponse {
        merchant_id,
        balance: state.wallet.balance(merchant_id),
        entries: state.wallet.entries(merchant_id),
    })
}
