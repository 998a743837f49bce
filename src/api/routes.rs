//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::domain::UserView;
use crate::error::{AppError, AppResult};
use crate::ledger::{PurchaseCommand, TransferCommand};

use super::middleware::{auth_middleware, RequestUser};
use super::AppState;

const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=50;
const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 6..=50;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCoinRequest {
    pub to_user: String,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub quantity: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedCoins {
    pub from_user: String,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SentCoins {
    pub to_user: String,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoinHistory {
    pub received: Vec<ReceivedCoins>,
    pub sent: Vec<SentCoins>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub coins: i64,
    pub inventory: Vec<InventoryItem>,
    pub coin_history: CoinHistory,
}

impl From<UserView> for InfoResponse {
    fn from(view: UserView) -> Self {
        Self {
            coins: view.balance.value(),
            inventory: view
                .inventory
                .into_iter()
                .map(|item| InventoryItem {
                    item_type: item.name,
                    quantity: item.quantity,
                })
                .collect(),
            coin_history: CoinHistory {
                received: view
                    .received
                    .into_iter()
                    .map(|entry| ReceivedCoins {
                        from_user: entry.counterparty,
                        amount: entry.amount,
                    })
                    .collect(),
                sent: view
                    .sent
                    .into_iter()
                    .map(|entry| SentCoins {
                        to_user: entry.counterparty,
                        amount: entry.amount,
                    })
                    .collect(),
            },
        }
    }
}

// =========================================================================
// API Router
// =========================================================================

/// Create the `/api` router; everything except `/auth` requires a bearer token
pub fn create_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/info", get(info))
        .route("/sendCoin", post(send_coin))
        .route("/buy/:item", get(buy))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new().route("/auth", post(auth)).merge(protected)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))
}

// =========================================================================
// POST /api/auth
// =========================================================================

/// Log in, registering the username on first use
async fn auth(
    State(state): State<AppState>,
    payload: Result<Json<AuthRequest>, JsonRejection>,
) -> AppResult<Json<AuthResponse>> {
    let request = json_body(payload)?;

    if !USERNAME_LEN.contains(&request.username.chars().count()) {
        return Err(AppError::InvalidRequest(
            "username must be 3 to 50 characters".to_string(),
        ));
    }
    if !PASSWORD_LEN.contains(&request.password.chars().count()) {
        return Err(AppError::InvalidRequest(
            "password must be 6 to 50 characters".to_string(),
        ));
    }

    let token = state.auth.login(&request.username, &request.password).await?;

    Ok(Json(AuthResponse { token }))
}

// =========================================================================
// GET /api/info
// =========================================================================

/// Balance, inventory and coin history of the caller
async fn info(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
) -> AppResult<Json<InfoResponse>> {
    let view = state.history.user_view(user.account_id).await?;
    Ok(Json(view.into()))
}

// =========================================================================
// POST /api/sendCoin
// =========================================================================

async fn send_coin(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    payload: Result<Json<SendCoinRequest>, JsonRejection>,
) -> AppResult<StatusCode> {
    let request = json_body(payload)?;

    if request.to_user.trim().is_empty() {
        return Err(AppError::InvalidRequest("toUser is required".to_string()));
    }

    state
        .engine
        .transfer(TransferCommand::new(
            user.account_id,
            request.to_user,
            request.amount,
        ))
        .await?;

    Ok(StatusCode::OK)
}

// =========================================================================
// GET /api/buy/:item
// =========================================================================

async fn buy(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Path(item): Path<String>,
) -> AppResult<StatusCode> {
    state
        .engine
        .purchase(PurchaseCommand::new(user.account_id, item))
        .await?;

    Ok(StatusCode::OK)
}
