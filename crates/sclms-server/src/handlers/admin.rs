//! `/api/admin/*`: account unlock, password reset, security policy.
//!
//! Every handler takes [`AdminPrincipal`], so non-administrators get 403
//! before any work is done.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use sclms_core::models::account::AccountSummary;
use sclms_core::models::policy::SecurityPolicy;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::gate::AdminPrincipal;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AccountActionResponse {
    pub message: &'static str,
    pub user: AccountSummary,
}

fn account_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound("User not found".into()))
}

pub async fn unlock_account(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
) -> Result<Json<AccountActionResponse>, ApiError> {
    let id = account_id(&id)?;
    let user = state.auth.admin_unlock_account(id).await?;
    info!(admin_id = %admin.account.id, account_id = %id, event = "account.unlocked");
    Ok(Json(AccountActionResponse {
        message: "User account unlocked successfully",
        user,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<AccountActionResponse>, ApiError> {
    let id = account_id(&id)?;
    let Json(body) = payload?;
    let user = state.auth.admin_reset_password(id, &body.new_password).await?;
    info!(admin_id = %admin.account.id, account_id = %id, event = "account.password_reset");
    Ok(Json(AccountActionResponse {
        message: "Password reset successfully. The user must change it at next login.",
        user,
    }))
}

pub async fn get_policy(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
) -> Result<Json<SecurityPolicy>, ApiError> {
    Ok(Json(state.auth.get_policy().await?))
}

pub async fn update_policy(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    payload: Result<Json<SecurityPolicy>, JsonRejection>,
) -> Result<Json<SecurityPolicy>, ApiError> {
    let Json(policy) = payload?;
    let updated = state.auth.update_policy(policy).await?;
    info!(admin_id = %admin.account.id, event = "policy.updated");
    Ok(Json(updated))
}
