use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::auth::extractors::AuthUser;
use crate::error::ApiError;
use crate::payments::dto::{CreatePaymentRequest, ListPaymentsQuery, PaymentPage, StatsSnapshot};
use crate::payments::repo::Payment;
use crate::payments::service;
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/payments", post(create_payment).get(list_payments))
        .route("/payments/stats", get(get_stats))
        .route("/payments/export/csv", get(export_csv))
        .route("/payments/:id", get(get_payment))
}

#[instrument(skip(state, payload))]
pub async fn create_payment(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    let payment = service::create(&state, payload, claims.sub).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

#[instrument(skip(state, query))]
pub async fn list_payments(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<PaymentPage>, ApiError> {
    let page = service::list(&state, &query, &claims).await?;
    Ok(Json(page))
}

#[instrument(skip(state))]
pub async fn get_stats(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<StatsSnapshot>, ApiError> {
    let snapshot = service::stats(&state, &claims).await?;
    Ok(Json(snapshot))
}

#[instrument(skip(state, query))]
pub async fn export_csv(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let body = service::export_csv(&state, &query, &claims).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"transactions.csv\"",
            ),
        ],
        body,
    ))
}

#[instrument(skip(state))]
pub async fn get_payment(
    State(state): State<AppState>,
    AuthUser(_claims): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, ApiError> {
    let payment = service::get_by_id(&state, id).await?;
    Ok(Json(payment))
}
