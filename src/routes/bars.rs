use axum::{
    extract::{Path, State},
    http::StatusCode,
    Form, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    models::{
        bar::{encode_collection, parse_submission, BarRecord},
        session::AuthenticatedShop,
    },
    services::{
        editor::{create_draft, Direction, EditError, EditSession},
        ids::UuidGenerator,
        metafields::{BarStore, GatewayError},
        metrics::BAR_SAVES_COUNTER,
        sessions::SessionService,
        status::{evaluate_status, evaluate_status_message, BarStatus, StatusBadge},
    },
    AppState,
};

type ApiError = (StatusCode, Json<Value>);

/// A bar as listed in the admin, with its current status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BarView<'a> {
    #[serde(flatten)]
    pub bar: &'a BarRecord,
    pub status: BarStatus,
    pub status_message: Option<&'static str>,
    pub badge: StatusBadge,
}

impl<'a> BarView<'a> {
    pub fn new(bar: &'a BarRecord, now: DateTime<Utc>) -> Self {
        let status = evaluate_status(bar, now);
        Self {
            bar,
            status,
            status_message: evaluate_status_message(bar),
            badge: status.badge(),
        }
    }
}

pub fn collection_view(session: &EditSession, now: DateTime<Utc>) -> Value {
    let bars: Vec<BarView> = session.bars().iter().map(|bar| BarView::new(bar, now)).collect();
    json!({
        "bars": bars,
        "version": session.version(),
        "dirty": session.is_dirty(),
    })
}

fn error(status: StatusCode, message: impl ToString) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

pub fn gateway_error(e: GatewayError) -> ApiError {
    let status = match e {
        GatewayError::NoSession(_) => StatusCode::UNAUTHORIZED,
        GatewayError::Conflict => StatusCode::CONFLICT,
        GatewayError::Encode(_) | GatewayError::Io(_) | GatewayError::Database(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        GatewayError::Http(_) | GatewayError::Api(_) | GatewayError::Rejected(_) => {
            StatusCode::BAD_GATEWAY
        }
    };
    if status.is_server_error() {
        tracing::error!("bar settings round trip failed: {e}");
    }
    error(status, e)
}

pub fn edit_error(e: EditError) -> ApiError {
    match e {
        EditError::EmptyText => error(StatusCode::UNPROCESSABLE_ENTITY, e),
        EditError::NotFound(_) => error(StatusCode::NOT_FOUND, e),
    }
}

/// Make sure Admin API calls for this shop have an access token.
async fn authorize(state: &AppState, shop: &AuthenticatedShop) -> Result<(), ApiError> {
    SessionService::ensure_offline(&state.db, &state.http, &state.config, &shop.shop, &shop.token)
        .await
        .map_err(|e| {
            tracing::error!("offline session for {} unavailable: {e:#}", shop.shop);
            error(StatusCode::UNAUTHORIZED, "Shop session unavailable, reload the app")
        })
}

async fn open(state: &AppState, shop: &AuthenticatedShop) -> Result<EditSession, ApiError> {
    authorize(state, shop).await?;
    EditSession::open(state.bars.as_ref(), &shop.shop, &UuidGenerator)
        .await
        .map_err(gateway_error)
}

/// Save the session if an edit changed it, then render it.
async fn persist(
    state: &AppState,
    shop: &AuthenticatedShop,
    mut session: EditSession,
) -> Result<Json<Value>, ApiError> {
    if session.is_dirty() {
        match session.save_to(state.bars.as_ref(), &shop.shop).await {
            Ok(()) => BAR_SAVES_COUNTER.with_label_values(&["ok"]).inc(),
            Err(e) => {
                BAR_SAVES_COUNTER.with_label_values(&["error"]).inc();
                return Err(gateway_error(e));
            }
        }
    }
    Ok(Json(collection_view(&session, Utc::now())))
}

/// GET /bars — stored bars in display order, with status
pub async fn list_bars(
    State(state): State<AppState>,
    shop: AuthenticatedShop,
) -> Result<Json<Value>, ApiError> {
    let session = open(&state, &shop).await?;
    Ok(Json(collection_view(&session, Utc::now())))
}

#[derive(Debug, Deserialize)]
pub struct SaveBarsForm {
    /// Whole collection, JSON encoded.
    pub bars: String,
    /// Version returned by the last load; omit for last-write-wins.
    #[serde(default)]
    pub version: Option<String>,
}

/// POST /bars — replace the stored collection ("save all")
pub async fn save_all(
    State(state): State<AppState>,
    shop: AuthenticatedShop,
    Form(form): Form<SaveBarsForm>,
) -> Result<Json<Value>, ApiError> {
    let bars = parse_submission(&form.bars, &UuidGenerator)
        .map_err(|e| error(StatusCode::BAD_REQUEST, e))?;
    let value = encode_collection(&bars).map_err(|e| gateway_error(e.into()))?;
    let expected = form.version.as_deref().filter(|v| !v.is_empty());

    authorize(&state, &shop).await?;
    let version = match state.bars.save(&shop.shop, &value, expected).await {
        Ok(version) => {
            BAR_SAVES_COUNTER.with_label_values(&["ok"]).inc();
            version
        }
        Err(e) => {
            BAR_SAVES_COUNTER.with_label_values(&["error"]).inc();
            return Err(gateway_error(e));
        }
    };

    Ok(Json(json!({ "success": true, "version": version, "count": bars.len() })))
}

/// GET /bars/draft — a blank bar for the editor
pub async fn new_draft(_shop: AuthenticatedShop) -> Json<BarRecord> {
    Json(create_draft(&UuidGenerator, Utc::now()))
}

/// PUT /bars/items — insert or replace one bar
pub async fn upsert_bar(
    State(state): State<AppState>,
    shop: AuthenticatedShop,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let draft = BarRecord::decode(&body, &UuidGenerator);
    if !draft.has_text() {
        return Err(edit_error(EditError::EmptyText));
    }

    let mut session = open(&state, &shop).await?;
    session.upsert_draft(draft, Utc::now()).map_err(edit_error)?;
    persist(&state, &shop, session).await
}

/// DELETE /bars/items/{id} — unknown ids are not an error
pub async fn delete_bar(
    State(state): State<AppState>,
    shop: AuthenticatedShop,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let mut session = open(&state, &shop).await?;
    if !session.remove(&id) {
        tracing::debug!("bar {} not found for {}, saving unchanged", id, shop.shop);
    }
    persist(&state, &shop, session).await
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub direction: Direction,
}

/// POST /bars/items/{index}/move — swap with the neighbour above or below
pub async fn move_bar(
    State(state): State<AppState>,
    shop: AuthenticatedShop,
    Path(index): Path<usize>,
    Json(body): Json<MoveRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut session = open(&state, &shop).await?;
    session.move_bar(index, body.direction);
    persist(&state, &shop, session).await
}
