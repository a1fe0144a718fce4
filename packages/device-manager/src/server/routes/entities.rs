//! Generic write handlers, instantiated once per entity kind.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::common::Caller;
use crate::domains::entities::{create_entity, delete_entity, update_entity, Resource};
use crate::server::app::AppState;
use crate::server::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct WriteQuery {
    /// Block until the downstream handlers confirmed the command.
    #[serde(default)]
    pub wait: bool,
}

fn require_caller(caller: Option<Extension<Caller>>) -> Result<Caller, ApiError> {
    caller
        .map(|Extension(caller)| caller)
        .ok_or(ApiError::Unauthorized)
}

fn body<R>(body: Result<Json<R>, JsonRejection>) -> Result<R, ApiError> {
    body.map(|Json(entity)| entity)
        .map_err(|rejection| ApiError::MalformedBody(rejection.body_text()))
}

/// `POST /{resource}`
pub async fn create_handler<R: Resource>(
    State(state): State<AppState>,
    caller: Option<Extension<Caller>>,
    Query(query): Query<WriteQuery>,
    entity: Result<Json<R>, JsonRejection>,
) -> Result<Response, ApiError> {
    let caller = require_caller(caller)?;
    let entity = body(entity)?;

    let result = create_entity(entity, &caller, query.wait, &state.deps).await?;
    let status = if result.completion.is_pending() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(result.entity)).into_response())
}

/// `PUT /{resource}/{id}`
pub async fn update_handler<R: Resource>(
    State(state): State<AppState>,
    caller: Option<Extension<Caller>>,
    Path(id): Path<String>,
    Query(query): Query<WriteQuery>,
    entity: Result<Json<R>, JsonRejection>,
) -> Result<Response, ApiError> {
    let caller = require_caller(caller)?;
    let entity = body(entity)?;

    let result = update_entity(entity, &id, &caller, query.wait, &state.deps).await?;
    let status = if result.completion.is_pending() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result.entity)).into_response())
}

/// `DELETE /{resource}/{id}`
pub async fn delete_handler<R: Resource>(
    State(state): State<AppState>,
    caller: Option<Extension<Caller>>,
    Path(id): Path<String>,
    Query(query): Query<WriteQuery>,
) -> Result<StatusCode, ApiError> {
    let caller = require_caller(caller)?;

    let completion = delete_entity(R::KIND, &id, &caller, query.wait, &state.deps).await?;
    Ok(if completion.is_pending() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::NO_CONTENT
    })
}
