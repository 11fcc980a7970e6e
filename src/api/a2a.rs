//! A2A task endpoints

use super::server::AppState;
use super::streaming::stream_task;
use crate::a2a::MESSAGE_STREAM_PATH;
use crate::error::{Result, ShakerError};
use crate::types::{SendMessageRequest, SendMessageResponse, Task, TaskFilter, TaskListResponse, TaskStatus};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::debug;

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

/// `POST /a2a/v1/message`
///
/// Answers 202 with the pending task, or switches to SSE when the client
/// accepts `text/event-stream`.
pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload?;

    if wants_event_stream(&headers) {
        return stream_task(&state, request).await;
    }

    let task = state.manager.create_task(request).await?;
    Ok((StatusCode::ACCEPTED, Json(SendMessageResponse::from(&task))).into_response())
}

/// `POST /a2a/v1/message/stream`, path-segment alias of `message:stream`
pub async fn stream_message(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload?;
    stream_task(&state, request).await
}

/// Router fallback
///
/// `POST /a2a/v1/message:stream` cannot be registered as a route because the
/// router reads `:` as a parameter marker, so it is matched here. Anything
/// else is a 404.
pub async fn operation_fallback(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    payload: std::result::Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Response> {
    if uri.path() != MESSAGE_STREAM_PATH {
        return Err(ShakerError::NotFound(format!("no route for {}", uri.path())));
    }
    if method != Method::POST {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }

    let Json(request) = payload?;
    stream_task(&state, request).await
}

/// `GET /a2a/v1/tasks/{id}`
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>> {
    Ok(Json(state.manager.get_task(&task_id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    status: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

/// `GET /a2a/v1/tasks?status&limit&offset`
///
/// Unparseable or non-positive numbers fall back to the defaults. An unknown
/// status matches no task.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<TaskListResponse>> {
    let limit = query
        .limit
        .as_deref()
        .and_then(|raw| raw.parse::<usize>().ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(state.default_list_limit);
    let offset = query
        .offset
        .as_deref()
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(0);

    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<TaskStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                debug!("Unknown status filter '{}'", raw);
                return Ok(Json(TaskListResponse {
                    tasks: Vec::new(),
                    total_count: 0,
                }));
            }
        },
    };

    let tasks = state
        .manager
        .list_tasks(&TaskFilter {
            status,
            limit,
            offset,
        })
        .await?;

    Ok(Json(TaskListResponse {
        total_count: tasks.len(),
        tasks,
    }))
}

/// `DELETE /a2a/v1/tasks/{id}`: cancel
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<StatusCode> {
    state.manager.cancel_task(&task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
