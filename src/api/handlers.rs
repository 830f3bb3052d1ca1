//! Request handlers.

use super::{
    error::ApiError,
    query::{parse_task_filter, wants_completion},
};
use crate::task::{
    domain::{NewTask, NewTaskStatus, Task, TaskBehavior, TaskId},
    ports::TaskStore,
    services::TaskService,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

pub(super) async fn greeting() -> &'static str {
    "Hello from async-tasks.\n"
}

pub(super) async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("no endpoint found at {}", uri.path()))
}

pub(super) async fn get_task<S: TaskStore>(
    State(service): State<TaskService<S>>,
    Path(raw_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let id = parse_id(&raw_id)?;
    Ok(Json(service.get_task(id).await?))
}

pub(super) async fn delete_task<S: TaskStore>(
    State(service): State<TaskService<S>>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&raw_id)?;
    service.delete_task(id).await?;
    Ok(StatusCode::OK)
}

pub(super) async fn list_tasks<S: TaskStore>(
    State(service): State<TaskService<S>>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<Task>>, ApiError> {
    let filter = parse_task_filter(query.as_deref())
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    Ok(Json(service.list_tasks(filter).await?))
}

pub(super) async fn create_task<S: TaskStore>(
    State(service): State<TaskService<S>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let task: NewTask = parse_body(&body)?;
    let id = service.create_task(task).await?;
    Ok(created(id))
}

pub(super) async fn add_status<S: TaskStore>(
    State(service): State<TaskService<S>>,
    Path(raw_id): Path<String>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Response, ApiError> {
    let id = parse_id(&raw_id)?;
    let status: NewTaskStatus = parse_body(&body)?;
    service
        .add_status(id, status, wants_completion(query.as_deref()))
        .await?;
    Ok(created(id))
}

pub(super) async fn add_behavior<S: TaskStore>(
    State(service): State<TaskService<S>>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let id = parse_id(&raw_id)?;
    let behavior: TaskBehavior = parse_body(&body)?;
    service.add_behavior(id, behavior).await?;
    Ok(created(id))
}

fn parse_id(raw: &str) -> Result<TaskId, ApiError> {
    uuid::Uuid::parse_str(raw)
        .map(TaskId::from_uuid)
        .map_err(|_| ApiError::not_found(format!("no task with id '{raw}'")))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
}

fn created(id: TaskId) -> Response {
    let location = [(header::LOCATION, format!("/tasks/{id}"))];
    (StatusCode::CREATED, location).into_response()
}
