use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use utoipa::ToSchema;

use super::threads::{can_moderate, visible_to};
use super::{client_ip, AppState};
use crate::auth::Auth;
use crate::error::{ApiError, FieldErrors};
use crate::models::*;
use crate::repo::RepoError;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateAnswerRequest {
    pub content: Option<String>,
    pub thread_id: Option<Id>,
}

#[utoipa::path(
    get,
    path = "/api/v1/threads/{id}/answers",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Answers, oldest first", body = [Answer]),
        (status = 404, description = "Thread not found or not visible")
    )
)]
pub async fn list_answers(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let thread = data.repo.get_thread(path.into_inner()).await?;
    if !visible_to(&data, auth.as_ref(), &thread).await? {
        return Err(ApiError::NotFound);
    }
    let answers = data.repo.list_answers(thread.id).await?;
    Ok(HttpResponse::Ok().json(answers))
}

#[utoipa::path(
    post,
    path = "/api/v1/answers",
    request_body = CreateAnswerRequest,
    responses(
        (status = 201, description = "Answer created", body = Answer),
        (status = 401, description = "Unauthenticated"),
        (status = 422, description = "Blank content or unknown thread"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_answer(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreateAnswerRequest>,
) -> Result<HttpResponse, ApiError> {
    if !data.limiter.allow_answer(&client_ip(&req)) {
        return Err(ApiError::TooManyRequests);
    }
    let payload = payload.into_inner();
    let mut errors = FieldErrors::default();
    let content = errors.required("content", payload.content);
    let thread = match payload.thread_id {
        Some(id) => {
            let thread = match data.repo.get_thread(id).await {
                Ok(thread) => Some(thread),
                Err(RepoError::NotFound) => None,
                Err(e) => return Err(e.into()),
            };
            // drafts the caller cannot see are as unknown as missing threads
            let thread = match thread {
                Some(thread) => visible_to(&data, Some(&auth), &thread).await?.then_some(thread),
                None => None,
            };
            if thread.is_none() {
                errors.add("thread_id", "The selected thread id is invalid.");
            }
            thread
        }
        None => {
            errors.add("thread_id", "The thread id field is required.");
            None
        }
    };
    let (content, thread) = errors.check(content.zip(thread))?;

    let answer = data
        .repo
        .create_answer(NewAnswer { content, thread_id: thread.id, user_id: auth.user_id })
        .await?;
    tracing::info!(answer_id = answer.id, thread_id = thread.id, by = auth.user_id, "answer created");
    Ok(HttpResponse::Created().json(answer))
}

#[utoipa::path(
    delete,
    path = "/api/v1/answers/{id}",
    params(("id" = Id, Path, description = "Answer id")),
    responses(
        (status = 200, description = "Answer deleted"),
        (status = 403, description = "Neither author nor moderator"),
        (status = 404, description = "Answer not found")
    )
)]
pub async fn destroy_answer(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let answer = data.repo.get_answer(path.into_inner()).await?;
    if !can_moderate(&data, &auth, answer.user_id).await? {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_answer(answer.id).await?;
    tracing::info!(answer_id = answer.id, by = auth.user_id, "answer deleted");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "answer deleted successfully" })))
}
