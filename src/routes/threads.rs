use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::{client_ip, existing_channel, AppState};
use crate::auth::Auth;
use crate::error::{ApiError, FieldErrors};
use crate::models::*;
use crate::permissions::THREAD_MANAGEMENT;
use crate::repo::RepoError;
use crate::slug::slugify;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ThreadListQuery {
    /// Only threads of this channel
    pub channel_id: Option<Id>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateThreadRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub channel_id: Option<Id>,
    pub publish: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateThreadRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub channel_id: Option<Id>,
    pub publish: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct BestAnswerRequest {
    pub answer_id: Option<Id>,
}

fn title_slug(errors: &mut FieldErrors, title: &str) -> Option<String> {
    let slug = slugify(title);
    if slug.is_empty() {
        errors.add("title", "The title must contain at least one letter or digit.");
        None
    } else {
        Some(slug)
    }
}

/// Owner of the thread, or holder of `thread management`.
pub(crate) async fn can_moderate(data: &AppState, auth: &Auth, owner_id: Id) -> Result<bool, ApiError> {
    Ok(owner_id == auth.user_id || data.repo.has_permission(auth.user_id, THREAD_MANAGEMENT).await?)
}

/// Published threads are public; drafts only show to those who may moderate them.
pub(crate) async fn visible_to(data: &AppState, auth: Option<&Auth>, thread: &Thread) -> Result<bool, ApiError> {
    if thread.publish {
        return Ok(true);
    }
    match auth {
        Some(auth) => can_moderate(data, auth, thread.user_id).await,
        None => Ok(false),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/threads",
    params(ThreadListQuery),
    responses(
        (status = 200, description = "Published threads, newest first", body = [Thread])
    )
)]
pub async fn list_threads(data: web::Data<AppState>, query: web::Query<ThreadListQuery>) -> Result<HttpResponse, ApiError> {
    let filter = ThreadFilter { channel_id: query.channel_id, include_unpublished: false };
    let threads = data.repo.list_threads(filter).await?;
    Ok(HttpResponse::Ok().json(threads))
}

#[utoipa::path(
    get,
    path = "/api/v1/threads/{id}",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread", body = Thread),
        (status = 404, description = "Thread not found or not visible")
    )
)]
pub async fn show_thread(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let thread = data.repo.get_thread(path.into_inner()).await?;
    if !visible_to(&data, auth.as_ref(), &thread).await? {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(thread))
}

#[utoipa::path(
    post,
    path = "/api/v1/threads",
    request_body = CreateThreadRequest,
    responses(
        (status = 201, description = "Thread created", body = Thread),
        (status = 401, description = "Unauthenticated"),
        (status = 422, description = "Validation failed or unknown channel"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_thread(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreateThreadRequest>,
) -> Result<HttpResponse, ApiError> {
    if !data.limiter.allow_thread(&client_ip(&req)) {
        return Err(ApiError::TooManyRequests);
    }
    let payload = payload.into_inner();
    let mut errors = FieldErrors::default();
    let title = errors.required("title", payload.title);
    let slug = title.as_deref().and_then(|t| title_slug(&mut errors, t));
    let content = errors.required("content", payload.content);
    let channel = match payload.channel_id {
        Some(id) => existing_channel(&data, &mut errors, "channel_id", id).await?,
        None => {
            errors.add("channel_id", "The channel id field is required.");
            None
        }
    };
    let (((title, slug), content), channel) = errors.check(title.zip(slug).zip(content).zip(channel))?;

    let thread = data
        .repo
        .create_thread(NewThread {
            title,
            slug,
            content,
            publish: payload.publish.unwrap_or(true),
            user_id: auth.user_id,
            channel_id: channel.id,
        })
        .await?;
    tracing::info!(thread_id = thread.id, channel_id = thread.channel_id, by = auth.user_id, "thread created");
    Ok(HttpResponse::Created().json(thread))
}

#[utoipa::path(
    put,
    path = "/api/v1/threads/{id}",
    request_body = UpdateThreadRequest,
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread updated", body = Thread),
        (status = 403, description = "Neither owner nor moderator"),
        (status = 404, description = "Thread not found"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn update_thread(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateThreadRequest>,
) -> Result<HttpResponse, ApiError> {
    let thread = data.repo.get_thread(path.into_inner()).await?;
    if !can_moderate(&data, &auth, thread.user_id).await? {
        return Err(ApiError::Forbidden);
    }
    let payload = payload.into_inner();
    let mut errors = FieldErrors::default();
    let title = errors.optional("title", payload.title);
    let slug = title.as_deref().and_then(|t| title_slug(&mut errors, t));
    let content = errors.optional("content", payload.content);
    if let Some(id) = payload.channel_id {
        existing_channel(&data, &mut errors, "channel_id", id).await?;
    }
    errors.into_result()?;

    let upd = UpdateThread { title, slug, content, channel_id: payload.channel_id, publish: payload.publish };
    let updated = data.repo.update_thread(thread.id, upd).await?;
    tracing::info!(thread_id = updated.id, by = auth.user_id, "thread updated");
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    put,
    path = "/api/v1/threads/{id}/best-answer",
    request_body = BestAnswerRequest,
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Best answer recorded", body = Thread),
        (status = 403, description = "Only the thread owner may choose"),
        (status = 404, description = "Thread not found"),
        (status = 422, description = "Answer missing or from another thread")
    )
)]
pub async fn set_best_answer(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<BestAnswerRequest>,
) -> Result<HttpResponse, ApiError> {
    let thread = data.repo.get_thread(path.into_inner()).await?;
    if thread.user_id != auth.user_id {
        return Err(ApiError::Forbidden);
    }
    let Some(answer_id) = payload.answer_id else {
        return Err(ApiError::invalid("answer_id", "The answer id field is required."));
    };
    match data.repo.get_answer(answer_id).await {
        Ok(answer) if answer.thread_id == thread.id => {}
        Ok(_) | Err(RepoError::NotFound) => {
            return Err(ApiError::invalid("answer_id", "The selected answer id is invalid."));
        }
        Err(e) => return Err(e.into()),
    }
    let updated = data.repo.set_best_answer(thread.id, Some(answer_id)).await?;
    tracing::info!(thread_id = updated.id, answer_id, "best answer chosen");
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/threads/{id}",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread and its answers deleted"),
        (status = 403, description = "Neither owner nor moderator"),
        (status = 404, description = "Thread not found")
    )
)]
pub async fn destroy_thread(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let thread = data.repo.get_thread(path.into_inner()).await?;
    if !can_moderate(&data, &auth, thread.user_id).await? {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_thread(thread.id).await?;
    tracing::info!(thread_id = thread.id, by = auth.user_id, "thread deleted");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "thread deleted successfully" })))
}
