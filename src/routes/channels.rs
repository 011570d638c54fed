use actix_web::{web, HttpResponse};
use serde::Deserialize;
use utoipa::ToSchema;

use super::{body, existing_channel, require_permission, AppState};
use crate::auth::Auth;
use crate::error::{ApiError, FieldErrors};
use crate::models::*;
use crate::permissions::CHANNEL_MANAGEMENT;
use crate::slug::slugify;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateChannelRequest {
    pub name: Option<String>,
    pub parent_id: Option<Id>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateChannelRequest {
    pub id: Option<Id>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DestroyChannelRequest {
    pub id: Option<Id>,
}

/// Validates a channel name and derives its slug.
fn name_and_slug(errors: &mut FieldErrors, name: Option<String>) -> Option<(String, String)> {
    let name = errors.required("name", name)?;
    let slug = slugify(&name);
    if slug.is_empty() {
        errors.add("name", "The name must contain at least one letter or digit.");
        return None;
    }
    Some((name, slug))
}

/// Resolves the `id` field of an update/destroy body to an existing channel.
async fn target_channel(data: &AppState, errors: &mut FieldErrors, id: Option<Id>) -> Result<Option<Channel>, ApiError> {
    match id {
        Some(id) => existing_channel(data, errors, "id", id).await,
        None => {
            errors.add("id", "The id field is required.");
            Ok(None)
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/channels",
    responses(
        (status = 200, description = "All channels", body = [Channel])
    )
)]
pub async fn list_channels(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let channels = data.repo.list_channels().await?;
    Ok(HttpResponse::Ok().json(channels))
}

#[utoipa::path(
    get,
    path = "/api/v1/channels/{id}",
    params(("id" = Id, Path, description = "Channel id")),
    responses(
        (status = 200, description = "Channel with its nested channels", body = ChannelDetail),
        (status = 404, description = "Channel not found")
    )
)]
pub async fn show_channel(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let channel = data.repo.get_channel(id).await?;
    let children = data.repo.list_child_channels(id).await?;
    Ok(HttpResponse::Ok().json(ChannelDetail::new(channel, children)))
}

#[utoipa::path(
    post,
    path = "/api/v1/channels",
    request_body = CreateChannelRequest,
    responses(
        (status = 201, description = "Channel created", body = Channel),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "Missing `channel management` permission"),
        (status = 409, description = "Slug already taken"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_channel(
    auth: Auth,
    data: web::Data<AppState>,
    payload: Option<web::Json<CreateChannelRequest>>,
) -> Result<HttpResponse, ApiError> {
    require_permission(&data, &auth, CHANNEL_MANAGEMENT).await?;
    let req = body(payload);
    let mut errors = FieldErrors::default();
    let named = name_and_slug(&mut errors, req.name);
    if let Some(parent_id) = req.parent_id {
        existing_channel(&data, &mut errors, "parent_id", parent_id).await?;
    }
    let (name, slug) = errors.check(named)?;

    let channel = data.repo.create_channel(NewChannel { name, slug, parent_id: req.parent_id }).await?;
    tracing::info!(channel_id = channel.id, slug = %channel.slug, by = auth.user_id, "channel created");
    Ok(HttpResponse::Created().json(channel))
}

#[utoipa::path(
    put,
    path = "/api/v1/channels",
    request_body = UpdateChannelRequest,
    responses(
        (status = 200, description = "Channel updated", body = Channel),
        (status = 403, description = "Missing `channel management` permission"),
        (status = 409, description = "Slug already taken"),
        (status = 422, description = "Missing or unknown id, missing name")
    )
)]
pub async fn update_channel(
    auth: Auth,
    data: web::Data<AppState>,
    payload: Option<web::Json<UpdateChannelRequest>>,
) -> Result<HttpResponse, ApiError> {
    require_permission(&data, &auth, CHANNEL_MANAGEMENT).await?;
    let req = body(payload);
    let mut errors = FieldErrors::default();
    let channel = target_channel(&data, &mut errors, req.id).await?;
    let named = name_and_slug(&mut errors, req.name);
    let (channel, (name, slug)) = errors.check(channel.zip(named))?;

    let updated = data.repo.update_channel(channel.id, UpdateChannel { name, slug }).await?;
    tracing::info!(channel_id = updated.id, slug = %updated.slug, by = auth.user_id, "channel updated");
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/channels",
    request_body = DestroyChannelRequest,
    responses(
        (status = 200, description = "Channel deleted with its threads"),
        (status = 403, description = "Missing `channel management` permission"),
        (status = 422, description = "Missing or unknown id")
    )
)]
pub async fn destroy_channel(
    auth: Auth,
    data: web::Data<AppState>,
    payload: Option<web::Json<DestroyChannelRequest>>,
) -> Result<HttpResponse, ApiError> {
    require_permission(&data, &auth, CHANNEL_MANAGEMENT).await?;
    let req = body(payload);
    let mut errors = FieldErrors::default();
    let channel = target_channel(&data, &mut errors, req.id).await?;
    let channel = errors.check(channel)?;

    data.repo.delete_channel(channel.id).await?;
    tracing::info!(channel_id = channel.id, by = auth.user_id, "channel deleted");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "channel deleted successfully" })))
}
