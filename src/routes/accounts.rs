use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{body, client_ip, require_permission, AppState};
use crate::auth::{create_jwt, hash_password, verify_password, Auth};
use crate::error::{ApiError, FieldErrors};
use crate::models::*;
use crate::permissions::{ROLE_MANAGEMENT, SUPER_ADMIN, USER, USER_BLOCK};
use crate::repo::RepoError;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct BlockRequest {
    pub blocked: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: User,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RolesResponse {
    pub user_id: Id,
    pub roles: Vec<String>,
}

// local@domain.tld, nothing fancier
fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else { return false };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
}

async fn issue_token(data: &AppState, user: User) -> Result<AuthResponse, ApiError> {
    let roles = data.repo.user_roles(user.id).await?;
    let token = create_jwt(user.id, roles).map_err(|e| {
        tracing::error!(error = %e, "token signing failed");
        ApiError::Internal
    })?;
    Ok(AuthResponse { user, token })
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn register(data: web::Data<AppState>, payload: web::Json<RegisterRequest>) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let mut errors = FieldErrors::default();
    let name = errors.required("name", payload.name);
    let email = errors.required("email", payload.email).map(|e| e.to_lowercase());
    if let Some(email) = &email {
        if !looks_like_email(email) {
            errors.add("email", "The email must be a valid email address.");
        }
    }
    let password = match payload.password {
        Some(p) if p.chars().count() >= MIN_PASSWORD_LEN => Some(p),
        Some(p) if !p.is_empty() => {
            errors.add("password", format!("The password must be at least {MIN_PASSWORD_LEN} characters."));
            None
        }
        _ => {
            errors.add("password", "The password field is required.");
            None
        }
    };
    let ((name, email), password) = errors.check(name.zip(email).zip(password))?;

    let password_hash = web::block(move || hash_password(&password))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "hashing task failed");
            ApiError::Internal
        })?
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            ApiError::Internal
        })?;

    let user = data.repo.create_user(NewUser { name, email, password_hash }).await?;
    let mut roles = vec![USER];
    if data.bootstrap_admins.iter().any(|admin| admin == &user.email) {
        roles.push(SUPER_ADMIN);
    }
    for role in roles {
        data.repo.assign_role(user.id, role).await.map_err(|e| match e {
            // the catalog is seeded at startup; a missing role is a deployment fault
            RepoError::NotFound => {
                tracing::error!(role, "role missing from store; was the catalog seeded?");
                ApiError::Internal
            }
            other => other.into(),
        })?;
    }
    tracing::info!(user_id = user.id, "account registered");
    Ok(HttpResponse::Created().json(issue_token(&data, user).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Bad credentials"),
        (status = 403, description = "Account blocked"),
        (status = 422, description = "Validation failed"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn login(req: HttpRequest, data: web::Data<AppState>, payload: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    if !data.limiter.allow_login(&client_ip(&req)) {
        return Err(ApiError::TooManyRequests);
    }
    let payload = payload.into_inner();
    let mut errors = FieldErrors::default();
    let email = errors.required("email", payload.email);
    let password = match payload.password {
        Some(p) if !p.is_empty() => Some(p),
        _ => {
            errors.add("password", "The password field is required.");
            None
        }
    };
    let (email, password) = errors.check(email.zip(password))?;

    let user = match data.repo.find_user_by_email(&email).await {
        Ok(user) => user,
        Err(RepoError::NotFound) => return Err(ApiError::Unauthorized),
        Err(e) => return Err(e.into()),
    };
    let hash = user.password_hash.clone();
    let verified = web::block(move || verify_password(&password, &hash)).await.map_err(|e| {
        tracing::error!(error = %e, "verification task failed");
        ApiError::Internal
    })?;
    if !verified {
        tracing::info!(user_id = user.id, "failed login");
        return Err(ApiError::Unauthorized);
    }
    if user.is_blocked {
        return Err(ApiError::Blocked);
    }
    Ok(HttpResponse::Ok().json(issue_token(&data, user).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user with roles and permissions", body = MeResponse),
        (status = 401, description = "Unauthenticated")
    )
)]
pub async fn me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = match data.repo.get_user(auth.user_id).await {
        Ok(user) => user,
        // token outlived its account
        Err(RepoError::NotFound) => return Err(ApiError::Unauthorized),
        Err(e) => return Err(e.into()),
    };
    let roles = data.repo.user_roles(user.id).await?;
    let permissions = data.repo.user_permissions(user.id).await?;
    Ok(HttpResponse::Ok().json(MeResponse { user, roles, permissions }))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}/block",
    request_body = BlockRequest,
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 403, description = "Missing `user block` permission"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Missing flag or self-block")
    )
)]
pub async fn block_user(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Option<web::Json<BlockRequest>>,
) -> Result<HttpResponse, ApiError> {
    require_permission(&data, &auth, USER_BLOCK).await?;
    let target = path.into_inner();
    let Some(blocked) = body(payload).blocked else {
        return Err(ApiError::invalid("blocked", "The blocked field is required."));
    };
    if blocked && target == auth.user_id {
        return Err(ApiError::invalid("id", "You cannot block yourself."));
    }
    let user = data.repo.set_blocked(target, blocked).await?;
    tracing::info!(user_id = user.id, blocked, by = auth.user_id, "block flag changed");
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}/roles",
    request_body = AssignRoleRequest,
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "Role names now held", body = RolesResponse),
        (status = 403, description = "Missing `role management` permission"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Unknown role")
    )
)]
pub async fn assign_role(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Option<web::Json<AssignRoleRequest>>,
) -> Result<HttpResponse, ApiError> {
    require_permission(&data, &auth, ROLE_MANAGEMENT).await?;
    let user = data.repo.get_user(path.into_inner()).await?;
    let mut errors = FieldErrors::default();
    let role = errors.required("role", body(payload).role);
    let role = errors.check(role)?;

    let known = data.repo.list_roles().await?.into_iter().any(|r| r.name == role);
    if !known {
        return Err(ApiError::invalid("role", "The selected role is invalid."));
    }
    data.repo.assign_role(user.id, &role).await?;
    let roles = data.repo.user_roles(user.id).await?;
    tracing::info!(user_id = user.id, role = %role, by = auth.user_id, "role assigned");
    Ok(HttpResponse::Ok().json(RolesResponse { user_id: user.id, roles }))
}
