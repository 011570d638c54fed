use std::sync::Arc;
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{error::JsonPayloadError, web, App, HttpRequest};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::Auth;
use crate::error::{ApiError, FieldErrors};
use crate::middleware::UserBlock;
use crate::openapi::ApiDoc;
use crate::models::{Channel, Id};
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{Repo, RepoError};

pub mod accounts;
pub mod answers;
pub mod channels;
pub mod threads;

/// The whole application: API routes and Swagger UI behind the user-block gate.
///
/// The gate wraps the `App` itself so no path, documented or not, is reachable by a blocked user.
pub fn app(
    state: web::Data<AppState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .wrap(UserBlock)
        .app_data(state)
        .configure(config)
        .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", ApiDoc::openapi()))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .app_data(web::JsonConfig::default().error_handler(json_error))
            .service(
                web::resource("/channels")
                    .route(web::get().to(channels::list_channels))
                    .route(web::post().to(channels::create_channel))
                    .route(web::put().to(channels::update_channel))
                    .route(web::delete().to(channels::destroy_channel)),
            )
            .service(web::resource("/channels/{id}").route(web::get().to(channels::show_channel)))
            .service(
                web::resource("/threads")
                    .route(web::get().to(threads::list_threads))
                    .route(web::post().to(threads::create_thread)),
            )
            .service(
                web::resource("/threads/{id}")
                    .route(web::get().to(threads::show_thread))
                    .route(web::put().to(threads::update_thread))
                    .route(web::delete().to(threads::destroy_thread)),
            )
            .service(web::resource("/threads/{id}/best-answer").route(web::put().to(threads::set_best_answer)))
            .service(web::resource("/threads/{id}/answers").route(web::get().to(answers::list_answers)))
            .service(web::resource("/answers").route(web::post().to(answers::create_answer)))
            .service(web::resource("/answers/{id}").route(web::delete().to(answers::destroy_answer)))
            .service(web::resource("/auth/register").route(web::post().to(accounts::register)))
            .service(web::resource("/auth/login").route(web::post().to(accounts::login)))
            .service(web::resource("/auth/me").route(web::get().to(accounts::me)))
            .service(web::resource("/users/{id}/block").route(web::put().to(accounts::block_user)))
            .service(web::resource("/users/{id}/roles").route(web::put().to(accounts::assign_role))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub limiter: RateLimiterFacade,
    pub bootstrap_admins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self { repo, limiter: RateLimiterFacade::from_env(), bootstrap_admins: Arc::new(Vec::new()) }
    }

    pub fn with_limiter(mut self, limiter: RateLimiterFacade) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_bootstrap_admins(mut self, emails: Vec<String>) -> Self {
        self.bootstrap_admins = Arc::new(emails);
        self
    }
}

// Absent or malformed bodies are a validation failure, not a 400.
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    tracing::debug!(error = %err, "rejected JSON payload");
    ApiError::invalid("body", err.to_string()).into()
}

/// Body of a handler that checks permissions before validating; an unreadable body
/// is treated as an empty one so validation reports the missing fields.
pub(crate) fn body<T: Default>(payload: Option<web::Json<T>>) -> T {
    payload.map(web::Json::into_inner).unwrap_or_default()
}

pub(crate) fn client_ip(req: &HttpRequest) -> String {
    req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string()
}

pub(crate) async fn require_permission(state: &AppState, auth: &Auth, permission: &str) -> Result<(), ApiError> {
    if state.repo.has_permission(auth.user_id, permission).await? {
        Ok(())
    } else {
        tracing::info!(user_id = auth.user_id, permission, "permission denied");
        Err(ApiError::Forbidden)
    }
}

/// Looks up a referenced channel; a dangling id becomes a field error instead of a 404.
pub(crate) async fn existing_channel(
    state: &AppState,
    errors: &mut FieldErrors,
    field: &str,
    id: Id,
) -> Result<Option<Channel>, ApiError> {
    match state.repo.get_channel(id).await {
        Ok(channel) => Ok(Some(channel)),
        Err(RepoError::NotFound) => {
            errors.add(field, format!("The selected {} is invalid.", field.replace('_', " ")));
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
