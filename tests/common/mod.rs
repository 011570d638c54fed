#![allow(dead_code)]

use actix_web::body::MessageBody;
use actix_web::dev::ServiceResponse;
use actix_web::{test, web};
use std::sync::Arc;

use forum::auth::create_jwt;
use forum::models::{NewUser, User};
use forum::permissions::Catalog;
use forum::rate_limit::RateLimiterFacade;
use forum::repo::inmem::InMemRepo;
use forum::repo::{PermissionRepo, UserRepo};
use forum::AppState;

// Helper to ensure JWT secret present
pub fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
}

/// Fresh store with the role/permission catalog already seeded.
pub async fn seeded_repo() -> InMemRepo {
    let repo = InMemRepo::new();
    repo.seed_roles_and_permissions(&Catalog::default()).await.unwrap();
    repo
}

pub fn state(repo: &InMemRepo) -> web::Data<AppState> {
    web::Data::new(AppState::new(Arc::new(repo.clone())).with_limiter(RateLimiterFacade::disabled()))
}

/// Creates a user directly in the store, assigns `roles` and returns a bearer token for it.
pub async fn user_with_roles(repo: &InMemRepo, email: &str, roles: &[&str]) -> (User, String) {
    let name = email.split('@').next().unwrap_or(email).to_string();
    let user = repo
        .create_user(NewUser { name, email: email.into(), password_hash: "not-a-phc-string".into() })
        .await
        .unwrap();
    for role in roles {
        repo.assign_role(user.id, role).await.unwrap();
    }
    let token = create_jwt(user.id, roles.iter().map(|r| r.to_string()).collect()).unwrap();
    (user, token)
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

pub async fn body_json<B: MessageBody>(resp: ServiceResponse<B>) -> serde_json::Value {
    serde_json::from_slice(&test::read_body(resp).await).unwrap()
}
