use actix_cors::Cors;
use actix_web::{middleware::Compress, web, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

use forum::config::AppConfig;
use forum::permissions::Catalog;
use forum::rate_limit::RateLimiterFacade;
use forum::repo::Repo;
use forum::{app, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::from_env().context("invalid configuration")?;
    info!(bind = %cfg.bind_addr, frontend = ?cfg.frontend_url, "bootstrapping forum server");

    let repo = build_repo(&cfg).await?;
    let seeded = repo
        .seed_roles_and_permissions(&Catalog::default())
        .await
        .context("seeding roles and permissions")?;
    info!(roles = seeded.roles_created, permissions = seeded.permissions_created, "permission catalog seeded");

    let state = AppState::new(repo)
        .with_limiter(RateLimiterFacade::new(cfg.rate_limit.clone()))
        .with_bootstrap_admins(cfg.bootstrap_admin_emails.clone());
    let frontend = cfg.frontend_url.clone();

    let server = HttpServer::new(move || {
        let mut cors = Cors::default()
            // local dev servers
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://127.0.0.1:5173")
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);
        if let Some(front) = &frontend {
            cors = cors.allowed_origin(front);
        }

        app(web::Data::new(state.clone()))
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
    })
    .bind(cfg.bind_addr.as_str())
    .with_context(|| format!("binding {}", cfg.bind_addr))?;

    info!("listening on http://{}", cfg.bind_addr);
    server.run().await?;
    Ok(())
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(_cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    info!("using in-memory repository backend");
    Ok(Arc::new(forum::repo::inmem::InMemRepo::new()))
}

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use sqlx::postgres::PgPoolOptions;

    let url = cfg.database_url.as_deref().context("DATABASE_URL must be set for postgres-store")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(url)
        .context("creating Postgres pool")?;
    let repo = forum::repo::pg::PgRepo::new(pool);
    repo.migrate().await.context("running migrations")?;
    info!("using Postgres repository backend");
    Ok(Arc::new(repo))
}
