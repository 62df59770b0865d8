use actix_web::{middleware, web, App, HttpServer};
use anyhow::Result;
use std::sync::Arc;

use wharf::cli;
use wharf::config::EngineConfig;
use wharf::facade::Registry;
use wharf::handlers;
use wharf::handlers::api::MirrorState;
use wharf::mirror::MirrorClient;
use wharf::repository::{GitRepositoryDriverFactory, RepositoryDriverFactory};
use wharf::store::sqlite::SqliteStore;
use wharf::store::PackageStore;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let opt = cli::parse_args();

    let bind_addr = format!("{}:{}", opt.http_host, opt.http_port);
    let config = EngineConfig {
        max_name_length: opt.max_name_length,
        queue_capacity: opt.queue_capacity,
        watchdog_timeout: std::time::Duration::from_secs(opt.watchdog_timeout_secs),
        ..EngineConfig::default()
    };

    log::info!("Server starting on `{}`", bind_addr);
    log::info!("\tDatabase: `{}`", opt.database_path.display());
    log::info!("\tEngine config: `{:?}`", config);

    let store: Arc<dyn PackageStore> = Arc::new(SqliteStore::open(&opt.database_path)?);
    let repo_factory: Arc<dyn RepositoryDriverFactory> = Arc::new(GitRepositoryDriverFactory);
    let registry = web::Data::new(Arc::new(Registry::new(store.clone(), repo_factory, config)));

    let mirror_client = opt.mirror_url.clone().map(MirrorClient::new);
    if let Some(client) = &mirror_client {
        client.validate_mirror_url().await?;
    }
    let mirror_state = web::Data::new(MirrorState {
        store,
        client: mirror_client,
    });

    // The update queue starts empty on every restart; kick off a full
    // rescan of every known package so reconciliation doesn't wait for
    // the next externally-triggered update.
    registry.check_for_new_versions_all().await;

    Ok(HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(registry.clone())
            .app_data(mirror_state.clone())
            .configure(handlers::configure_routes)
    })
    .bind(bind_addr)?
    .run()
    .await?)
}
