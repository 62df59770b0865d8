//! Thin operator HTTP surface over the registry facade (§4.F), in the
//! teacher's `handlers/registry.rs` idiom — one `actix-web` handler fn
//! per facade operation, `ApiError` doing the error-to-response
//! translation at the boundary.

use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use crate::errors::{ApiError, EngineError};
use crate::facade::Registry;
use crate::mirror::{mirror_registry, MirrorClient};
use crate::store::PackageStore;

pub type RegistryData = web::Data<Arc<Registry>>;

#[derive(Deserialize)]
pub struct AddPackageBody {
    pub repository: serde_json::Value,
    pub owner: String,
}

#[post("")]
pub async fn add_package(
    registry: RegistryData,
    body: web::Json<AddPackageBody>,
) -> Result<HttpResponse, ApiError> {
    let name = registry.add_package(body.repository.clone(), &body.owner).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "name": name })))
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub owner: String,
}

#[delete("/{name}")]
pub async fn remove_package(
    registry: RegistryData,
    path: web::Path<String>,
    query: web::Query<OwnerQuery>,
) -> Result<HttpResponse, ApiError> {
    registry.remove_package(path.as_str(), &query.owner).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Deserialize)]
pub struct GetPackageQuery {
    #[serde(default)]
    pub include_errors: bool,
}

#[get("/{name}")]
pub async fn get_package_info(
    registry: RegistryData,
    path: web::Path<String>,
    query: web::Query<GetPackageQuery>,
) -> Result<HttpResponse, ApiError> {
    match registry.get_package_info(path.as_str(), query.include_errors).await? {
        Some(view) => Ok(HttpResponse::Ok().json(view)),
        None => Err(ApiError::Engine(EngineError::NotFound)),
    }
}

#[get("")]
pub async fn get_packages_for_owner(
    registry: RegistryData,
    query: web::Query<OwnerQuery>,
) -> Result<HttpResponse, ApiError> {
    let packages = registry.get_packages(&query.owner).await?;
    Ok(HttpResponse::Ok().json(packages))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[get("/search")]
pub async fn search_packages(
    registry: RegistryData,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, ApiError> {
    let packages = registry.search_packages(&query.q).await?;
    Ok(HttpResponse::Ok().json(packages))
}

#[derive(Deserialize)]
pub struct SetRepositoryBody {
    pub repository: serde_json::Value,
}

#[put("/{name}/repository")]
pub async fn set_package_repository(
    registry: RegistryData,
    path: web::Path<String>,
    body: web::Json<SetRepositoryBody>,
) -> Result<HttpResponse, ApiError> {
    registry.set_package_repository(path.as_str(), body.repository.clone()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Deserialize)]
pub struct SetCategoriesBody {
    pub categories: Vec<String>,
}

#[put("/{name}/categories")]
pub async fn set_package_categories(
    registry: RegistryData,
    path: web::Path<String>,
    body: web::Json<SetCategoriesBody>,
) -> Result<HttpResponse, ApiError> {
    registry.set_package_categories(path.as_str(), body.categories.clone()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/{name}/update")]
pub async fn trigger_package_update(registry: RegistryData, path: web::Path<String>) -> HttpResponse {
    registry.trigger_package_update(path.as_str()).await;
    HttpResponse::Accepted().finish()
}

#[get("/{name}/update")]
pub async fn get_update_queue_position(registry: RegistryData, path: web::Path<String>) -> HttpResponse {
    let position = registry.get_update_queue_position(path.as_str()).await;
    HttpResponse::Ok().json(serde_json::json!({ "position": position }))
}

#[derive(Deserialize)]
pub struct StatsQuery {
    pub version: Option<String>,
}

#[get("/{name}/stats")]
pub async fn get_package_stats(
    registry: RegistryData,
    path: web::Path<String>,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse, ApiError> {
    let stats = registry
        .get_package_stats(path.as_str(), query.version.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "downloads": stats })))
}

#[get("/{name}/{version}/download")]
pub async fn download_package(
    registry: RegistryData,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (name, version) = path.into_inner();
    let bytes = registry.download_package_zip(&name, &version).await?;
    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .body(bytes))
}

pub struct MirrorState {
    pub store: Arc<dyn PackageStore>,
    pub client: Option<MirrorClient>,
}

/// Triggers one mirror pull cycle against the configured upstream
/// registry. `404` if no `--mirror-url` was configured at startup.
#[post("/pull")]
pub async fn trigger_mirror_pull(
    registry: RegistryData,
    mirror: web::Data<MirrorState>,
) -> Result<HttpResponse, ApiError> {
    let client = mirror
        .client
        .as_ref()
        .ok_or_else(|| ApiError::Engine(EngineError::Validation("No mirror URL configured.".to_string())))?;
    mirror_registry(registry.get_ref().as_ref(), mirror.store.as_ref(), client).await;
    Ok(HttpResponse::Accepted().finish())
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/packages")
            .service(add_package)
            .service(get_packages_for_owner)
            .service(search_packages)
            .service(get_package_info)
            .service(remove_package)
            .service(set_package_repository)
            .service(set_package_categories)
            .service(trigger_package_update)
            .service(get_update_queue_position)
            .service(get_package_stats)
            .service(download_package),
    )
    .service(web::scope("/api/v1/mirror").service(trigger_mirror_pull));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::repository::mock::{FactoryOf, MockRepositoryDriver};
    use crate::store::memory::MemoryStore;
    use actix_web::{test, App};
    use chrono::Utc;

    fn recipe(name: &str) -> String {
        format!(r#"{{"name": "{}", "description": "d", "license": "MIT"}}"#, name)
    }

    fn test_registry() -> web::Data<Arc<Registry>> {
        let store: Arc<dyn PackageStore> = Arc::new(MemoryStore::new());
        let factory: Arc<dyn crate::repository::RepositoryDriverFactory> =
            Arc::new(FactoryOf(Arc::new(MockRepositoryDriver::new())));
        web::Data::new(Arc::new(Registry::new(store, factory, EngineConfig::default())))
    }

    #[actix_rt::test]
    async fn test_get_package_info_not_found_is_404() {
        let registry = test_registry();
        let app = test::init_service(
            App::new()
                .app_data(registry.clone())
                .configure(configure_routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/api/v1/packages/nonexistent").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(404, resp.status().as_u16());
    }

    #[actix_rt::test]
    async fn test_add_then_get_package_round_trips_over_http() {
        let now = Utc::now();
        let driver = MockRepositoryDriver::new()
            .with_branch("master", "sha1", now)
            .with_tag("v1.0.0", "sha1", now)
            .with_file("sha1", "package.json", &recipe("foo"));
        let store: Arc<dyn PackageStore> = Arc::new(MemoryStore::new());
        let factory: Arc<dyn crate::repository::RepositoryDriverFactory> =
            Arc::new(FactoryOf(Arc::new(driver)));
        let registry = web::Data::new(Arc::new(Registry::new(store, factory, EngineConfig::default())));

        let app = test::init_service(
            App::new()
                .app_data(registry.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/packages")
            .set_json(&serde_json::json!({"repository": {"path": "/tmp/foo"}, "owner": "alice"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(201, resp.status().as_u16());

        let req = test::TestRequest::get().uri("/api/v1/packages/foo").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(200, resp.status().as_u16());
    }
}
