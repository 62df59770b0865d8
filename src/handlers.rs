use actix_web::web;

pub mod api;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    api::configure_routes(cfg);
}
