//! The catch-all HTTP proxy route.
//!
//! Every inbound request, regardless of path, lands on a single Actix
//! resource and is handed to [`RouteHandler`], which does the actual
//! route matching.

use crate::services::http::RouteHandler;
use actix_web::{web, HttpRequest};

/// Registers the catch-all proxy route and its payload size limits.
///
/// `/{tail:.*}` matches any path; [`RouteHandler::handle_request`] is
/// responsible for deciding whether it corresponds to a configured route.
pub fn configure_route(cfg: &mut web::ServiceConfig, handler: RouteHandler) {
    cfg.app_data(web::PayloadConfig::new(1024 * 1024))
        .app_data(web::JsonConfig::default().limit(1024 * 1024))
        .service(
            web::resource("/{tail:.*}").to(move |req: HttpRequest, body: web::Bytes| {
                let handler = handler.clone();
                async move { handler.handle_request(req, body).await }
            }),
        );
}
