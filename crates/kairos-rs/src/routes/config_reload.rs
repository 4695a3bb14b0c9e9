//! Manual configuration reload API, for environments that prefer an
//! explicit trigger (or a faster one than the poll interval) over
//! waiting on the background poller.

use actix_web::{post, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::hot_reload::ConfigReloader;

#[derive(Serialize, Deserialize)]
pub struct ReloadResponse {
    pub success: bool,
    pub message: String,
    pub version: Option<u64>,
    pub timestamp: Option<String>,
}

/// `POST /api/config/reload` - reloads immediately, bypassing the poll
/// interval. Returns 500 with the validation error if the file on disk
/// doesn't parse or validate; the previously published route table keeps
/// serving either way.
#[post("/api/config/reload")]
pub async fn reload_config(reloader: web::Data<Arc<ConfigReloader>>) -> impl Responder {
    match reloader.reload_now() {
        Ok(outcome) => HttpResponse::Ok().json(ReloadResponse {
            success: true,
            message: "configuration reloaded".to_string(),
            version: Some(outcome.version),
            timestamp: Some(outcome.timestamp.to_rfc3339()),
        }),
        Err(e) => HttpResponse::InternalServerError().json(ReloadResponse {
            success: false,
            message: format!("failed to reload configuration: {}", e),
            version: None,
            timestamp: None,
        }),
    }
}

/// `GET /api/config/status` - the currently published configuration's
/// version and last reload time.
#[actix_web::get("/api/config/status")]
pub async fn config_status(reloader: web::Data<Arc<ConfigReloader>>) -> impl Responder {
    HttpResponse::Ok().json(ReloadResponse {
        success: true,
        message: "current configuration status".to_string(),
        version: Some(reloader.current_version()),
        timestamp: Some(reloader.last_reload_at().to_rfc3339()),
    })
}

pub fn configure_config_reload(cfg: &mut web::ServiceConfig) {
    cfg.service(reload_config).service(config_status);
}
