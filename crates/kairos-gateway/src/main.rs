//! Kairos API Gateway process entrypoint.
//!
//! Loads configuration, builds the shared decision-fabric state (health
//! checkers, circuit breaker manager, route table), spawns the
//! background active-health and hot-reload loops, and serves the proxy
//! behind Actix Web.

use kairos_rs::config::hot_reload::ConfigReloader;
use kairos_rs::config::settings::config_path;
use kairos_rs::logs::logger::configure_logger;
use kairos_rs::middleware::rate_limit::{RateLimitAlgorithm, RateLimitConfig, RateLimitMiddlewareFactory, RateLimiter};
use kairos_rs::models::settings::Settings;
use kairos_rs::routes::{config_reload, health, http};
use kairos_rs::services::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerManager};
use kairos_rs::services::health::{CombinedChecker, HealthConfig};
use kairos_rs::services::http::RouteHandler;

use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RELOAD_POLL_SECS: u64 = 5;

fn default_rate_limit_config() -> RateLimitConfig {
    RateLimitConfig {
        algorithm: RateLimitAlgorithm::TokenBucket {
            capacity: 100.0,
            rate: 50.0,
        },
        stale_threshold: Duration::from_secs(300),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let config_path = config_path();
    info!("loading configuration from {}", config_path.display());

    // A first load just to read the backend list and health/rate-limit
    // policy; the route table itself is (re)built by the reloader so the
    // hot-reload path and the startup path share one code path.
    let settings: Settings = kairos_rs::config::settings::load_settings_from(&config_path)
        .unwrap_or_else(|e| {
            error!("failed to load configuration: {}", e);
            std::process::exit(1);
        });
    info!(
        "configuration version {} with {} routes",
        settings.version,
        settings.routes.len()
    );

    let all_backends: Vec<String> = settings
        .routes
        .iter()
        .flat_map(|r| r.backends.iter().map(|b| b.id.clone()))
        .collect();

    let health_config = settings.health.clone().unwrap_or_default();
    let checker = CombinedChecker::new(all_backends, health_config);

    let reload_poll_interval = Duration::from_secs(DEFAULT_RELOAD_POLL_SECS);
    let reloader = ConfigReloader::bootstrap(config_path, reload_poll_interval, checker.clone())
        .unwrap_or_else(|e| {
            error!("configuration failed validation: {}", e);
            std::process::exit(1);
        });
    info!(
        "route table published: version {}",
        reloader.current_version()
    );

    let active_prober = checker.active.clone().spawn();
    let reload_poller = reloader.clone().spawn_poller();

    let circuits = Arc::new(CircuitBreakerManager::new(CircuitBreakerConfig::default()));
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS))
        .build()
        .expect("failed to build upstream HTTP client");

    let route_handler = RouteHandler::new(
        reloader.table(),
        checker.clone(),
        circuits,
        http_client,
        Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
    );

    let rate_limiter = RateLimiter::new(
        settings.rate_limit.clone().unwrap_or_else(default_rate_limit_config),
    );
    let sweeper = rate_limiter.clone().spawn_sweeper();

    let host = std::env::var("KAIROS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("KAIROS_PORT")
        .unwrap_or_else(|_| "5900".to_string())
        .parse::<u16>()
        .unwrap_or(5900);

    info!("starting server on {}:{}", host, port);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(reloader.clone()))
            .wrap(RateLimitMiddlewareFactory::new(rate_limiter.clone()))
            .wrap(Logger::new(
                r#"%a "%r" %s %b "%{Referer}i" "%{User-Agent}i" %T"#,
            ))
            .wrap(actix_web::middleware::Compress::default())
            .configure(health::configure_health)
            .configure(config_reload::configure_config_reload)
            .configure(|cfg| http::configure_route(cfg, route_handler.clone()))
    })
    .bind((host.as_str(), port))?
    .run();

    info!("server started");

    tokio::select! {
        result = server => {
            match result {
                Ok(_) => info!("server stopped gracefully"),
                Err(e) => error!("server error: {}", e),
            }
        }
        _ = signal::ctrl_c() => {
            info!("received shutdown signal, stopping server");
        }
    }

    active_prober.abort();
    reload_poller.abort();
    sweeper.abort();

    Ok(())
}
