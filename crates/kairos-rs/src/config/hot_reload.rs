//! Polling-based configuration hot reload.
//!
//! The route table is published via [`arc_swap::ArcSwap`], so readers on
//! the request path never block on a reload and a reload never observes
//! a half-built table: a new [`RouteTable`] is built off to the side and
//! swapped in atomically only once it parses and validates cleanly. A
//! configuration that fails to parse or validate is logged and the
//! previous table keeps serving; there is no retry before the next poll
//! tick.

use crate::config::settings::load_settings_from;
use crate::config::validation::validate_comprehensive;
use crate::models::error::GatewayError;
use crate::services::health::CombinedChecker;
use crate::utils::route_matcher::RouteTable;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Result of a successful reload, returned to callers (the manual reload
/// endpoint, startup logging) that want to report on it.
#[derive(Debug, Clone)]
pub struct ReloadOutcome {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub route_count: usize,
}

/// Owns the published route table and the file-watching state needed to
/// decide when to rebuild it.
pub struct ConfigReloader {
    path: PathBuf,
    poll_interval: Duration,
    table: Arc<ArcSwap<RouteTable>>,
    checker: Arc<CombinedChecker>,
    last_mtime: Mutex<Option<SystemTime>>,
    version: AtomicU64,
    last_reload_at: Mutex<DateTime<Utc>>,
}

impl ConfigReloader {
    /// Performs the initial load: a configuration that fails to parse or
    /// validate at startup is a hard error, unlike a later reload which
    /// just keeps the previous table.
    pub fn bootstrap(
        path: PathBuf,
        poll_interval: Duration,
        checker: Arc<CombinedChecker>,
    ) -> Result<Arc<Self>, GatewayError> {
        let settings = load_settings_from(&path)?;
        let validation = validate_comprehensive(&settings);
        if !validation.is_valid() {
            return Err(GatewayError::Config(validation.errors.join("; ")));
        }
        log_validation(&validation);

        let table = Arc::new(ArcSwap::from_pointee(RouteTable::build(
            &settings.routes,
            &checker,
        )));
        let mtime = std::fs::metadata(&path).ok().and_then(|m| m.modified().ok());

        Ok(Arc::new(Self {
            path,
            poll_interval,
            table,
            checker,
            last_mtime: Mutex::new(mtime),
            version: AtomicU64::new(1),
            last_reload_at: Mutex::new(Utc::now()),
        }))
    }

    /// The published route table. Request handling reads through this on
    /// every request; the poller and manual reload are the only writers.
    pub fn table(&self) -> Arc<ArcSwap<RouteTable>> {
        self.table.clone()
    }

    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn last_reload_at(&self) -> DateTime<Utc> {
        *self.last_reload_at.lock().unwrap()
    }

    fn load_and_publish(&self) -> Result<ReloadOutcome, GatewayError> {
        let settings = load_settings_from(&self.path)?;
        let validation = validate_comprehensive(&settings);
        if !validation.is_valid() {
            return Err(GatewayError::Config(validation.errors.join("; ")));
        }
        log_validation(&validation);

        let new_table = RouteTable::build(&settings.routes, &self.checker);
        self.table.store(Arc::new(new_table));

        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        let timestamp = Utc::now();
        *self.last_reload_at.lock().unwrap() = timestamp;

        Ok(ReloadOutcome {
            version,
            timestamp,
            route_count: settings.routes.len(),
        })
    }

    /// Triggered by the manual reload endpoint; bypasses the mtime check
    /// and reloads unconditionally.
    pub fn reload_now(&self) -> Result<ReloadOutcome, GatewayError> {
        self.load_and_publish()
    }

    /// Spawns the background poll loop. Aborting the returned handle
    /// stops polling; the currently published table is unaffected.
    pub fn spawn_poller(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.poll_interval.max(Duration::from_millis(1)));
            loop {
                ticker.tick().await;

                let mtime = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
                    Ok(mtime) => mtime,
                    Err(e) => {
                        warn!(
                            "could not stat configuration file {}: {}",
                            self.path.display(),
                            e
                        );
                        continue;
                    }
                };

                let changed = {
                    let mut last = self.last_mtime.lock().unwrap();
                    let changed = last.map(|seen| mtime > seen).unwrap_or(true);
                    *last = Some(mtime);
                    changed
                };
                if !changed {
                    continue;
                }

                match self.load_and_publish() {
                    Ok(outcome) => info!(
                        "configuration reloaded: version {} ({} routes)",
                        outcome.version, outcome.route_count
                    ),
                    Err(e) => warn!(
                        "configuration reload failed, keeping previous table: {}",
                        e
                    ),
                }
            }
        })
    }
}

fn log_validation(validation: &crate::config::validation::ValidationResult) {
    for warning in &validation.warnings {
        warn!("configuration warning: {}", warning);
    }
    for recommendation in &validation.recommendations {
        info!("configuration recommendation: {}", recommendation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn write_config(path: &std::path::Path, content: &str) {
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    /// A scratch directory inside the current working directory — the
    /// config loader rejects paths outside it, so tests can't use the
    /// system temp dir — removed again on drop.
    struct InTreeDir {
        path: PathBuf,
    }

    impl InTreeDir {
        fn new() -> Self {
            static COUNTER: AtomicU64 = AtomicU64::new(0);
            let id = COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = std::env::current_dir()
                .unwrap()
                .join(format!(".kairos-test-reload-{}-{}", std::process::id(), id));
            std::fs::create_dir_all(&path).unwrap();
            Self { path }
        }

        fn join(&self, name: &str) -> PathBuf {
            self.path.join(name)
        }
    }

    impl Drop for InTreeDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    fn checker() -> Arc<CombinedChecker> {
        CombinedChecker::new(
            std::iter::empty(),
            crate::services::health::HealthConfig::default(),
        )
    }

    #[test]
    fn bootstrap_fails_on_invalid_configuration() {
        let dir = InTreeDir::new();
        let path = dir.join("config.json");
        write_config(&path, r#"{ "version": 1, "routes": [] }"#);
        assert!(ConfigReloader::bootstrap(path, Duration::from_millis(10), checker()).is_err());
    }

    #[test]
    fn bootstrap_succeeds_and_publishes_table() {
        let dir = InTreeDir::new();
        let path = dir.join("config.json");
        write_config(
            &path,
            r#"{ "version": 1, "routes": [{ "path": "/api", "backends": [{ "id": "http://backend:8080" }] }] }"#,
        );
        let reloader = ConfigReloader::bootstrap(path, Duration::from_millis(10), checker()).unwrap();
        assert_eq!(reloader.current_version(), 1);
        assert_eq!(reloader.table().load().len(), 1);
    }

    #[test]
    fn reload_now_picks_up_an_added_route() {
        let dir = InTreeDir::new();
        let path = dir.join("config.json");
        write_config(
            &path,
            r#"{ "version": 1, "routes": [{ "path": "/api", "backends": [{ "id": "http://backend:8080" }] }] }"#,
        );
        let reloader = ConfigReloader::bootstrap(path.clone(), Duration::from_millis(10), checker()).unwrap();

        write_config(
            &path,
            r#"{ "version": 1, "routes": [
                { "path": "/api", "backends": [{ "id": "http://backend:8080" }] },
                { "path": "/other", "backends": [{ "id": "http://other:8080" }] }
            ] }"#,
        );
        let outcome = reloader.reload_now().unwrap();
        assert_eq!(outcome.version, 2);
        assert_eq!(reloader.table().load().len(), 2);
    }

    #[test]
    fn reload_now_keeps_old_table_when_new_file_is_invalid() {
        let dir = InTreeDir::new();
        let path = dir.join("config.json");
        write_config(
            &path,
            r#"{ "version": 1, "routes": [{ "path": "/api", "backends": [{ "id": "http://backend:8080" }] }] }"#,
        );
        let reloader = ConfigReloader::bootstrap(path.clone(), Duration::from_millis(10), checker()).unwrap();

        write_config(&path, "not json");
        assert!(reloader.reload_now().is_err());
        assert_eq!(reloader.current_version(), 1);
        assert_eq!(reloader.table().load().len(), 1);
    }
}
