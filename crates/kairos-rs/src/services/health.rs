//! Backend health: an active prober, a passive error-rate window, their
//! AND-combination, and the healthy-pool filter routes consult before
//! picking a backend.
//!
//! Active catches an idle backend that has quietly died; passive catches
//! one that is failing only under real load. Either alone has a blind
//! spot, so [`CombinedChecker`] requires both to agree a backend is up.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Policy for active probing and the passive error-rate window. Absent
/// from the configuration file, the gateway falls back to these defaults
/// (generous enough not to flap a healthy fleet on startup).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Interval between active probe rounds.
    #[serde(with = "secs_duration", default = "default_interval")]
    pub interval: Duration,
    /// Per-probe timeout; a probe that doesn't complete within this is a failure.
    #[serde(with = "secs_duration", default = "default_probe_timeout")]
    pub probe_timeout: Duration,
    /// Path appended to the backend origin for the probe GET.
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Consecutive 2xx probes required to mark a backend Healthy.
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,
    /// Consecutive failed probes required to mark a backend Unhealthy.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
    /// Window over which the passive checker computes an error rate.
    #[serde(with = "secs_duration", default = "default_passive_window")]
    pub passive_window: Duration,
    /// Below this many requests in the window, passive defaults to healthy.
    #[serde(default = "default_passive_min_requests")]
    pub passive_min_requests: u64,
    /// Error rate at/above which passive marks a backend unhealthy.
    #[serde(default = "default_passive_error_threshold")]
    pub passive_error_threshold: f64,
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}
fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}
fn default_health_path() -> String {
    "/health".to_string()
}
fn default_healthy_threshold() -> u32 {
    2
}
fn default_unhealthy_threshold() -> u32 {
    3
}
fn default_passive_window() -> Duration {
    Duration::from_secs(30)
}
fn default_passive_min_requests() -> u64 {
    10
}
fn default_passive_error_threshold() -> f64 {
    0.5
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            probe_timeout: default_probe_timeout(),
            health_path: default_health_path(),
            healthy_threshold: default_healthy_threshold(),
            unhealthy_threshold: default_unhealthy_threshold(),
            passive_window: default_passive_window(),
            passive_min_requests: default_passive_min_requests(),
            passive_error_threshold: default_passive_error_threshold(),
        }
    }
}

mod secs_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        d.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs_f64(f64::deserialize(d)?))
    }
}

/// Active status of a single backend. `Unknown` is treated as healthy by
/// [`ActiveChecker::is_healthy`] — an optimistic bias so a freshly started
/// gateway doesn't fail closed before the first probe round completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthStatus {
    fn from(v: u8) -> Self {
        match v {
            1 => HealthStatus::Healthy,
            2 => HealthStatus::Unhealthy,
            _ => HealthStatus::Unknown,
        }
    }
}

#[derive(Debug, Default)]
struct ActiveCounters {
    consecutive_successes: u32,
    consecutive_failures: u32,
}

#[derive(Debug)]
struct ActiveEntry {
    status: AtomicU8,
    counters: Mutex<ActiveCounters>,
}

impl ActiveEntry {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(HealthStatus::Unknown as u8),
            counters: Mutex::new(ActiveCounters::default()),
        }
    }

    fn status(&self) -> HealthStatus {
        HealthStatus::from(self.status.load(Ordering::Acquire))
    }

    fn record(&self, name: &str, success: bool, config: &HealthConfig) {
        let mut counters = self.counters.lock().unwrap();
        if success {
            counters.consecutive_failures = 0;
            counters.consecutive_successes += 1;
            if counters.consecutive_successes >= config.healthy_threshold
                && self.status() != HealthStatus::Healthy
            {
                self.status.store(HealthStatus::Healthy as u8, Ordering::Release);
                info!("backend {} marked healthy (active)", name);
            }
        } else {
            counters.consecutive_successes = 0;
            counters.consecutive_failures += 1;
            if counters.consecutive_failures >= config.unhealthy_threshold
                && self.status() != HealthStatus::Unhealthy
            {
                self.status
                    .store(HealthStatus::Unhealthy as u8, Ordering::Release);
                warn!("backend {} marked unhealthy (active)", name);
            }
        }
    }
}

/// Probes every monitored backend on a fixed interval and maintains a
/// hysteresis-gated Healthy/Unhealthy status per backend.
pub struct ActiveChecker {
    config: HealthConfig,
    client: reqwest::Client,
    entries: RwLock<HashMap<String, Arc<ActiveEntry>>>,
}

impl ActiveChecker {
    pub fn new(backends: impl IntoIterator<Item = String>, config: HealthConfig) -> Arc<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let mut entries = HashMap::new();
        for backend in backends {
            entries.insert(backend, Arc::new(ActiveEntry::new()));
        }

        Arc::new(Self {
            config,
            client,
            entries: RwLock::new(entries),
        })
    }

    /// Unknown is optimistically treated as healthy (fail-open at startup).
    pub fn is_healthy(&self, backend: &str) -> bool {
        match self.entries.read().unwrap().get(backend) {
            Some(entry) => entry.status() != HealthStatus::Unhealthy,
            None => true,
        }
    }

    pub fn status(&self, backend: &str) -> HealthStatus {
        self.entries
            .read()
            .unwrap()
            .get(backend)
            .map(|e| e.status())
            .unwrap_or(HealthStatus::Unknown)
    }

    pub fn add_backend(&self, backend: &str) {
        let mut entries = self.entries.write().unwrap();
        entries
            .entry(backend.to_string())
            .or_insert_with(|| Arc::new(ActiveEntry::new()));
    }

    pub fn remove_backend(&self, backend: &str) {
        self.entries.write().unwrap().remove(backend);
    }

    /// One probe round: every monitored backend is probed concurrently.
    pub async fn probe_once(&self) {
        let targets: Vec<(String, Arc<ActiveEntry>)> = self
            .entries
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut tasks = Vec::with_capacity(targets.len());
        for (backend, entry) in targets {
            let client = self.client.clone();
            let url = format!("{}{}", backend, self.config.health_path);
            let timeout = self.config.probe_timeout;
            tasks.push(tokio::spawn(async move {
                let success = match tokio::time::timeout(timeout, client.get(&url).send()).await {
                    Ok(Ok(resp)) => resp.status().is_success(),
                    _ => false,
                };
                (backend, entry, success)
            }));
        }

        for task in tasks {
            if let Ok((backend, entry, success)) = task.await {
                entry.record(&backend, success, &self.config);
                debug!("probed {} -> {}", backend, success);
            }
        }
    }

    /// Spawns the background probing loop: one round immediately, then
    /// every `interval`. Aborting the returned handle cancels the loop
    /// and any probe in flight.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval.max(Duration::from_millis(1)));
            loop {
                self.probe_once().await;
                ticker.tick().await;
            }
        })
    }
}

/// A trimmed, append-only log of recent outcomes per backend, used to
/// infer health from real traffic rather than synthetic probes.
pub struct PassiveChecker {
    window: Duration,
    min_requests: u64,
    error_threshold: f64,
    logs: RwLock<HashMap<String, Arc<Mutex<VecDeque<(Instant, bool)>>>>>,
}

impl PassiveChecker {
    pub fn new(config: &HealthConfig) -> Arc<Self> {
        Arc::new(Self {
            window: config.passive_window,
            min_requests: config.passive_min_requests,
            error_threshold: config.passive_error_threshold,
            logs: RwLock::new(HashMap::new()),
        })
    }

    fn log_for(&self, backend: &str) -> Arc<Mutex<VecDeque<(Instant, bool)>>> {
        if let Some(log) = self.logs.read().unwrap().get(backend) {
            return log.clone();
        }
        let mut logs = self.logs.write().unwrap();
        logs.entry(backend.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    fn trim(log: &mut VecDeque<(Instant, bool)>, window: Duration, now: Instant) {
        while let Some((ts, _)) = log.front() {
            if now.saturating_duration_since(*ts) > window {
                log.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn record_success(&self, backend: &str) {
        self.record(backend, true);
    }

    pub fn record_failure(&self, backend: &str) {
        self.record(backend, false);
    }

    fn record(&self, backend: &str, success: bool) {
        let now = Instant::now();
        let log = self.log_for(backend);
        let mut log = log.lock().unwrap();
        Self::trim(&mut log, self.window, now);
        log.push_back((now, success));
    }

    /// An unknown backend is treated as healthy; below `min_requests` in
    /// the window, the error rate isn't trusted yet and healthy wins.
    pub fn is_healthy(&self, backend: &str) -> bool {
        let log = match self.logs.read().unwrap().get(backend) {
            Some(log) => log.clone(),
            None => return true,
        };
        let now = Instant::now();
        let mut log = log.lock().unwrap();
        Self::trim(&mut log, self.window, now);

        let count = log.len() as u64;
        if count < self.min_requests {
            return true;
        }
        let failures = log.iter().filter(|(_, ok)| !ok).count() as f64;
        (failures / count as f64) < self.error_threshold
    }

    /// Read-only view of the current error rate, for observability.
    pub fn error_rate(&self, backend: &str) -> f64 {
        let log = match self.logs.read().unwrap().get(backend) {
            Some(log) => log.clone(),
            None => return 0.0,
        };
        let now = Instant::now();
        let mut log = log.lock().unwrap();
        Self::trim(&mut log, self.window, now);
        if log.is_empty() {
            return 0.0;
        }
        let failures = log.iter().filter(|(_, ok)| !ok).count() as f64;
        failures / log.len() as f64
    }
}

/// AND-combination of active and passive: a backend must pass both to be
/// considered healthy. Outcome recording only reaches the passive side —
/// active health comes exclusively from its own probes.
pub struct CombinedChecker {
    pub active: Arc<ActiveChecker>,
    pub passive: Arc<PassiveChecker>,
}

impl CombinedChecker {
    pub fn new(backends: impl IntoIterator<Item = String>, config: HealthConfig) -> Arc<Self> {
        let backends: Vec<String> = backends.into_iter().collect();
        Arc::new(Self {
            active: ActiveChecker::new(backends, config.clone()),
            passive: PassiveChecker::new(&config),
        })
    }

    pub fn is_healthy(&self, backend: &str) -> bool {
        self.active.is_healthy(backend) && self.passive.is_healthy(backend)
    }

    pub fn record_success(&self, backend: &str) {
        self.passive.record_success(backend);
    }

    pub fn record_failure(&self, backend: &str) {
        self.passive.record_failure(backend);
    }

    pub fn add_backend(&self, backend: &str) {
        self.active.add_backend(backend);
    }

    pub fn remove_backend(&self, backend: &str) {
        self.active.remove_backend(backend);
    }
}

/// Error returned by [`HealthyPool::healthy_or_error`] when every
/// configured backend is currently unhealthy.
#[derive(Debug, thiserror::Error)]
#[error("all backends unhealthy")]
pub struct AllUnhealthyError;

/// A route's backend list plus a shared [`CombinedChecker`]. `Healthy()`
/// fails open (serves the full list rather than nothing); `HealthyOrError`
/// fails closed. The pool borrows the combined checker — it does not own
/// it, since the checker is shared across every route in the gateway.
pub struct HealthyPool {
    backends: Mutex<Vec<String>>,
    checker: Arc<CombinedChecker>,
}

impl HealthyPool {
    pub fn new(backends: Vec<String>, checker: Arc<CombinedChecker>) -> Self {
        Self {
            backends: Mutex::new(backends),
            checker,
        }
    }

    fn all(&self) -> Vec<String> {
        self.backends.lock().unwrap().clone()
    }

    /// Currently-eligible backends; if none pass, returns every configured
    /// backend rather than an empty pool (fail-open).
    pub fn healthy(&self) -> Vec<String> {
        let all = self.all();
        let filtered: Vec<String> = all
            .iter()
            .filter(|b| self.checker.is_healthy(b))
            .cloned()
            .collect();
        if filtered.is_empty() {
            all
        } else {
            filtered
        }
    }

    /// Same filter, fail-closed: an empty result becomes an error instead
    /// of falling back to the full list.
    pub fn healthy_or_error(&self) -> Result<Vec<String>, AllUnhealthyError> {
        let all = self.all();
        let filtered: Vec<String> = all
            .iter()
            .filter(|b| self.checker.is_healthy(b))
            .cloned()
            .collect();
        if filtered.is_empty() {
            Err(AllUnhealthyError)
        } else {
            Ok(filtered)
        }
    }

    /// Adds `backend` to this pool and reaches through to the shared
    /// checker so active probing picks it up too.
    pub fn add_backend(&self, backend: &str) {
        let mut backends = self.backends.lock().unwrap();
        if !backends.iter().any(|b| b == backend) {
            backends.push(backend.to_string());
        }
        self.checker.add_backend(backend);
    }

    pub fn remove_backend(&self, backend: &str) {
        self.backends.lock().unwrap().retain(|b| b != backend);
        self.checker.remove_backend(backend);
    }
}

fn _assert_send_sync() {
    fn check<T: Send + Sync>() {}
    check::<ActiveChecker>();
    check::<PassiveChecker>();
    check::<CombinedChecker>();
    check::<HealthyPool>();
}
