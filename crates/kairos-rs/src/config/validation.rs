//! Configuration validation beyond what `Settings::validate` checks
//! structurally: conflicts and likely-mistake patterns across routes.
//!
//! Errors make the configuration load fail outright; warnings and
//! recommendations are logged but don't block a reload.

use crate::models::settings::Settings;

/// Accumulates problems found while validating a configuration, instead
/// of stopping at the first one.
#[derive(Debug, Default, Clone)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs structural validation plus the cross-route checks below.
pub fn validate_comprehensive(settings: &Settings) -> ValidationResult {
    let mut result = ValidationResult::default();

    if let Err(e) = settings.validate() {
        result.errors.push(e);
        return result;
    }

    check_duplicate_routes(settings, &mut result);
    check_shadowed_routes(settings, &mut result);
    check_single_backend_routes(settings, &mut result);

    result
}

fn check_duplicate_routes(settings: &Settings, result: &mut ValidationResult) {
    let mut seen = std::collections::HashSet::new();
    for route in &settings.routes {
        let key = route.normalized_path();
        if !seen.insert(key.clone()) {
            result.errors.push(format!("duplicate route path '{}'", key));
        }
    }
}

/// A shorter route with no required headers will shadow a longer one
/// whose headers can never all be satisfied by a request that also
/// matches the shorter prefix exactly. This only flags the common case:
/// identical prefix with a strict subset of headers.
fn check_shadowed_routes(settings: &Settings, result: &mut ValidationResult) {
    for (i, a) in settings.routes.iter().enumerate() {
        for b in settings.routes.iter().skip(i + 1) {
            let (shorter, longer) = if a.normalized_path().len() <= b.normalized_path().len() {
                (a, b)
            } else {
                (b, a)
            };
            if shorter.normalized_path() == longer.normalized_path() && shorter.headers.is_empty() {
                result.warnings.push(format!(
                    "route '{}' with no required headers will shadow another route on the same path",
                    shorter.normalized_path()
                ));
            }
        }
    }
}

fn check_single_backend_routes(settings: &Settings, result: &mut ValidationResult) {
    for route in &settings.routes {
        if route.backends.len() == 1 {
            result.recommendations.push(format!(
                "route '{}' has a single backend; failures there mean total unavailability for this route",
                route.normalized_path()
            ));
        }
    }
}
