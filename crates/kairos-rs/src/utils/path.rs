/// Joins a backend origin with a request path to form the upstream URL.
///
/// `origin` is a backend identifier such as `http://backend-service:8080`
/// (scheme and host, with or without a port); `path` is the path and
/// query string to forward, always starting with `/`.
///
/// # Examples
///
/// ```rust
/// use kairos_rs::utils::path::format_route;
///
/// let url = format_route("http://backend-service:8080", "/v1/users/123");
/// assert_eq!(url, "http://backend-service:8080/v1/users/123");
///
/// let url = format_route("https://secure-api/", "/auth/token");
/// assert_eq!(url, "https://secure-api/auth/token");
/// ```
pub fn format_route(origin: &str, path: &str) -> String {
    format!("{}{}", origin.trim_end_matches('/'), path)
}
