//! Endpoint URL helpers.
//!
//! The backend base URL comes from user configuration and may or may not
//! carry a trailing slash; endpoints are always joined with exactly one.

/// Strip trailing slashes from a configured base URL.
///
/// ```
/// use chatwire::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://127.0.0.1:8000/"), "http://127.0.0.1:8000");
/// assert_eq!(normalize_base_url("https://chat.example.com/portal//"), "https://chat.example.com/portal");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path.
///
/// ```
/// use chatwire::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://127.0.0.1:8000/", "/api/chat/stream"),
///     "http://127.0.0.1:8000/api/chat/stream"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{normalized_base}/{endpoint}")
}

/// Validate a user-supplied base URL before it is saved to config.
pub fn validate_base_url(base_url: &str) -> Result<String, String> {
    let normalized = normalize_base_url(base_url);
    let parsed = reqwest::Url::parse(&normalized)
        .map_err(|err| format!("Invalid base URL '{base_url}': {err}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(normalized),
        scheme => Err(format!(
            "Invalid base URL '{base_url}': unsupported scheme '{scheme}'"
        )),
    }
}
