//! Joining base URLs and paths without doubled or missing slashes.

/// Strip trailing slashes from a base URL.
///
/// ```
/// use palaver::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://shareg.pt///"), "https://shareg.pt");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and a relative path with exactly one slash.
///
/// ```
/// use palaver::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://shareg.pt/", "/AbC12"),
///     "https://shareg.pt/AbC12"
/// );
/// ```
pub fn construct_api_url(base_url: &str, path: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let path = path.trim_start_matches('/');
    format!("{normalized_base}/{path}")
}
