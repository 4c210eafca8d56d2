use reqwest::header::{
    HeaderMap, HeaderValue, InvalidHeaderValue, ACCEPT, CACHE_CONTROL, PRAGMA, USER_AGENT,
};

/// Build the fixed request headers for a fetch
///
/// Identifies the client and disables caching on both HTTP/1.0 and HTTP/1.1
/// intermediaries.
///
/// # Arguments
///
/// * `user_agent` - Descriptive client identity
///
/// # Errors
///
/// Returns an error if `user_agent` contains characters not allowed in a header
///
/// # Examples
///
/// ```
/// use batchfetch::fetcher::headers::build_fetch_headers;
///
/// let headers = build_fetch_headers("batchfetch/0.1").unwrap();
/// assert_eq!(headers.get("cache-control").unwrap(), "no-cache");
/// ```
pub fn build_fetch_headers(user_agent: &str) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    Ok(headers)
}
