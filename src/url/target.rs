use crate::{UrlError, UrlResult};
use url::Url;

/// Extracts the lower-cased host from a URL
///
/// Returns None for URLs without a host (e.g. `data:` URLs).
///
/// # Examples
///
/// ```
/// use url::Url;
/// use site_sentinel::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.com:8443/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Parses a user-supplied scan target into a URL and its domain
///
/// Bare hostnames such as `example.com/login` are treated as HTTPS. Only the
/// `http` and `https` schemes are accepted; the fragment is dropped.
///
/// # Arguments
///
/// * `raw` - The target as entered by the user or the batch feed
///
/// # Returns
///
/// * `Ok((Url, String))` - The parsed URL and its lower-cased domain
/// * `Err(UrlError)` - The target is empty, malformed, or not HTTP(S)
pub fn parse_target(raw: &str) -> UrlResult<(Url, String)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Parse("empty target".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut url = Url::parse(&candidate).map_err(|e| UrlError::Parse(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::InvalidScheme(other.to_string())),
    }

    url.set_fragment(None);
    let domain = extract_domain(&url).ok_or(UrlError::MissingDomain)?;

    Ok((url, domain))
}

/// Strips a leading `www.` so mail-related DNS records are queried at the apex
pub fn dns_root(domain: &str) -> &str {
    domain.strip_prefix("www.").unwrap_or(domain)
}
