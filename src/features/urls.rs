//! URL parsing shared by the request fields and the shape scope.

use url::Url;

/// Base for URLs recorded without a scheme or host (`/get.php?id=1`).
const RELATIVE_BASE: &str = "http://relative.invalid/";

/// Parse a recorded URL. Relative URLs are resolved against a placeholder
/// host so their path and query are still available.
pub fn parse_url(raw: &str) -> Option<Url> {
    match Url::parse(raw.trim()) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(RELATIVE_BASE).ok()?.join(raw.trim()).ok()
        }
        Err(_) => None,
    }
}

/// Non-empty query string of a URL, without the leading `?`.
pub fn query_of(raw: &str) -> Option<String> {
    let url = parse_url(raw)?;
    url.query().filter(|q| !q.is_empty()).map(str::to_string)
}

/// Last path segment of a URL, empty for a bare host.
pub fn last_segment(raw: &str) -> Option<String> {
    let url = parse_url(raw)?;
    let segment = url.path_segments()?.last()?.to_string();
    Some(segment)
}
