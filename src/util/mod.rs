use thiserror::Error;
use url::Url;

/// Longest accepted subscription URL.
const MAX_URL_LEN: usize = 2048;

/// Errors from subscription URL validation.
#[derive(Debug, Error)]
pub enum UrlError {
    /// The URL string could not be parsed.
    #[error("invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL exceeds the accepted length.
    #[error("URL is too long ({0} chars, max {MAX_URL_LEN})")]
    TooLong(usize),
}

/// Validates a URL string for use as a feed subscription.
///
/// # Errors
///
/// Rejects unparseable URLs, non-HTTP(S) schemes, and URLs longer than
/// `MAX_URL_LEN` characters.
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlError> {
    if url_str.chars().count() > MAX_URL_LEN {
        return Err(UrlError::TooLong(url_str.chars().count()));
    }

    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlError::UnsupportedScheme(scheme.to_owned())),
    }
}
