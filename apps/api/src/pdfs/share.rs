use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use reqwest::Url;

const TOKEN_BYTES: usize = 32;
pub const REVIEW_PATH: &str = "/review";
pub const TOKEN_PARAM: &str = "token";

/// Opaque share token: 32 random bytes, URL-safe base64 without padding.
pub fn generate_share_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn share_url(app_base_url: &str, token: &str) -> String {
    format!(
        "{}{REVIEW_PATH}?{TOKEN_PARAM}={token}",
        app_base_url.trim_end_matches('/')
    )
}

/// Reads the share token from a review-page URL. `None` when absent or blank.
pub fn extract_share_token(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == TOKEN_PARAM)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
