//! Gateway request signing.
//!
//! Every order request carries a `timestamp` parameter and an HMAC-SHA256
//! `signature` over the URL-encoded query string, keyed with the account
//! secret. The gateway rejects requests whose timestamp drifts too far from
//! its own clock.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute an HMAC-SHA256 signature and return it as a lowercase hex string.
pub fn hmac_sha256_sign(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build a URL-encoded, signed query string.
///
/// Joins `params` with `&`, signs the result and appends
/// `&signature=<hex>`. `params` must already include `timestamp`.
pub fn build_signed_query(params: &[(&str, &str)], secret: &str) -> String {
    let query: String = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let signature = hmac_sha256_sign(secret, &query);
    format!("{query}&signature={signature}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_hex_sha256() {
        let sig = hmac_sha256_sign("secret", "code=MXFL1&price=17800&timestamp=1");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_depends_on_secret() {
        let msg = "order_id=abc&timestamp=1";
        assert_ne!(hmac_sha256_sign("a", msg), hmac_sha256_sign("b", msg));
    }

    #[test]
    fn signed_query_keeps_parameter_order() {
        let query = build_signed_query(&[("code", "MXFL1"), ("timestamp", "1700000000000")], "s");
        assert!(query.starts_with("code=MXFL1&timestamp=1700000000000&signature="));
    }
}
