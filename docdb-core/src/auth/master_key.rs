//! Master-key request signing.
//!
//! Each request is signed with HMAC-SHA256 over
//! `verb\nresource_type\nresource_link\ndate\n\n` using the decoded account key. Verb,
//! resource type and date are lower-cased; the resource link keeps its case.

use crate::error::{DocDbError, DocDbResult};
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_TYPE: &str = "master";
const TOKEN_VERSION: &str = "1.0";

/// Signs requests with an account master key
#[derive(Clone)]
pub struct MasterKeyAuth {
    key: Vec<u8>,
}

impl std::fmt::Debug for MasterKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKeyAuth").field("key", &"<redacted>").finish()
    }
}

impl MasterKeyAuth {
    /// Decode a base64 master key
    pub fn new(encoded_key: &str) -> DocDbResult<Self> {
        let key = base64::engine::general_purpose::STANDARD
            .decode(encoded_key.trim())
            .map_err(|e| DocDbError::Authorization {
                message: format!("Master key is not valid base64: {}", e),
            })?;

        if key.is_empty() {
            return Err(DocDbError::Authorization {
                message: "Master key is empty".to_string(),
            });
        }

        Ok(Self { key })
    }

    /// URL-encoded `type=master&ver=1.0&sig=...` token for the `authorization` header
    pub fn authorization_header(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> DocDbResult<String> {
        let signature = self.sign(verb, resource_type, resource_link, date)?;
        let token = format!("type={}&ver={}&sig={}", TOKEN_TYPE, TOKEN_VERSION, signature);
        Ok(urlencoding::encode(&token).into_owned())
    }

    fn sign(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> DocDbResult<String> {
        let payload = format!(
            "{}\n{}\n{}\n{}\n\n",
            verb.to_lowercase(),
            resource_type.to_lowercase(),
            resource_link,
            date.to_lowercase()
        );

        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|e| DocDbError::Authorization {
            message: format!("Failed to create HMAC: {}", e),
        })?;
        mac.update(payload.as_bytes());

        Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// `x-ms-date` header value
pub fn rfc1123_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const KEY: &str = "dGVzdC1tYXN0ZXIta2V5LTAxMjM0NTY3ODk=";

    #[test]
    fn test_rfc1123_date() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        assert_eq!(rfc1123_date(at), "Mon, 19 Oct 2026 08:00:00 GMT");
    }

    #[test]
    fn test_known_signature() {
        let auth = MasterKeyAuth::new(KEY).unwrap();
        let header = auth
            .authorization_header(
                "GET",
                "docs",
                "dbs/db1/colls/c1/docs/d1",
                "Mon, 19 Oct 2026 08:00:00 GMT",
            )
            .unwrap();

        assert_eq!(
            header,
            "type%3Dmaster%26ver%3D1.0%26sig%3D206f9L%2BaDi9rrOiiUZfv0Ll3Bc%2BPMdvRlqxwbNUwJcI%3D"
        );
    }

    #[test]
    fn test_link_case_is_significant() {
        let auth = MasterKeyAuth::new(KEY).unwrap();
        let date = "Mon, 19 Oct 2026 08:00:00 GMT";

        let sign = |verb, resource_type, link| {
            auth.authorization_header(verb, resource_type, link, date).unwrap()
        };
        let lower = sign("GET", "docs", "dbs/db1/colls/c1/docs/d1");
        let upper = sign("GET", "docs", "dbs/DB1/colls/c1/docs/d1");
        let verb = sign("get", "DOCS", "dbs/db1/colls/c1/docs/d1");

        assert_ne!(lower, upper);
        assert_eq!(lower, verb);
    }

    #[test]
    fn test_invalid_key() {
        let err = MasterKeyAuth::new("not base64 !!").unwrap_err();
        assert!(matches!(err, DocDbError::Authorization { .. }));
        assert!(format!("{:?}", MasterKeyAuth::new(KEY).unwrap()).contains("redacted"));
    }
}
