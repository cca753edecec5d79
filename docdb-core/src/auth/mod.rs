// Authorization for the document service REST dialect

mod master_key;

pub use master_key::{rfc1123_date, MasterKeyAuth};

use crate::error::DocDbResult;

/// How requests to the service are authorized
#[derive(Debug, Clone)]
pub enum AuthMode {
    /// Account master key, base64 encoded
    MasterKey(String),
    /// Pre-issued resource token, sent as-is
    ResourceToken(String),
}

impl AuthMode {
    pub fn master_key(key: impl Into<String>) -> Self {
        Self::MasterKey(key.into())
    }

    pub fn resource_token(token: impl Into<String>) -> Self {
        Self::ResourceToken(token.into())
    }

    /// Build the `authorization` header value for one request
    pub fn authorization_header(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> DocDbResult<String> {
        match self {
            Self::MasterKey(key) => MasterKeyAuth::new(key)?.authorization_header(
                verb,
                resource_type,
                resource_link,
                date,
            ),
            Self::ResourceToken(token) => Ok(urlencoding::encode(token).into_owned()),
        }
    }
}
