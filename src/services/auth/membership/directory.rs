//! Transitive group membership lookups against a directory API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::services::auth::principal::BearerToken;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("group id '{0}' is not a valid directory identifier")]
    InvalidGroupId(String),
    #[error("directory request failed: {0}")]
    Transport(String),
    #[error("directory query rejected: status={status}, response={body}")]
    Rejected { status: u16, body: String },
    #[error("invalid directory response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Number of groups matching `group_id` that the token's subject belongs to,
    /// directly or through nested groups.
    async fn transitive_membership_count(
        &self,
        token: &BearerToken,
        group_id: &str,
    ) -> Result<u64, DirectoryError>;
}

/// Group ids are interpolated into an OData filter, so only identifier characters pass.
pub fn is_valid_group_id(group_id: &str) -> bool {
    !group_id.is_empty()
        && group_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    #[serde(rename = "@odata.count")]
    count: Option<u64>,
}

/// Microsoft Graph style directory (`/me/transitiveMemberOf`).
#[derive(Clone, Debug)]
pub struct GraphGroupDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl GraphGroupDirectory {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GroupDirectory for GraphGroupDirectory {
    async fn transitive_membership_count(
        &self,
        token: &BearerToken,
        group_id: &str,
    ) -> Result<u64, DirectoryError> {
        if !is_valid_group_id(group_id) {
            return Err(DirectoryError::InvalidGroupId(group_id.to_string()));
        }

        let url = format!("{}/me/transitiveMemberOf/microsoft.graph.group", self.base_url);
        let filter = format!("id eq '{}'", group_id);

        let resp = self
            .http
            .get(&url)
            .query(&[("$filter", filter.as_str()), ("$count", "true")])
            .bearer_auth(token.as_str())
            .header("ConsistencyLevel", "eventual")
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(DirectoryError::Rejected { status, body });
        }

        let parsed: CountResponse = resp
            .json()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;

        Ok(parsed.count.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_ids_are_restricted_to_identifier_characters() {
        assert!(is_valid_group_id("6a1b2c3d-0000-4e5f-9abc-123456789def"));
        assert!(is_valid_group_id("admins"));
        assert!(!is_valid_group_id(""));
        assert!(!is_valid_group_id("x' or id ne 'y"));
    }
}
