//! HTTP clients for the validation and permission collaborators.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Response, StatusCode};
use serde_json::json;
use tracing::debug;

use super::{BasePermissions, BaseValidator, CollaboratorError, Right};

const VALIDATOR: &str = "device-repository";
const PERMISSIONS: &str = "permission-search";

/// Turn a non-success response into [`CollaboratorError::Rejected`].
async fn ensure_success(
    service: &'static str,
    response: Response,
) -> Result<Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(CollaboratorError::Rejected {
        service,
        status: status.as_u16(),
        message,
    })
}

fn unavailable(service: &'static str) -> impl FnOnce(reqwest::Error) -> CollaboratorError {
    move |source| CollaboratorError::Unavailable { service, source }
}

/// Dry-runs writes against the device repository.
///
/// `PUT|DELETE {base_url}/{resource}/{id}?dry-run=true`
pub struct HttpValidator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpValidator {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, resource: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, resource, id)
    }
}

#[async_trait]
impl BaseValidator for HttpValidator {
    async fn validate_put(
        &self,
        token: &str,
        resource: &str,
        id: &str,
        entity: &serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        debug!(resource, id, "validating put");
        let response = self
            .client
            .put(self.url(resource, id))
            .query(&[("dry-run", "true")])
            .header(AUTHORIZATION, token)
            .json(entity)
            .send()
            .await
            .map_err(unavailable(VALIDATOR))?;
        ensure_success(VALIDATOR, response).await?;
        Ok(())
    }

    async fn validate_delete(
        &self,
        token: &str,
        resource: &str,
        id: &str,
    ) -> Result<(), CollaboratorError> {
        debug!(resource, id, "validating delete");
        let response = self
            .client
            .delete(self.url(resource, id))
            .query(&[("dry-run", "true")])
            .header(AUTHORIZATION, token)
            .send()
            .await
            .map_err(unavailable(VALIDATOR))?;
        ensure_success(VALIDATOR, response).await?;
        Ok(())
    }
}

/// Permission service client.
///
/// - `GET {base_url}/check/{resource}/{id}/{right}` answers `true` or `false`
/// - `PUT {base_url}/resources/{resource}/{id}` with `{"owner": …}`
pub struct HttpPermissions {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPermissions {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BasePermissions for HttpPermissions {
    async fn check(
        &self,
        token: &str,
        resource: &str,
        id: &str,
        right: Right,
    ) -> Result<bool, CollaboratorError> {
        let response = self
            .client
            .get(format!(
                "{}/check/{}/{}/{}",
                self.base_url,
                resource,
                id,
                right.as_str()
            ))
            .header(AUTHORIZATION, token)
            .send()
            .await
            .map_err(unavailable(PERMISSIONS))?;

        // The service answers 403 instead of `false` for some resources.
        if response.status() == StatusCode::FORBIDDEN {
            return Ok(false);
        }
        let response = ensure_success(PERMISSIONS, response).await?;
        response.json::<bool>().await.map_err(unavailable(PERMISSIONS))
    }

    async fn set_owner(
        &self,
        token: &str,
        resource: &str,
        id: &str,
        owner: &str,
    ) -> Result<(), CollaboratorError> {
        let response = self
            .client
            .put(format!("{}/resources/{}/{}", self.base_url, resource, id))
            .header(AUTHORIZATION, token)
            .json(&json!({ "owner": owner }))
            .send()
            .await
            .map_err(unavailable(PERMISSIONS))?;
        ensure_success(PERMISSIONS, response).await?;
        Ok(())
    }
}
