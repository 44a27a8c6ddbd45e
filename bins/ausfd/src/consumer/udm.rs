//! UDM UEAuthentication consumer
//!
//! Outbound calls to `/nudm-ueau/v1`: fetch an authentication vector and
//! report the authentication outcome.

use async_trait::async_trait;

use ausf_sbi::models::{AuthEvent, AuthenticationInfoRequest, AuthenticationInfoResult};
use ausf_sbi::{SbiClient, SbiError, SbiResult};

/// UDM operations used by the auth engine.
#[async_trait]
pub trait UdmClient: Send + Sync {
    /// POST `security-information/generate-auth-data` for a SUPI or SUCI.
    async fn generate_auth_data(
        &self,
        udm_url: &str,
        supi_or_suci: &str,
        request: &AuthenticationInfoRequest,
    ) -> SbiResult<AuthenticationInfoResult>;

    /// POST the authentication outcome to `auth-events`.
    async fn send_auth_event(
        &self,
        udm_url: &str,
        supi: &str,
        event: &AuthEvent,
    ) -> SbiResult<()>;
}

/// HTTP implementation of [`UdmClient`]. A client is built per call; the UDM
/// URL is resolved through discovery and can change between authentications.
#[derive(Default)]
pub struct HttpUdmClient;

impl HttpUdmClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UdmClient for HttpUdmClient {
    async fn generate_auth_data(
        &self,
        udm_url: &str,
        supi_or_suci: &str,
        request: &AuthenticationInfoRequest,
    ) -> SbiResult<AuthenticationInfoResult> {
        let client = SbiClient::from_uri(udm_url)?;
        let path =
            format!("/nudm-ueau/v1/{supi_or_suci}/security-information/generate-auth-data");
        let response = client.post_json(&path, request).await?;

        match response.status {
            200 | 201 => Ok(response.json()?),
            status => Err(SbiError::from_status(
                status,
                response.http.content.unwrap_or_default(),
            )),
        }
    }

    async fn send_auth_event(
        &self,
        udm_url: &str,
        supi: &str,
        event: &AuthEvent,
    ) -> SbiResult<()> {
        let client = SbiClient::from_uri(udm_url)?;
        let path = format!("/nudm-ueau/v1/{supi}/auth-events");
        let response = client.post_json(&path, event).await?;

        match response.status {
            200 | 201 | 204 => Ok(()),
            status => Err(SbiError::from_status(
                status,
                response.http.content.unwrap_or_default(),
            )),
        }
    }
}
