//! NRF NFManagement consumer
//!
//! Register, update, deregister and subscription operations against the NRF
//! (`/nnrf-nfm/v1`), plus the discovery search (`/nnrf-disc/v1`). The
//! operations are defined as a trait so the registration controller and the
//! auth engine can be driven with canned implementations in tests.

use async_trait::async_trait;

use ausf_sbi::models::{
    nf_type, service_name, NfProfile, NfService, NfServiceVersion, IpEndPoint,
    NrfSubscriptionData, PatchItem, PlmnId, SearchResult, AusfInfo,
};
use ausf_sbi::{ProblemDetails, SbiClient, SbiError, SbiResult};

use crate::context::AusfContext;

/// Result of a PUT registration.
#[derive(Debug, Clone)]
pub enum NfRegistrationOutcome {
    /// 200: the NRF updated an existing registration.
    Updated(NfProfile),
    /// 201: the NRF created the registration and assigned the instance id
    /// taken from the Location header.
    Created {
        profile: NfProfile,
        resource_nrf_uri: String,
        nf_instance_id: String,
    },
}

impl NfRegistrationOutcome {
    pub fn profile(&self) -> &NfProfile {
        match self {
            Self::Updated(profile) => profile,
            Self::Created { profile, .. } => profile,
        }
    }
}

/// Result of a discovery search. A 307 still carries a body; the caller
/// processes it and then surfaces the redirect as an error.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub result: SearchResult,
    pub redirected: bool,
}

/// NRF operations used by the AUSF.
#[async_trait]
pub trait NrfClient: Send + Sync {
    async fn register_nf_instance(
        &self,
        nf_instance_id: &str,
        profile: &NfProfile,
    ) -> SbiResult<NfRegistrationOutcome>;

    /// PATCH the registration. 2xx yields `(profile?, None)`; a ProblemDetails
    /// body on a failure status yields `(None, Some(problem))`; transport
    /// errors and bodyless failures are `Err`.
    async fn update_nf_instance(
        &self,
        nf_instance_id: &str,
        patch: &[PatchItem],
    ) -> SbiResult<(Option<NfProfile>, Option<ProblemDetails>)>;

    async fn deregister_nf_instance(&self, nf_instance_id: &str) -> SbiResult<()>;

    async fn search_nf_instances(
        &self,
        target_nf_type: &str,
        requester_nf_type: &str,
        service_names: &str,
    ) -> SbiResult<SearchOutcome>;

    async fn create_subscription(
        &self,
        data: &NrfSubscriptionData,
    ) -> SbiResult<NrfSubscriptionData>;

    async fn remove_subscription(&self, subscription_id: &str) -> SbiResult<()>;
}

/// Build the NF profile registered with the NRF. Recomputed from scratch for
/// every registration; never mutated in place.
pub fn build_nf_profile(ctx: &AusfContext, plmn_config: &[PlmnId]) -> NfProfile {
    let nf_id = ctx.nf_id();
    let service = NfService {
        service_instance_id: nf_id.clone(),
        service_name: service_name::NAUSF_AUTH.to_string(),
        versions: vec![NfServiceVersion {
            api_version_in_uri: "v1".to_string(),
            api_full_version: "1.0.0".to_string(),
        }],
        scheme: ctx.uri_scheme.clone(),
        nf_service_status: "REGISTERED".to_string(),
        api_prefix: None,
        ip_end_points: Some(vec![IpEndPoint {
            ipv4_address: Some(ctx.register_ipv4.clone()),
            transport: None,
            port: Some(ctx.sbi_port as i32),
        }]),
    };

    NfProfile {
        nf_instance_id: nf_id,
        nf_type: nf_type::AUSF.to_string(),
        nf_status: "REGISTERED".to_string(),
        heart_beat_timer: None,
        ipv4_addresses: vec![ctx.register_ipv4.clone()],
        fqdn: None,
        plmn_list: Some(plmn_config.to_vec()),
        nf_services: Some(vec![service]),
        ausf_info: Some(AusfInfo {
            group_id: Some(ctx.group_id.clone()),
        }),
    }
}

/// Split the Location header of a 201 into the NRF resource URI (everything
/// before `/nnrf-nfm/`) and the assigned instance id (the trailing segment).
fn parse_registration_location(location: &str) -> SbiResult<(String, String)> {
    let resource_idx = location.find("/nnrf-nfm/").ok_or_else(|| {
        SbiError::InvalidResponse(format!("Location [{location}] has no /nnrf-nfm/ segment"))
    })?;
    let instance_idx = location.rfind('/').ok_or_else(|| {
        SbiError::InvalidResponse(format!("Location [{location}] has no instance id"))
    })?;
    let nf_instance_id = &location[instance_idx + 1..];
    if nf_instance_id.is_empty() {
        return Err(SbiError::InvalidResponse(format!(
            "Location [{location}] has an empty instance id"
        )));
    }
    Ok((
        location[..resource_idx].to_string(),
        nf_instance_id.to_string(),
    ))
}

/// HTTP implementation of [`NrfClient`].
pub struct HttpNrfClient {
    client: SbiClient,
}

impl HttpNrfClient {
    pub fn new(nrf_uri: &str) -> SbiResult<Self> {
        Ok(Self {
            client: SbiClient::from_uri(nrf_uri)?,
        })
    }
}

#[async_trait]
impl NrfClient for HttpNrfClient {
    async fn register_nf_instance(
        &self,
        nf_instance_id: &str,
        profile: &NfProfile,
    ) -> SbiResult<NfRegistrationOutcome> {
        let path = format!("/nnrf-nfm/v1/nf-instances/{nf_instance_id}");
        let response = self.client.put_json(&path, profile).await?;

        match response.status {
            200 => Ok(NfRegistrationOutcome::Updated(response.json()?)),
            201 => {
                let location = response
                    .http
                    .get_header("Location")
                    .cloned()
                    .ok_or_else(|| {
                        SbiError::InvalidResponse("201 without Location header".to_string())
                    })?;
                let (resource_nrf_uri, nf_instance_id) =
                    parse_registration_location(&location)?;
                Ok(NfRegistrationOutcome::Created {
                    profile: response.json()?,
                    resource_nrf_uri,
                    nf_instance_id,
                })
            }
            status => Err(SbiError::from_status(
                status,
                response.http.content.unwrap_or_default(),
            )),
        }
    }

    async fn update_nf_instance(
        &self,
        nf_instance_id: &str,
        patch: &[PatchItem],
    ) -> SbiResult<(Option<NfProfile>, Option<ProblemDetails>)> {
        let path = format!("/nnrf-nfm/v1/nf-instances/{nf_instance_id}");
        let response = self.client.patch_json(&path, &patch).await?;

        match response.status {
            200 => Ok((response.json().ok(), None)),
            204 => Ok((None, None)),
            status => match response.json::<ProblemDetails>() {
                Ok(problem) => Ok((None, Some(problem))),
                Err(_) => Err(SbiError::from_status(
                    status,
                    response.http.content.unwrap_or_default(),
                )),
            },
        }
    }

    async fn deregister_nf_instance(&self, nf_instance_id: &str) -> SbiResult<()> {
        let path = format!("/nnrf-nfm/v1/nf-instances/{nf_instance_id}");
        let response = self.client.delete(&path).await?;
        match response.status {
            204 => Ok(()),
            status => Err(SbiError::from_status(
                status,
                response.http.content.unwrap_or_default(),
            )),
        }
    }

    async fn search_nf_instances(
        &self,
        target_nf_type: &str,
        requester_nf_type: &str,
        service_names: &str,
    ) -> SbiResult<SearchOutcome> {
        let request = ausf_sbi::SbiRequest::get("/nnrf-disc/v1/nf-instances")
            .with_param("target-nf-type", target_nf_type)
            .with_param("requester-nf-type", requester_nf_type)
            .with_param("service-names", service_names);
        let response = self.client.send_request(request).await?;

        match response.status {
            200 => Ok(SearchOutcome {
                result: response.json()?,
                redirected: false,
            }),
            307 => Ok(SearchOutcome {
                result: response.json().unwrap_or_default(),
                redirected: true,
            }),
            status => Err(SbiError::from_status(
                status,
                response.http.content.unwrap_or_default(),
            )),
        }
    }

    async fn create_subscription(
        &self,
        data: &NrfSubscriptionData,
    ) -> SbiResult<NrfSubscriptionData> {
        let response = self
            .client
            .post_json("/nnrf-nfm/v1/subscriptions", data)
            .await?;
        match response.status {
            200 | 201 => Ok(response.json()?),
            status => Err(SbiError::from_status(
                status,
                response.http.content.unwrap_or_default(),
            )),
        }
    }

    async fn remove_subscription(&self, subscription_id: &str) -> SbiResult<()> {
        let path = format!("/nnrf-nfm/v1/subscriptions/{subscription_id}");
        let response = self.client.delete(&path).await?;
        match response.status {
            204 => Ok(()),
            status => Err(SbiError::from_status(
                status,
                response.http.content.unwrap_or_default(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;

    #[test]
    fn test_parse_registration_location() {
        let (resource_uri, nf_id) = parse_registration_location(
            "http://nrf:29510/nnrf-nfm/v1/nf-instances/1b6bbbb3-1234-4f52-9f4e-5a4e4a2f0a11",
        )
        .unwrap();
        assert_eq!(resource_uri, "http://nrf:29510");
        assert_eq!(nf_id, "1b6bbbb3-1234-4f52-9f4e-5a4e4a2f0a11");
    }

    #[test]
    fn test_parse_registration_location_rejects_malformed() {
        assert!(parse_registration_location("http://nrf:29510/other/path").is_err());
        assert!(parse_registration_location("http://nrf:29510/nnrf-nfm/v1/nf-instances/").is_err());
    }

    #[test]
    fn test_build_nf_profile() {
        let ctx = test_context();
        let plmns = vec![PlmnId::new("001", "01")];
        let profile = build_nf_profile(&ctx, &plmns);

        assert_eq!(profile.nf_instance_id, ctx.nf_id());
        assert_eq!(profile.nf_type, nf_type::AUSF);
        assert_eq!(profile.nf_status, "REGISTERED");
        assert_eq!(profile.ipv4_addresses, vec!["127.0.0.9".to_string()]);
        assert_eq!(profile.plmn_list.as_deref(), Some(&plmns[..]));
        assert_eq!(
            profile.ausf_info.as_ref().unwrap().group_id.as_deref(),
            Some("ausfGroup001")
        );

        let services = profile.nf_services.as_ref().unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].service_name, service_name::NAUSF_AUTH);
        let ep = &services[0].ip_end_points.as_ref().unwrap()[0];
        assert_eq!(ep.ipv4_address.as_deref(), Some("127.0.0.9"));
        assert_eq!(ep.port, Some(8000));
    }

    #[test]
    fn test_profile_recomputed_per_registration() {
        let ctx = test_context();
        let first = build_nf_profile(&ctx, &[PlmnId::new("001", "01")]);
        ctx.set_nf_id("nrf-assigned-id");
        let second = build_nf_profile(&ctx, &[PlmnId::new("002", "02")]);

        assert_ne!(first.nf_instance_id, second.nf_instance_id);
        assert_eq!(second.nf_instance_id, "nrf-assigned-id");
        assert_eq!(
            second.plmn_list.as_ref().unwrap()[0],
            PlmnId::new("002", "02")
        );
    }
}
