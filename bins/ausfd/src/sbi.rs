//! SBI request routing
//!
//! Thin decoding layer between the HTTP server and the procedures: splits
//! the path, matches (service, resource, method), parses the JSON body and
//! renders results or ProblemDetails.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use ausf_sbi::models::{AuthenticationInfo, ConfirmationData, EapSession, NotificationData};
use ausf_sbi::{
    send_bad_request, send_method_not_allowed, send_not_found, SbiRequest, SbiResponse,
};

use crate::consumer::NrfClient;
use crate::metrics::increment_ue_auth_stats;
use crate::producer::{nf_subscription_status_notify, UeAuthEngine};

/// Routes inbound SBI requests into the AUSF procedures.
pub struct AusfSbiHandler {
    engine: Arc<UeAuthEngine>,
    nrf: Arc<dyn NrfClient>,
}

impl AusfSbiHandler {
    pub fn new(engine: Arc<UeAuthEngine>, nrf: Arc<dyn NrfClient>) -> Arc<Self> {
        Arc::new(Self { engine, nrf })
    }

    pub async fn handle(&self, request: SbiRequest) -> SbiResponse {
        let method = request.header.method.clone();
        let uri = request.header.uri.clone();
        log::debug!("SBI request: {method} {uri}");

        let path = uri.split('?').next().unwrap_or(&uri);
        let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        if parts.len() < 3 {
            return send_not_found("Invalid path", None);
        }

        let service = parts[0];
        let resource = parts[2];

        match (service, resource, method.as_str()) {
            ("nausf-auth", "ue-authentications", "POST") if parts.len() == 3 => {
                self.handle_ue_authentication(&request).await
            }
            ("nausf-auth", "ue-authentications", "PUT")
                if parts.len() == 5 && parts[4] == "5g-aka-confirmation" =>
            {
                self.handle_5g_aka_confirmation(parts[3], &request).await
            }
            ("nausf-auth", "ue-authentications", "PUT")
                if parts.len() == 5 && parts[4] == "eap-session" =>
            {
                self.handle_eap_session(parts[3], &request).await
            }
            ("nausf-auth", "ue-authentications", "DELETE") if parts.len() == 4 => {
                self.engine.delete_auth_context(parts[3]);
                SbiResponse::no_content()
            }
            ("nausf-callback", "nf-status-notify", "POST") => {
                self.handle_nf_status_notify(&request).await
            }
            ("nausf-auth", "ue-authentications", _) | ("nausf-callback", "nf-status-notify", _) => {
                send_method_not_allowed(&method, path)
            }
            _ => {
                log::warn!("unknown SBI request: {method} {uri}");
                send_not_found("Unknown resource", None)
            }
        }
    }

    async fn handle_ue_authentication(&self, request: &SbiRequest) -> SbiResponse {
        let info: AuthenticationInfo = match decode_body(request) {
            Ok(info) => info,
            Err(response) => return response,
        };
        let serving_network_name = info.serving_network_name.clone();
        let ausf_id = self.engine.context().nf_id();

        match self.engine.ue_authentication_post(info).await {
            Ok((body, location_uri)) => {
                increment_ue_auth_stats(
                    &ausf_id,
                    &serving_network_name,
                    body.auth_type.as_str(),
                    "AUTHORIZED",
                );
                SbiResponse::with_status(201)
                    .with_header("Location", location_uri)
                    .with_json_body(&body)
                    .unwrap_or_else(|_| SbiResponse::with_status(201))
            }
            Err(problem) => {
                increment_ue_auth_stats(
                    &ausf_id,
                    &serving_network_name,
                    "",
                    problem.cause.as_deref().unwrap_or("UNSPECIFIED"),
                );
                problem.to_response()
            }
        }
    }

    async fn handle_5g_aka_confirmation(
        &self,
        auth_ctx_id: &str,
        request: &SbiRequest,
    ) -> SbiResponse {
        let confirmation: ConfirmationData = match decode_body(request) {
            Ok(confirmation) => confirmation,
            Err(response) => return response,
        };

        match self
            .engine
            .auth_5g_aka_confirm(auth_ctx_id, confirmation)
            .await
        {
            Ok(body) => SbiResponse::ok()
                .with_json_body(&body)
                .unwrap_or_else(|_| SbiResponse::ok()),
            Err(problem) => problem.to_response(),
        }
    }

    async fn handle_eap_session(&self, auth_ctx_id: &str, request: &SbiRequest) -> SbiResponse {
        let session: EapSession = match decode_body(request) {
            Ok(session) => session,
            Err(response) => return response,
        };

        match self.engine.eap_auth_confirm(auth_ctx_id, session).await {
            Ok(body) => SbiResponse::ok()
                .with_json_body(&body)
                .unwrap_or_else(|_| SbiResponse::ok()),
            Err(problem) => problem.to_response(),
        }
    }

    async fn handle_nf_status_notify(&self, request: &SbiRequest) -> SbiResponse {
        let notification: NotificationData = match decode_body(request) {
            Ok(notification) => notification,
            Err(response) => return response,
        };

        match nf_subscription_status_notify(
            self.engine.context(),
            self.nrf.as_ref(),
            notification,
        )
        .await
        {
            None => SbiResponse::no_content(),
            Some(problem) => problem.to_response(),
        }
    }
}

fn decode_body<T: DeserializeOwned>(request: &SbiRequest) -> Result<T, SbiResponse> {
    let Some(content) = request.http.content.as_deref() else {
        return Err(send_bad_request("Missing request body", Some("MISSING_BODY")));
    };
    serde_json::from_str(content)
        .map_err(|e| send_bad_request(&format!("Invalid JSON: {e}"), Some("INVALID_JSON")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::nf_management::{NfRegistrationOutcome, SearchOutcome};
    use crate::consumer::UdmClient;
    use crate::context::test_context;
    use async_trait::async_trait;
    use ausf_sbi::models::{
        AuthEvent, AuthType, AuthenticationInfoRequest, AuthenticationInfoResult,
        AuthenticationVector, NfProfile, NrfSubscriptionData, PatchItem, SearchResult,
        UeAuthenticationCtx,
    };
    use ausf_sbi::{ProblemDetails, SbiResult};

    struct NullNrf;

    #[async_trait]
    impl NrfClient for NullNrf {
        async fn register_nf_instance(
            &self,
            _id: &str,
            profile: &NfProfile,
        ) -> SbiResult<NfRegistrationOutcome> {
            Ok(NfRegistrationOutcome::Updated(profile.clone()))
        }
        async fn update_nf_instance(
            &self,
            _id: &str,
            _patch: &[PatchItem],
        ) -> SbiResult<(Option<NfProfile>, Option<ProblemDetails>)> {
            Ok((None, None))
        }
        async fn deregister_nf_instance(&self, _id: &str) -> SbiResult<()> {
            Ok(())
        }
        async fn search_nf_instances(
            &self,
            _target: &str,
            _requester: &str,
            _services: &str,
        ) -> SbiResult<SearchOutcome> {
            Ok(SearchOutcome {
                result: SearchResult::default(),
                redirected: false,
            })
        }
        async fn create_subscription(
            &self,
            data: &NrfSubscriptionData,
        ) -> SbiResult<NrfSubscriptionData> {
            Ok(data.clone())
        }
        async fn remove_subscription(&self, _id: &str) -> SbiResult<()> {
            Ok(())
        }
    }

    struct CannedUdm;

    #[async_trait]
    impl UdmClient for CannedUdm {
        async fn generate_auth_data(
            &self,
            _udm_url: &str,
            _supi_or_suci: &str,
            _request: &AuthenticationInfoRequest,
        ) -> SbiResult<AuthenticationInfoResult> {
            Ok(AuthenticationInfoResult {
                auth_type: AuthType::FiveGAka,
                supi: "imsi-001010000000001".to_string(),
                authentication_vector: Some(AuthenticationVector {
                    rand: "11".repeat(16),
                    autn: "aa".repeat(16),
                    xres_star: "22".repeat(16),
                    kausf: "33".repeat(32),
                    ..Default::default()
                }),
            })
        }

        async fn send_auth_event(
            &self,
            _udm_url: &str,
            _supi: &str,
            _event: &AuthEvent,
        ) -> SbiResult<()> {
            Ok(())
        }
    }

    fn handler() -> Arc<AusfSbiHandler> {
        let ctx = test_context();
        let nrf: Arc<dyn NrfClient> = Arc::new(NullNrf);
        let engine = Arc::new(UeAuthEngine::new(ctx, nrf.clone(), Arc::new(CannedUdm)));
        AusfSbiHandler::new(engine, nrf)
    }

    fn post(uri: &str, body: &str) -> SbiRequest {
        let mut request = SbiRequest::post(uri);
        request.http.set_content(body);
        request
    }

    fn put(uri: &str, body: &str) -> SbiRequest {
        let mut request = SbiRequest::put(uri);
        request.http.set_content(body);
        request
    }

    #[tokio::test]
    async fn test_post_ue_authentications_returns_201_with_location() {
        let handler = handler();
        let response = handler
            .handle(post(
                "/nausf-auth/v1/ue-authentications",
                r#"{"supiOrSuci": "suci-0-001-01-0-0-0-0000000001",
                    "servingNetworkName": "5G:mnc001.mcc001.3gppnetwork.org"}"#,
            ))
            .await;

        assert_eq!(response.status, 201);
        let location = response.http.get_header("Location").unwrap();
        assert!(location.ends_with("/nausf-auth/v1/ue-authentications/suci-0-001-01-0-0-0-0000000001"));
        let body: UeAuthenticationCtx = response.json().unwrap();
        assert_eq!(body.auth_type, AuthType::FiveGAka);
        assert!(body.links["link"].href.ends_with("/5g-aka-confirmation"));
    }

    #[tokio::test]
    async fn test_unauthorized_serving_network_yields_403() {
        let handler = handler();
        let response = handler
            .handle(post(
                "/nausf-auth/v1/ue-authentications",
                r#"{"supiOrSuci": "suci-1", "servingNetworkName": "bogus"}"#,
            ))
            .await;
        assert_eq!(response.status, 403);
        let problem: ProblemDetails = response.json().unwrap();
        assert_eq!(
            problem.cause.as_deref(),
            Some("SERVING_NETWORK_NOT_AUTHORIZED")
        );
    }

    #[tokio::test]
    async fn test_confirmation_round_trip() {
        let handler = handler();
        handler
            .handle(post(
                "/nausf-auth/v1/ue-authentications",
                r#"{"supiOrSuci": "suci-0-001-01-0-0-0-0000000001",
                    "servingNetworkName": "5G:mnc001.mcc001.3gppnetwork.org"}"#,
            ))
            .await;

        let body = format!(r#"{{"resStar": "{}"}}"#, "22".repeat(16));
        let response = handler
            .handle(put(
                "/nausf-auth/v1/ue-authentications/suci-0-001-01-0-0-0-0000000001/5g-aka-confirmation",
                &body,
            ))
            .await;
        assert_eq!(response.status, 200);
        assert!(response
            .http
            .content
            .as_deref()
            .unwrap()
            .contains("AUTHENTICATION_SUCCESS"));
    }

    #[tokio::test]
    async fn test_unknown_auth_ctx_yields_400() {
        let handler = handler();
        let response = handler
            .handle(put(
                "/nausf-auth/v1/ue-authentications/suci-unknown/5g-aka-confirmation",
                r#"{"resStar": "00"}"#,
            ))
            .await;
        assert_eq!(response.status, 400);
        let problem: ProblemDetails = response.json().unwrap();
        assert_eq!(problem.cause.as_deref(), Some("USER_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_nf_status_notify_validation() {
        let handler = handler();

        let response = handler
            .handle(post("/nausf-callback/v1/nf-status-notify", r#"{}"#))
            .await;
        assert_eq!(response.status, 400);
        let problem: ProblemDetails = response.json().unwrap();
        assert_eq!(problem.cause.as_deref(), Some("MANDATORY_IE_MISSING"));

        let response = handler
            .handle(post(
                "/nausf-callback/v1/nf-status-notify",
                r#"{"event": "NF_DEREGISTERED", "nfInstanceUri": ".../peerA"}"#,
            ))
            .await;
        assert_eq!(response.status, 204);
    }

    #[tokio::test]
    async fn test_delete_auth_context_returns_204() {
        let handler = handler();
        handler
            .handle(post(
                "/nausf-auth/v1/ue-authentications",
                r#"{"supiOrSuci": "suci-0-001-01-0-0-0-0000000001",
                    "servingNetworkName": "5G:mnc001.mcc001.3gppnetwork.org"}"#,
            ))
            .await;

        let response = handler
            .handle(SbiRequest::delete(
                "/nausf-auth/v1/ue-authentications/suci-0-001-01-0-0-0-0000000001",
            ))
            .await;
        assert_eq!(response.status, 204);
        assert!(!handler
            .engine
            .context()
            .suci_supi_pair_exists("suci-0-001-01-0-0-0-0000000001"));
    }

    #[tokio::test]
    async fn test_malformed_requests() {
        let handler = handler();

        let response = handler
            .handle(SbiRequest::post("/nausf-auth/v1/ue-authentications"))
            .await;
        assert_eq!(response.status, 400);

        let response = handler
            .handle(post("/nausf-auth/v1/ue-authentications", "not json"))
            .await;
        assert_eq!(response.status, 400);

        let response = handler.handle(SbiRequest::get("/unknown/v1/thing")).await;
        assert_eq!(response.status, 404);

        let response = handler
            .handle(SbiRequest::get("/nausf-auth/v1/ue-authentications"))
            .await;
        assert_eq!(response.status, 405);
    }
}
