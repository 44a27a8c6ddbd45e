//! UE authentication engine
//!
//! The three stages of a UE authentication (TS 29.509):
//! start (`POST /ue-authentications`), 5G-AKA confirmation and the EAP-AKA'
//! session exchange. The engine talks to UDM and NRF through the injectable
//! client traits, never through HTTP directly.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

use ausf_crypt::eap::{self, EapCode, EapPacket};
use ausf_crypt::kdf;
use ausf_sbi::models::{
    AuthEvent, AuthResult, AuthType, AuthenticationInfo, AuthenticationInfoRequest,
    AuthenticationVector, Av5gAka, Av5gAuthData, ConfirmationData, ConfirmationDataResponse,
    EapSession, LinksValueSchema, UeAuthenticationCtx,
};
use ausf_sbi::ProblemDetails;

use crate::consumer::{get_udm_url, NrfClient, UdmClient};
use crate::context::{AusfContext, AusfUeContext};

pub const UPSTREAM_SERVER_ERROR: &str = "UPSTREAM_SERVER_ERROR";
pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";
pub const SERVING_NETWORK_NOT_AUTHORIZED: &str = "SERVING_NETWORK_NOT_AUTHORIZED";
pub const AV_GENERATION_PROBLEM: &str = "AV_GENERATION_PROBLEM";

/// The UE authentication engine.
pub struct UeAuthEngine {
    ctx: Arc<AusfContext>,
    nrf: Arc<dyn NrfClient>,
    udm: Arc<dyn UdmClient>,
}

impl UeAuthEngine {
    pub fn new(ctx: Arc<AusfContext>, nrf: Arc<dyn NrfClient>, udm: Arc<dyn UdmClient>) -> Self {
        Self { ctx, nrf, udm }
    }

    pub fn context(&self) -> &Arc<AusfContext> {
        &self.ctx
    }

    /// Start an authentication. Returns the context body and the Location
    /// URI on success.
    pub async fn ue_authentication_post(
        &self,
        info: AuthenticationInfo,
    ) -> Result<(UeAuthenticationCtx, String), ProblemDetails> {
        let supi_or_suci = info.supi_or_suci.clone();
        let sn_name = info.serving_network_name.clone();

        if !self.ctx.is_serving_network_authorized(&sn_name) {
            log::info!("403 forbidden: serving network [{sn_name}] not authorized");
            return Err(ProblemDetails::new(403, SERVING_NETWORK_NOT_AUTHORIZED));
        }
        log::debug!("serving network [{sn_name}] authorized");

        let mut auth_info_req = AuthenticationInfoRequest {
            serving_network_name: sn_name.clone(),
            ausf_instance_id: self.ctx.nf_id(),
            resynchronization_info: info.resynchronization_info.clone(),
        };

        // UDM needs the RAND of the challenge the AUTS answers; take it from
        // the prior context of this UE.
        if let Some(resync) = auth_info_req.resynchronization_info.as_mut() {
            if let Some(prior) = self
                .ctx
                .supi_from_suci(&supi_or_suci)
                .and_then(|supi| self.ctx.get_ue_context(&supi))
            {
                log::info!("resynchronization for {supi_or_suci}, reusing stored RAND");
                resync.rand = prior.rand;
            } else {
                log::warn!("resynchronization without a prior context for {supi_or_suci}");
            }
        }

        let udm_url = get_udm_url(&self.ctx, self.nrf.as_ref()).await;
        let auth_info_result = self
            .udm
            .generate_auth_data(&udm_url, &supi_or_suci, &auth_info_req)
            .await
            .map_err(|e| {
                log::error!("generate-auth-data for {supi_or_suci} failed: {e}");
                ProblemDetails::new(500, UPSTREAM_SERVER_ERROR)
            })?;

        let av = auth_info_result
            .authentication_vector
            .as_ref()
            .ok_or_else(|| {
                log::error!("UDM returned no authentication vector for {supi_or_suci}");
                ProblemDetails::new(500, AV_GENERATION_PROBLEM)
            })?;

        let supi = auth_info_result.supi.clone();
        let mut ue = AusfUeContext::new(&supi);
        ue.serving_network_name = sn_name.clone();
        ue.auth_status = Some(AuthResult::Ongoing);
        ue.udm_ueau_url = udm_url;

        let location_uri = format!(
            "{}/nausf-auth/v1/ue-authentications/{}",
            self.ctx.ipv4_uri(),
            supi_or_suci
        );

        let (auth_data, put_link) = match auth_info_result.auth_type {
            AuthType::FiveGAka => {
                log::info!("[{supi_or_suci}] using 5G AKA");
                let auth_data = self.prepare_5g_aka(&mut ue, av, &sn_name)?;
                (auth_data, format!("{location_uri}/5g-aka-confirmation"))
            }
            AuthType::EapAkaPrime => {
                log::info!("[{supi_or_suci}] using EAP-AKA'");
                let auth_data = self.prepare_eap_aka_prime(&mut ue, av, &sn_name)?;
                (auth_data, format!("{location_uri}/eap-session"))
            }
        };

        self.ctx.add_ue_context(ue);
        log::debug!("added SUCI/SUPI pair ({supi_or_suci}, {supi})");
        self.ctx.add_suci_supi_pair(&supi_or_suci, &supi);

        let mut links = std::collections::HashMap::new();
        links.insert("link".to_string(), LinksValueSchema { href: put_link });

        let response = UeAuthenticationCtx {
            auth_type: auth_info_result.auth_type,
            var5g_auth_data: auth_data,
            links,
            serving_network_name: Some(sn_name),
        };
        Ok((response, location_uri))
    }

    fn prepare_5g_aka(
        &self,
        ue: &mut AusfUeContext,
        av: &AuthenticationVector,
        sn_name: &str,
    ) -> Result<Av5gAuthData, ProblemDetails> {
        // HXRES* = SHA-256(RAND || XRES*)[16..32]
        let concat = hex::decode(format!("{}{}", av.rand, av.xres_star)).map_err(|e| {
            log::error!("RAND/XRES* decode failed: {e}");
            ProblemDetails::new(500, AV_GENERATION_PROBLEM)
        })?;
        let digest = Sha256::digest(&concat);
        let hxres_star = hex::encode(&digest[16..]);

        let kausf = hex::decode(&av.kausf).map_err(|e| {
            log::error!("Kausf decode failed: {e}");
            ProblemDetails::new(500, AV_GENERATION_PROBLEM)
        })?;
        let kseaf = kdf::kdf_kseaf(sn_name, &kausf);

        ue.xres_star = av.xres_star.clone();
        ue.kausf = av.kausf.clone();
        ue.kseaf = hex::encode(kseaf);
        ue.rand = av.rand.clone();

        Ok(Av5gAuthData::Av5gAka(Av5gAka {
            rand: av.rand.clone(),
            hxres_star,
            autn: av.autn.clone(),
        }))
    }

    fn prepare_eap_aka_prime(
        &self,
        ue: &mut AusfUeContext,
        av: &AuthenticationVector,
        sn_name: &str,
    ) -> Result<Av5gAuthData, ProblemDetails> {
        let decode = |field: &str, what: &str| {
            hex::decode(field).map_err(|e| {
                log::error!("{what} decode failed: {e}");
                ProblemDetails::new(500, AV_GENERATION_PROBLEM)
            })
        };

        let ik_prime = decode(&av.ik_prime, "IK'")?;
        let ck_prime = decode(&av.ck_prime, "CK'")?;
        let rand: [u8; 16] = decode(&av.rand, "RAND")?.try_into().map_err(|_| {
            log::error!("RAND has wrong length");
            ProblemDetails::new(500, AV_GENERATION_PROBLEM)
        })?;
        let autn: [u8; 16] = decode(&av.autn, "AUTN")?.try_into().map_err(|_| {
            log::error!("AUTN has wrong length");
            ProblemDetails::new(500, AV_GENERATION_PROBLEM)
        })?;

        let keys = eap::eap_aka_prime_prf(&ik_prime, &ck_prime, &ue.supi);
        let kausf = keys.k_ausf();
        let kseaf = kdf::kdf_kseaf(sn_name, &kausf);

        ue.xres = av.xres.clone();
        ue.rand = av.rand.clone();
        ue.kausf = hex::encode(kausf);
        ue.kseaf = hex::encode(kseaf);
        ue.k_aut = hex::encode(keys.k_aut);

        let identifier: u8 = rand::random();
        let challenge =
            EapPacket::new_aka_challenge(identifier, &rand, &autn, sn_name, &keys.k_aut);

        Ok(Av5gAuthData::EapPayload(BASE64.encode(challenge.encode())))
    }

    /// 5G-AKA confirmation.
    pub async fn auth_5g_aka_confirm(
        &self,
        auth_ctx_id: &str,
        confirmation: ConfirmationData,
    ) -> Result<ConfirmationDataResponse, ProblemDetails> {
        let Some(supi) = self.ctx.supi_from_suci(auth_ctx_id) else {
            log::info!("no SUCI/SUPI pair for {auth_ctx_id}, confirmation failed");
            return Err(ProblemDetails::new(400, USER_NOT_FOUND));
        };
        let Some(ue) = self.ctx.get_ue_context(&supi) else {
            log::info!("no UE context for {supi}, confirmation failed");
            return Err(ProblemDetails::new(400, USER_NOT_FOUND));
        };

        // Terminal states stay terminal; re-confirmation reflects the stored
        // outcome without another comparison or UDM report.
        match ue.auth_status {
            Some(AuthResult::Success) => {
                return Ok(ConfirmationDataResponse {
                    auth_result: AuthResult::Success,
                    supi: Some(supi),
                    kseaf: Some(ue.kseaf),
                });
            }
            Some(AuthResult::Failure) => {
                return Ok(ConfirmationDataResponse {
                    auth_result: AuthResult::Failure,
                    supi: Some(supi),
                    kseaf: None,
                });
            }
            _ => {}
        }

        log::debug!(
            "[{supi}] res*: {}, xres*: {}",
            confirmation.res_star,
            ue.xres_star
        );
        let success = !ue.xres_star.is_empty()
            && confirmation.res_star.eq_ignore_ascii_case(&ue.xres_star);

        let (status, auth_result, kseaf) = if success {
            log::info!("[{supi}] 5G AKA confirmation succeeded");
            (AuthResult::Success, AuthResult::Success, Some(ue.kseaf.clone()))
        } else {
            log::warn!("[{supi}] 5G AKA confirmation failed");
            (AuthResult::Failure, AuthResult::Failure, None)
        };
        self.ctx
            .with_ue_context_mut(&supi, |ue| ue.auth_status = Some(status));

        self.send_auth_result_to_udm(
            &supi,
            AuthType::FiveGAka,
            success,
            &ue.serving_network_name,
            &ue.udm_ueau_url,
        )
        .await
        .map_err(|e| {
            log::error!("[{supi}] auth-event report to UDM failed: {e}");
            ProblemDetails::new(500, UPSTREAM_SERVER_ERROR)
        })?;

        Ok(ConfirmationDataResponse {
            auth_result,
            supi: Some(supi),
            kseaf,
        })
    }

    /// EAP session round.
    pub async fn eap_auth_confirm(
        &self,
        auth_ctx_id: &str,
        session: EapSession,
    ) -> Result<EapSession, ProblemDetails> {
        let Some(supi) = self.ctx.supi_from_suci(auth_ctx_id) else {
            log::info!("no SUCI/SUPI pair for {auth_ctx_id}, confirmation failed");
            return Err(ProblemDetails::new(400, USER_NOT_FOUND));
        };
        let Some(ue) = self.ctx.get_ue_context(&supi) else {
            log::info!("no UE context for {supi}, confirmation failed");
            return Err(ProblemDetails::new(400, USER_NOT_FOUND));
        };

        let payload = BASE64.decode(&session.eap_payload).unwrap_or_default();
        let packet = EapPacket::decode(&payload);

        let packet = match packet {
            Ok(packet) if packet.code == EapCode::Response => packet,
            other => {
                // Not a usable EAP-Response: the attempt fails, but the UE
                // gets one notification round before the final EAP-Failure.
                let (identifier, reason) = match &other {
                    Ok(packet) => (packet.identifier, "eap packet code error"),
                    Err(e) => {
                        log::warn!("[{supi}] EAP payload decode failed: {e}");
                        (payload.get(1).copied().unwrap_or(0), "eap packet decode error")
                    }
                };
                self.fail_eap_round(&supi, &ue, reason).await;
                return Ok(EapSession {
                    eap_payload: BASE64
                        .encode(EapPacket::new_failure_notification(identifier).encode()),
                    auth_result: Some(AuthResult::Ongoing),
                    ..Default::default()
                });
            }
        };

        match ue.auth_status {
            Some(AuthResult::Ongoing) => {
                self.eap_challenge_round(auth_ctx_id, &supi, &ue, &packet)
                    .await
            }
            Some(AuthResult::Failure) => Ok(EapSession {
                eap_payload: BASE64.encode(EapPacket::new_failure(packet.identifier).encode()),
                auth_result: Some(AuthResult::Failure),
                ..Default::default()
            }),
            _ => Ok(EapSession {
                eap_payload: BASE64.encode(EapPacket::new_success(packet.identifier).encode()),
                auth_result: Some(AuthResult::Success),
                supi: Some(supi),
                k_seaf: Some(ue.kseaf.clone()),
                ..Default::default()
            }),
        }
    }

    async fn eap_challenge_round(
        &self,
        auth_ctx_id: &str,
        supi: &str,
        ue: &AusfUeContext,
        packet: &EapPacket,
    ) -> Result<EapSession, ProblemDetails> {
        let k_aut = hex::decode(&ue.k_aut).unwrap_or_default();

        let verified = eap::verify_at_mac(&k_aut, packet);
        let res = packet.res();

        let matches = match (&res, verified) {
            (Ok(res), true) => hex::encode(res).eq_ignore_ascii_case(&ue.xres),
            _ => false,
        };

        if matches {
            log::info!("[{supi}] correct RES value, EAP-AKA' auth succeeded");
            self.ctx
                .with_ue_context_mut(supi, |ue| ue.auth_status = Some(AuthResult::Success));

            self.send_auth_result_to_udm(
                supi,
                AuthType::EapAkaPrime,
                true,
                &ue.serving_network_name,
                &ue.udm_ueau_url,
            )
            .await
            .map_err(|e| {
                log::error!("[{supi}] auth-event report to UDM failed: {e}");
                ProblemDetails::new(500, UPSTREAM_SERVER_ERROR)
            })?;

            Ok(EapSession {
                eap_payload: BASE64.encode(EapPacket::new_success(packet.identifier).encode()),
                auth_result: Some(AuthResult::Success),
                supi: Some(supi.to_string()),
                k_seaf: Some(ue.kseaf.clone()),
            })
        } else {
            let reason = if !verified {
                "AT_MAC verification failed"
            } else if res.is_err() {
                "eap packet decode error"
            } else {
                "wrong RES value, EAP-AKA' auth failed"
            };
            log::warn!("[{auth_ctx_id}] {reason}");
            self.fail_eap_round(supi, ue, reason).await;

            Ok(EapSession {
                eap_payload: BASE64
                    .encode(EapPacket::new_failure_notification(packet.identifier).encode()),
                auth_result: Some(AuthResult::Ongoing),
                supi: Some(supi.to_string()),
                k_seaf: Some(ue.kseaf.clone()),
            })
        }
    }

    /// Mark the attempt failed and report it to UDM; reporting errors are
    /// logged, the UE still gets its notification round.
    async fn fail_eap_round(&self, supi: &str, ue: &AusfUeContext, reason: &str) {
        log::warn!("[{supi}] EAP-AKA' failure: {reason}");
        self.ctx
            .with_ue_context_mut(supi, |ue| ue.auth_status = Some(AuthResult::Failure));
        if let Err(e) = self
            .send_auth_result_to_udm(
                supi,
                AuthType::EapAkaPrime,
                false,
                &ue.serving_network_name,
                &ue.udm_ueau_url,
            )
            .await
        {
            log::warn!("[{supi}] auth-event report to UDM failed: {e}");
        }
    }

    /// Drop the UE context and binding of a finished authentication.
    pub fn delete_auth_context(&self, auth_ctx_id: &str) {
        if let Some(supi) = self.ctx.remove_suci_supi_pair(auth_ctx_id) {
            self.ctx.remove_ue_context(&supi);
            log::info!("removed auth context for {auth_ctx_id}");
        }
    }

    async fn send_auth_result_to_udm(
        &self,
        supi: &str,
        auth_type: AuthType,
        success: bool,
        serving_network_name: &str,
        udm_url: &str,
    ) -> ausf_sbi::SbiResult<()> {
        let event = AuthEvent {
            nf_instance_id: self.ctx.nf_id(),
            success,
            time_stamp: Some(chrono::Utc::now().to_rfc3339()),
            auth_type,
            serving_network_name: serving_network_name.to_string(),
        };
        self.udm.send_auth_event(udm_url, supi, &event).await
    }
}
