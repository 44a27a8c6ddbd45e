//! Outbound SBI consumers: NRF management, NRF discovery and the UDM
//! authentication service.

pub mod nf_discovery;
pub mod nf_management;
pub mod udm;

pub use nf_discovery::{get_udm_url, search_nf_instances};
pub use nf_management::{
    build_nf_profile, HttpNrfClient, NfRegistrationOutcome, NrfClient, SearchOutcome,
};
pub use udm::{HttpUdmClient, UdmClient};
