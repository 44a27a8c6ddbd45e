//! Inbound SBI procedures: UE authentication and the NF status callback.

pub mod callback;
pub mod ue_authentication;

pub use callback::nf_subscription_status_notify;
pub use ue_authentication::UeAuthEngine;
