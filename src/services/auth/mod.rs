pub mod factory;
pub mod jwks;
pub mod membership;
pub mod principal;
pub mod verifier;

pub use factory::{build_membership_service, build_token_verifier};
pub use principal::{BearerToken, Caller, VerifiedPrincipal};
pub use verifier::{TokenVerifier, VerifierSettings, VerifyError};
