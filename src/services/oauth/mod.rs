pub mod credential_store;
pub mod endpoints;
pub mod registrar;
pub mod session;
pub mod token;

pub use credential_store::CredentialStore;
pub use endpoints::RealmEndpoints;
pub use registrar::{ClientRegistration, ClientSecret, CredentialRegistrar, RegistrationError};
pub use session::{ClientSession, RegistrationSource};
pub use token::{AccessToken, TokenAcquirer, TokenAcquisitionError};
