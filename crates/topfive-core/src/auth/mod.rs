mod credential_store;
mod error;
mod manager;
mod session;
mod sign_out;

pub use credential_store::{
    CredentialKey, CredentialStore, FileCredentialStore, MemoryCredentialStore,
};
pub use error::AuthError;
pub use manager::{SessionManager, SessionState};
pub use session::SessionCredentials;
pub use sign_out::SignOutHook;
