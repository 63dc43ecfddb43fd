// ── Authentication ──
//
// Credential persistence, the interactive authorization flow, and the
// session that validates and tracks the active credential.

mod flow;
mod session;
mod store;

pub use flow::AuthorizationFlow;
pub use session::{AuthEvent, AuthSession, AuthState};
pub use store::{
    FileTokenStore, MemoryTokenStore, StoredCredential, TOKEN_NAMESPACE, TokenStore,
};
