pub mod middleware;
pub mod repository;

pub use middleware::{bad_token_definition_envelope, unauthenticated_envelope, AuthMiddleware, AuthOutcome};
pub use repository::{AuthContext, AuthRepository, CredentialKind};
