pub mod header_validator;
pub mod identity;
pub mod middleware;

pub use header_validator::HeaderValidator;
pub use identity::AuthenticatedUser;
pub use middleware::security_middleware;
