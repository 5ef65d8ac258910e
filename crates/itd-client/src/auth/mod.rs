pub mod token;
mod session;
mod store;

pub use session::{Session, SessionState};
pub use store::{FileTokenStore, StoreError, StoredCredentials, TokenStorage};
pub use token::{add_bearer, decode, is_expired, MalformedToken, TokenClaims, EXPIRED_SENTINEL};
