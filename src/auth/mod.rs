pub mod credentials;
pub mod guard;
pub mod session;
pub mod token;

pub use credentials::CredentialStore;
pub use guard::{AuthGuard, CurrentUser};
pub use token::{TokenCodec, TokenError};
