pub mod error;
pub mod family;
pub mod provider;
pub mod repository;
pub mod token;
pub mod user;

pub use error::AuthError;
pub use family::TokenFamily;
pub use provider::{OAuthProvider, OAuthProviderClient, ProviderUser};
pub use repository::{RefreshTokenStore, TokenFamilyRegistry};
pub use token::{ClientMeta, NewRefreshToken, RefreshTokenRecord, RevocationReason, RotateOutcome};
pub use user::{AccountDirectory, ProviderGrant, RoleDirectory};
