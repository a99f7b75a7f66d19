pub mod refresh;
pub mod rotation;
pub mod session;

pub use refresh::{RefreshRequest, RefreshResponse, RefreshSession};
pub use rotation::RotationProtocol;
pub use session::{LoginRequest, LoginResponse, LoginWithProvider};
