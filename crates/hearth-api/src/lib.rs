pub mod auth;
pub mod error;
pub mod messages;

pub use auth::{AuthOutcome, AuthService};
pub use error::ApiError;
pub use messages::MessageRouter;
