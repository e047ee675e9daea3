//! Identity slice: user registration, password hashing and session tokens.
//!
//! [`SessionManager`] is the entry point. The auth middleware calls
//! [`SessionManager::parse_token`] on every request and injects the resulting
//! [`Principal`](keeper_domain::identity::Principal) into the request context.

mod error;
mod password;
mod repository;
mod session;
mod token;

pub use error::{IdentityError, IdentityErrorExt};
pub use repository::UserRepository;
pub use session::{SessionManager, SessionManagerBuilder};
pub use token::Claims;
