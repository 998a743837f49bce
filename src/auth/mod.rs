//! Identity module
//!
//! Password hashing, session tokens and the login flow.

mod password;
mod service;
mod token;

pub use password::{PasswordError, PasswordHasher};
pub use service::{AuthError, AuthService};
pub use token::{Claims, TokenError, TokenManager};
