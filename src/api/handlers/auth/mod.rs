//! Authentication: registration with email OTP, password and Google login,
//! forgot-password reset, and stateless session cookies.

pub mod forgot;
pub mod google;
pub mod login;
pub mod password;
pub mod register;
pub mod session;
pub mod state;
mod storage;
pub mod token;
pub mod types;
mod utils;

pub use state::{AuthConfig, AuthState};
pub(crate) use session::require_auth;
