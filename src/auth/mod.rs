//! Credential handling for the UniMiB login
//!
//! The login flow itself lives in [`crate::app::client::auth`]; this module
//! only decides which username and password to use.

pub mod credentials;

pub use credentials::{get_auth_status, resolve_credentials, AuthStatus, Credentials};
