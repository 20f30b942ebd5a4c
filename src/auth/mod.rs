//! Authentication module
//!
//! One exchange call per process lifetime: installation token + application
//! id/secret are traded for a bearer token that every subsequent request
//! reuses. The `TokenCache` guards the exchange so concurrent first access
//! still performs exactly one outbound call.

mod token;

pub use token::{Credentials, TokenCache};
