//! check-relay-core: Platform-agnostic core of the check-run relay
//!
//! Holds the credential broker (GitHub App JWT and installation token
//! issuance), the check-run relay pipeline and the allow list. It depends
//! only on abstract platform traits (HttpClient, Clock, Environment,
//! JwtSigner) and never imports server code.

pub mod allow_list;
pub mod config;
pub mod error;
pub mod github;
pub mod platform;
pub mod relay;

#[cfg(test)]
pub mod test_support;
