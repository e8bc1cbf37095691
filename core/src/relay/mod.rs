//! Relay handlers
//!
//! Request pipelines that act on a tenant's behalf.

pub mod check_run;
