//! HTTP access to the registration API and to the proxy directory.

pub mod http;
pub mod proxy;
