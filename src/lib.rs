pub mod config;
pub mod domain {
    pub mod callback;
    pub mod request;
    pub mod response;
}
pub mod error;
pub mod gateways;
pub mod registry;
pub mod service {
    pub mod retry_policy;
}
pub mod transport;
pub mod verification;
