pub mod assistant;
pub mod connection_form;
pub mod error;
pub mod feedback;
pub mod provider_policy;
pub mod session;
pub mod settings;
