//! HTTP surface of the service.

pub mod ask;
pub mod health;
pub mod request_id;
