//! Data Transfer Objects for REST request/response serialization.

pub mod device_dto;
pub mod mail_dto;

pub use device_dto::*;
pub use mail_dto::*;
