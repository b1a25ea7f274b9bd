//! Data Transfer Objects (DTOs) for API requests and responses

pub mod call;
pub mod common;
pub mod session;

pub use call::*;
pub use common::*;
pub use session::*;
