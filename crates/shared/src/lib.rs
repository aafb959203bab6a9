pub mod domain;
pub mod error;
pub mod message;
pub mod protocol;
pub mod wire;
