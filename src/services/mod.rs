//! Business logic services

pub mod assembler;
pub mod intake;
pub mod store;
pub mod upload_pipeline;
pub mod validator;
