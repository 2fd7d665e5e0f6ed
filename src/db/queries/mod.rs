//! Database queries

pub mod assignment;
pub mod reference;
pub mod upload;
