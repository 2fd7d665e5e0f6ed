//! Type definitions

pub mod assignment;
pub mod messages;
pub mod upload;

pub use assignment::*;
pub use messages::*;
pub use upload::*;
