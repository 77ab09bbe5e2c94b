//! Transport-independent session logic

pub mod session;

pub use session::{DetectionSession, SessionStream};
