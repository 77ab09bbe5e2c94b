// CCTV Relay API Library
//
// HTTP routes and the live detection session

pub mod http;
pub mod impls;

pub use http::{create_router, AppState};
