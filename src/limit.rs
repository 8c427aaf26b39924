//! Client-side rate limiting: fixed per-operation policies evaluated against sliding windows.

pub mod policy;
pub mod window;

pub use policy::*;
pub use window::*;
