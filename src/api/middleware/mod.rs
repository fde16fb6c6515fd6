//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Auth validator: bearer token → identity → session with role
//! 2. Access logger: logs after auth, has the user id

pub mod audit;
pub mod auth;
