//! HTTP request handlers for the Todo API.

pub mod fallback;
pub mod health;
pub mod metrics;
pub mod todolist;

pub use fallback::route_not_found;
pub use health::health_check;
pub use metrics::metrics_handler;
pub use todolist::{get_todolist, put_todolist};
