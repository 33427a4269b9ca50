pub mod cors;
pub mod middleware;
pub mod policy;

pub use cors::cors_layer;
pub use middleware::authorize;
pub use policy::{Access, SecurityPolicy};
