pub mod models;
pub mod handlers;
pub mod router;
pub mod services;

#[cfg(test)]
mod test_support;

pub use models::*;
pub use router::appointment_routes;
