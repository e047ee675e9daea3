//! Axum glue shared by every HTTP-facing slice.

mod extract;
mod health;
mod response;
mod router;

pub use router::system_router;
