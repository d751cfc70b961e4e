//! Vitrine Engine library.
//!
//! Server-side pipeline for product scene images, image-to-video jobs,
//! motif compositing and consistency verification.
//!
//! ## Structure
//!
//! - `use_cases/` - Generation workflows over the ports
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `api/` - HTTP entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
