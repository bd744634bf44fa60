pub mod api;
pub mod builtin;
pub mod config;
pub mod diagnostic;
pub mod ir;
pub mod number;
pub mod program;
pub mod span;
pub mod transform;
pub mod types;
pub mod writer;

// Re-exports: short paths for the common entry points
pub use config::target;
pub use diagnostic::{render_diagnostics, Diagnostic};
pub use program::{Program, ProgramBuilder};

// Re-export public API: `glint::compile()` etc.
pub use api::*;
