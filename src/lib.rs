//! # Sightline - Visibility & Lighting Core
//!
//! Sightline is the visibility-and-lighting heart of a real-time renderer
//! built on wgpu. Every frame it decides which object instances are worth
//! drawing and which lights affect which screen regions:
//!
//! - **Instances**: per-mesh slot allocators with GPU-mirrored tables
//! - **Culling**: a Hi-Z depth pyramid driving two-phase frustum plus
//!   occlusion culling as GPU stream compaction, with asynchronously
//!   readable survivor counts
//! - **Lights**: a view-frustum cluster grid with parallel light
//!   assignment into bounded per-cell lists
//! - **Frame**: the explicit cull-then-draw pipeline, instanced draws, and
//!   weighted-blended transparency
//!
//! ## Frame shape
//!
//! [`core::Engine`] owns the stages and runs them in the required order:
//!
//! ```ignore
//! use sightline::prelude::*;
//!
//! let mut engine = Engine::new(ctx, Config::default(), width, height);
//! let slot = engine.attach(mesh_id, &mesh_source, owner_id, &world);
//! engine.add_light(sun);
//!
//! // Every frame: cull everything, assign lights, then read survivor
//! // counts and draw.
//! let info = engine.render_frame(&camera, &items, &targets);
//! ```
//!
//! The stages are public, so a renderer with its own frame graph can call
//! [`frame::FramePlan::submit_visibility`] and
//! [`frame::FramePlan::submit_draws`] around its own passes instead.

#![warn(missing_docs)]

pub mod camera;
pub mod core;
pub mod culling;
pub mod frame;
pub mod instances;
pub mod lights;
pub mod math;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types.

    pub use crate::camera::*;
    pub use crate::core::*;
    pub use crate::culling::*;
    pub use crate::frame::*;
    pub use crate::instances::*;
    pub use crate::lights::*;
    pub use crate::math::*;
}

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = "Sightline";
