//! # Culling Module
//!
//! GPU visibility: a hierarchical depth pyramid built from occluder-only
//! depth, and a per-mesh culling pass that streams instance tables through
//! frustum and occlusion tests, compacting survivors into a dense buffer
//! with an asynchronously-readable count.
//!
//! ## Per-camera ordering
//!
//! 1. Cull occluder meshes (frustum only) and resolve their counts
//! 2. Render occluder depth, then reduce it into the Hi-Z mip chain
//! 3. Cull every mesh (frustum + Hi-Z for non-occluders)
//! 4. Resolve survivor counts and draw
//!
//! Step 4 blocks on the GPU if a counter is not ready yet, so callers
//! record every cull before resolving any count.

mod cull;
mod hzb;
mod readback;

pub use cull::{CullPhase, CullStage};
pub use hzb::{HzbPyramid, OccluderDraw};
pub use readback::SurvivorCount;
