//! # Frame Module
//!
//! Per-frame orchestration: routing meshes into render streams by material
//! blend mode, the two-phase cull-then-draw pipeline, instanced draws over
//! compacted survivor buffers, and weighted-blended transparency.

mod draw;
mod oit;
mod plan;

pub use draw::{DrawStage, FrameTargets};
pub use oit::OitTargets;
pub use plan::{CameraState, DrawItem, FramePlan, PendingDraw};

/// Material blend classification from the material layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Fully opaque surface.
    Opaque,
    /// Alpha-tested surface (foliage, fences).
    Cutoff,
    /// Additive blending (fire, glows).
    Additive,
    /// Multiplicative blending (tinted glass, shadows decals).
    Multiplicative,
    /// Sorted-independent transparency via weighted accumulation.
    Transparent,
}

/// Which stream a mesh renders through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStream {
    /// Depth-tested opaque stream; writes depth.
    Culled,
    /// Blended stream drawn after opaques; reads depth.
    Blended,
    /// Weighted accumulation/reveal transparency stream.
    Transparent,
}

impl BlendMode {
    /// The render stream this mode routes into.
    pub fn stream(&self) -> RenderStream {
        match self {
            BlendMode::Opaque | BlendMode::Cutoff => RenderStream::Culled,
            BlendMode::Additive | BlendMode::Multiplicative => RenderStream::Blended,
            BlendMode::Transparent => RenderStream::Transparent,
        }
    }
}

/// Statistics for one rendered frame.
#[derive(Debug, Clone, Default)]
pub struct FrameInfo {
    /// Frame number.
    pub frame: u64,
    /// Draw calls issued.
    pub draw_calls: u32,
    /// Instances drawn after culling.
    pub instances_drawn: u32,
    /// Instances rejected by the culling pass.
    pub instances_culled: u32,
    /// Meshes skipped entirely (no survivors).
    pub meshes_skipped: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_mode_routing() {
        assert_eq!(BlendMode::Opaque.stream(), RenderStream::Culled);
        assert_eq!(BlendMode::Cutoff.stream(), RenderStream::Culled);
        assert_eq!(BlendMode::Additive.stream(), RenderStream::Blended);
        assert_eq!(BlendMode::Multiplicative.stream(), RenderStream::Blended);
        assert_eq!(BlendMode::Transparent.stream(), RenderStream::Transparent);
    }
}
