//! # Core Module
//!
//! GPU context management, configuration, identity types, and the engine
//! facade that wires the visibility and lighting stages together.

mod context;
mod engine;
mod id;

pub use context::{Context, ContextError};
pub use engine::Engine;
pub use id::Id;

use serde::{Deserialize, Serialize};

/// Configuration for the visibility and lighting core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cluster grid cells along screen X.
    pub cluster_count_x: u32,
    /// Cluster grid cells along screen Y.
    pub cluster_count_y: u32,
    /// Cluster grid depth slices.
    pub cluster_count_z: u32,
    /// Maximum light indices stored per cluster cell.
    pub max_lights_per_cluster: u32,
    /// Maximum unbounded-range lights in the global list.
    pub max_global_lights: u32,
    /// Slots an instance table starts with before doubling.
    pub initial_instance_capacity: u32,
    /// Base resolution of the Hi-Z pyramid (rounded up to a power of two).
    pub hzb_resolution: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster_count_x: 16,
            cluster_count_y: 9,
            cluster_count_z: 24,
            max_lights_per_cluster: 32,
            max_global_lights: 8,
            initial_instance_capacity: 16,
            hzb_resolution: 512,
        }
    }
}

impl Config {
    /// Total number of cluster cells.
    #[inline]
    pub fn cluster_count(&self) -> u32 {
        self.cluster_count_x * self.cluster_count_y * self.cluster_count_z
    }
}
