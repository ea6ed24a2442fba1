//! # Lights Module
//!
//! Light records, the view-frustum cluster grid, and the per-frame
//! assignment pass that decides which lights can affect which grid cells.
//! Unbounded-range lights (ambient, directional) bypass the grid into a
//! small global list; finite-range lights are tested geometrically against
//! the cells they might touch.

mod assign;
mod cluster_grid;

pub use assign::{ClusterLightBuffers, LightAssignment};
pub use cluster_grid::{ClusterCell, ClusterGrid};

use crate::math::Vector3;
use bytemuck::{Pod, Zeroable};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use thiserror::Error;

/// Errors reported by the light set.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LightError {
    /// The slot does not refer to a registered light.
    #[error("light slot {0} is not registered")]
    UnknownSlot(u32),
}

/// Light type identifier, shared with the shading code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LightKind {
    /// Ambient fill, unbounded range.
    Ambient = 0,
    /// Directional (sun-like), unbounded range.
    Directional = 1,
    /// Point light, finite range.
    Point = 2,
    /// Spot light, finite range with a cone.
    Spot = 3,
}

/// A light as the scene layer describes it.
#[derive(Debug, Clone)]
pub struct Light {
    /// Light type.
    pub kind: LightKind,
    /// World-space position (point/spot) or unused (ambient/directional).
    pub position: Vector3,
    /// World-space direction (directional/spot).
    pub direction: Vector3,
    /// Linear-space color.
    pub color: [f32; 3],
    /// Intensity multiplier.
    pub intensity: f32,
    /// Effective range for finite lights.
    pub range: f32,
    /// Outer cone half-angle in radians (spot only).
    pub outer_angle: f32,
    /// Inner cone half-angle in radians (spot only).
    pub inner_angle: f32,
}

impl Light {
    /// Whether the light's range is unbounded, which routes it into the
    /// global list instead of the cluster grid.
    #[inline]
    pub fn is_global(&self) -> bool {
        matches!(self.kind, LightKind::Ambient | LightKind::Directional)
    }
}

/// GPU-packed light parameters (64 bytes), indexed by light slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightParams {
    /// Position (xyz) and kind (w, as bits).
    pub position: [f32; 4],
    /// Direction (xyz) and range (w).
    pub direction: [f32; 4],
    /// Color (rgb) and intensity (a).
    pub color: [f32; 4],
    /// `cos(outer), cos(inner), enabled, pad`.
    pub cone: [f32; 4],
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            position: [0.0; 4],
            direction: [0.0, -1.0, 0.0, 0.0],
            color: [0.0; 4],
            cone: [0.0; 4],
        }
    }
}

impl LightParams {
    fn from_light(light: &Light) -> Self {
        Self {
            position: [
                light.position.x,
                light.position.y,
                light.position.z,
                f32::from_bits(light.kind as u32),
            ],
            direction: [
                light.direction.x,
                light.direction.y,
                light.direction.z,
                light.range,
            ],
            color: [light.color[0], light.color[1], light.color[2], light.intensity],
            cone: [light.outer_angle.cos(), light.inner_angle.cos(), 1.0, 0.0],
        }
    }
}

/// The set of active lights, with stable integer slots.
///
/// Released slots are recycled through a free-list owned by the set, lowest
/// slot first, so the packed parameter array the shading code indexes stays
/// dense near the front.
pub struct LightSet {
    slots: Vec<Option<Light>>,
    free: BinaryHeap<Reverse<u32>>,
    live_count: u32,
}

impl Default for LightSet {
    fn default() -> Self {
        Self::new()
    }
}

impl LightSet {
    /// Create an empty light set.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: BinaryHeap::new(),
            live_count: 0,
        }
    }

    /// Register a light, returning its stable slot.
    pub fn add(&mut self, light: Light) -> u32 {
        self.live_count += 1;
        match self.free.pop() {
            Some(Reverse(slot)) => {
                self.slots[slot as usize] = Some(light);
                slot
            }
            None => {
                self.slots.push(Some(light));
                (self.slots.len() - 1) as u32
            }
        }
    }

    /// Update a registered light in place.
    pub fn update(&mut self, slot: u32, light: Light) -> Result<(), LightError> {
        match self.slots.get_mut(slot as usize) {
            Some(entry) if entry.is_some() => {
                *entry = Some(light);
                Ok(())
            }
            _ => Err(LightError::UnknownSlot(slot)),
        }
    }

    /// Release a slot. Releasing an empty slot is a bookkeeping bug and is
    /// reported, never ignored.
    pub fn remove(&mut self, slot: u32) -> Result<(), LightError> {
        match self.slots.get_mut(slot as usize) {
            Some(entry) if entry.is_some() => {
                *entry = None;
                self.free.push(Reverse(slot));
                self.live_count -= 1;
                Ok(())
            }
            _ => Err(LightError::UnknownSlot(slot)),
        }
    }

    /// Number of registered lights.
    #[inline]
    pub fn live_count(&self) -> u32 {
        self.live_count
    }

    /// Number of slots in the packed parameter array.
    #[inline]
    pub fn slot_count(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Look up a light by slot.
    #[inline]
    pub fn get(&self, slot: u32) -> Option<&Light> {
        self.slots.get(slot as usize).and_then(|s| s.as_ref())
    }

    /// Iterate registered lights with their slots.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Light)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, light)| light.as_ref().map(|l| (slot as u32, l)))
    }

    /// Pack the parameter array for upload; empty slots pack as disabled.
    pub fn pack_params(&self) -> Vec<LightParams> {
        self.slots
            .iter()
            .map(|slot| match slot {
                Some(light) => LightParams::from_light(light),
                None => LightParams::default(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_light() -> Light {
        Light {
            kind: LightKind::Point,
            position: Vector3::ZERO,
            direction: Vector3::new(0.0, -1.0, 0.0),
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            range: 10.0,
            outer_angle: 0.0,
            inner_angle: 0.0,
        }
    }

    #[test]
    fn test_slot_recycling() {
        let mut set = LightSet::new();
        let a = set.add(point_light());
        let b = set.add(point_light());
        let c = set.add(point_light());
        assert_eq!((a, b, c), (0, 1, 2));

        set.remove(b).unwrap();
        assert_eq!(set.live_count(), 2);

        // The freed slot is reused before the array grows.
        let d = set.add(point_light());
        assert_eq!(d, 1);
        assert_eq!(set.slot_count(), 3);
    }

    #[test]
    fn test_remove_unknown_slot_is_reported() {
        let mut set = LightSet::new();
        let slot = set.add(point_light());
        assert_eq!(set.remove(99), Err(LightError::UnknownSlot(99)));
        set.remove(slot).unwrap();
        assert_eq!(set.remove(slot), Err(LightError::UnknownSlot(slot)));
    }

    #[test]
    fn test_pack_params_keeps_holes_disabled() {
        let mut set = LightSet::new();
        let a = set.add(point_light());
        set.add(point_light());
        set.remove(a).unwrap();

        let params = set.pack_params();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].cone[2], 0.0);
        assert_eq!(params[1].cone[2], 1.0);
    }
}
