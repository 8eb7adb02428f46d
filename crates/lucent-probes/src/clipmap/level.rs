use crate::topology::*;
use crate::units::ProbeUnits;

use lucent_core::glam::{DVec3, IVec3};

/// Geometry of one clipmap level. The probe data itself lives in flat per-level arrays indexed by storage linear index;
/// this type only knows how to find it.
#[derive(Clone, Debug)]
pub struct ClipmapLevel {
    level: u32,
    resolution: u32,
    /// `None` until the first `update_origins`.
    placement: Option<Placement>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Placement {
    pub spacing: f64,
    pub anchor_cell: IVec3,
    pub anchor: DVec3,
    pub origin: DVec3,
    pub ring_offset: IVec3,
}

/// A copy of a level's placement, for diagnostics and for consumers of the probe data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipmapLevelParams {
    pub level: u32,
    pub resolution: u32,
    pub spacing: f64,
    pub anchor: DVec3,
    pub origin: DVec3,
    pub ring_offset: IVec3,
}

impl ClipmapLevel {
    pub(crate) fn new(level: u32, resolution: u32) -> Self {
        Self {
            level,
            resolution,
            placement: None,
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn volume(&self) -> u32 {
        self.resolution * self.resolution * self.resolution
    }

    pub fn is_placed(&self) -> bool {
        self.placement.is_some()
    }

    pub(crate) fn placement(&self) -> Option<&Placement> {
        self.placement.as_ref()
    }

    pub(crate) fn set_placement(&mut self, placement: Placement) {
        debug_assert!(index_in_bounds(placement.ring_offset, self.resolution as i32));
        self.placement = Some(placement);
    }

    pub fn params(&self) -> Option<ClipmapLevelParams> {
        self.placement.map(|p| ClipmapLevelParams {
            level: self.level,
            resolution: self.resolution,
            spacing: p.spacing,
            anchor: p.anchor,
            origin: p.origin,
            ring_offset: p.ring_offset,
        })
    }

    pub fn ring_offset(&self) -> IVec3 {
        self.placement.map_or(IVec3::ZERO, |p| p.ring_offset)
    }

    pub fn local_to_storage(&self, local_index: IVec3) -> IVec3 {
        local_to_storage(local_index, self.ring_offset(), self.resolution as i32)
    }

    pub fn storage_to_local(&self, storage_index: IVec3) -> IVec3 {
        storage_to_local(storage_index, self.ring_offset(), self.resolution as i32)
    }

    pub fn linearize(&self, storage_index: IVec3) -> u32 {
        linearize(&storage_shape(self.resolution), storage_index)
    }

    pub fn delinearize(&self, linear_index: u32) -> IVec3 {
        delinearize(&storage_shape(self.resolution), linear_index)
    }

    /// Storage linear index of the probe at `local_index`.
    pub fn local_to_linear(&self, local_index: IVec3) -> u32 {
        self.linearize(self.local_to_storage(local_index))
    }

    pub fn probe_center(&self, local_index: IVec3) -> Option<DVec3> {
        self.placement
            .map(|p| index_to_probe_center_world(local_index, p.origin, p.spacing))
    }

    pub fn world_to_local(&self, world: DVec3) -> Option<ProbeUnits<DVec3>> {
        self.placement
            .map(|p| world_to_local(world, p.origin, p.spacing))
    }

    pub fn contains_local(&self, local_index: IVec3) -> bool {
        index_in_bounds(local_index, self.resolution as i32)
    }
}
