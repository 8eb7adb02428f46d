//! Pure coordinate math for a probe clipmap.
//!
//! Every level of the clipmap is a cube of `resolution³` probes with spacing `base_spacing · 2^level`. The cube follows the
//! camera by snapping an *anchor* to the level's grid and placing the cube's minimum corner (the *origin*) half a cube away
//! from it. Probe `i` of a level (its *local index*) sits at the center of grid cell `i`, and its data lives in the storage
//! slot `wrap(i + ring_offset)`, so moving the window only changes the ring offset.

use crate::units::ProbeUnits;

use lucent_core::glam::{DVec3, IVec3, Vec3A};
use ndshape::{RuntimeShape, Shape};

/// Spacing between adjacent probes on `level`.
pub fn level_spacing(base_spacing: f64, level: u32) -> f64 {
    base_spacing * 2f64.powi(level as i32)
}

/// The integer grid cell that contains `camera`, for a grid of the given `spacing`.
///
/// The result is corrected so that `cell · spacing <= camera < (cell + 1) · spacing` holds for the actual floating point
/// products, which a plain `floor(camera / spacing)` does not guarantee.
pub fn anchor_cell(camera: DVec3, spacing: f64) -> IVec3 {
    let snap_axis = |c: f64| {
        let mut cell = (c / spacing).floor();
        if cell * spacing > c {
            cell -= 1.0;
        } else if c - cell * spacing >= spacing {
            cell += 1.0;
        }
        cell as i32
    };
    IVec3::new(snap_axis(camera.x), snap_axis(camera.y), snap_axis(camera.z))
}

/// Per-axis floor of `camera` to the grid of the given `spacing`.
pub fn snap_anchor(camera: DVec3, spacing: f64) -> DVec3 {
    ivec3_to_dvec3(anchor_cell(camera, spacing)) * spacing
}

/// The minimum corner of a level whose anchor is `anchor`. Keeps the anchor (and so the camera) near the grid center.
pub fn origin_min_corner(anchor: DVec3, spacing: f64, resolution: u32) -> DVec3 {
    anchor - DVec3::splat(spacing * resolution as f64 / 2.0)
}

pub fn world_to_local(world: DVec3, origin: DVec3, spacing: f64) -> ProbeUnits<DVec3> {
    ProbeUnits((world - origin) / spacing)
}

pub fn local_to_index_floor(local: ProbeUnits<DVec3>) -> IVec3 {
    floor_to_ivec3(local.into_inner())
}

/// The fractional position inside the grid cell containing `local`. Probe centers are at `(0.5, 0.5, 0.5)`.
pub fn local_to_frac(local: ProbeUnits<DVec3>) -> DVec3 {
    let ProbeUnits(local) = local;
    local - ivec3_to_dvec3(floor_to_ivec3(local))
}

/// World position of the probe with local index `index`.
pub fn index_to_probe_center_world(index: IVec3, origin: DVec3, spacing: f64) -> DVec3 {
    origin + (ivec3_to_dvec3(index) + DVec3::splat(0.5)) * spacing
}

/// Positive modulo; the result is always in `[0, resolution)`.
#[inline]
pub fn wrap_index(v: i32, resolution: i32) -> i32 {
    v.rem_euclid(resolution)
}

#[inline]
pub fn wrap_index3(v: IVec3, resolution: i32) -> IVec3 {
    IVec3::new(
        wrap_index(v.x, resolution),
        wrap_index(v.y, resolution),
        wrap_index(v.z, resolution),
    )
}

/// The storage slot that holds the probe at `local_index`.
#[inline]
pub fn local_to_storage(local_index: IVec3, ring_offset: IVec3, resolution: i32) -> IVec3 {
    wrap_index3(local_index + ring_offset, resolution)
}

/// Inverse of [`local_to_storage`].
#[inline]
pub fn storage_to_local(storage_index: IVec3, ring_offset: IVec3, resolution: i32) -> IVec3 {
    wrap_index3(storage_index - ring_offset, resolution)
}

#[inline]
pub fn index_in_bounds(index: IVec3, resolution: i32) -> bool {
    index.x >= 0
        && index.y >= 0
        && index.z >= 0
        && index.x < resolution
        && index.y < resolution
        && index.z < resolution
}

/// The X-fastest linearization used by the flat per-level storage arrays.
pub fn storage_shape(resolution: u32) -> RuntimeShape<u32, 3> {
    RuntimeShape::<u32, 3>::new([resolution; 3])
}

pub fn linearize(shape: &RuntimeShape<u32, 3>, storage_index: IVec3) -> u32 {
    shape.linearize([
        storage_index.x as u32,
        storage_index.y as u32,
        storage_index.z as u32,
    ])
}

pub fn delinearize(shape: &RuntimeShape<u32, 3>, linear_index: u32) -> IVec3 {
    let [x, y, z] = shape.delinearize(linear_index);
    IVec3::new(x as i32, y as i32, z as i32)
}

/// Minimum distance from `local` to any face of the level's bounds `[0, resolution]³`. Negative outside of the grid.
pub fn distance_to_boundary_probe_units(local: ProbeUnits<DVec3>, resolution: u32) -> f64 {
    let ProbeUnits(local) = local;
    let res = resolution as f64;
    [local.x, local.y, local.z]
        .iter()
        .map(|&c| c.min(res - c))
        .fold(f64::INFINITY, f64::min)
}

/// Weight of the finer level when blending across a level boundary. `edge_dist` is the distance to that level's boundary;
/// the weight ramps from 0 at `start` to 1 at `start + width`. A non-positive `width` is a hard cut at `start`.
pub fn cross_level_blend_weight(edge_dist: f64, start: f64, width: f64) -> f64 {
    if width <= 0.0 {
        return if edge_dist >= start { 1.0 } else { 0.0 };
    }
    ((edge_dist - start) / width).clamp(0.0, 1.0)
}

/// Finest level whose window still covers `distance` (from the camera) with at least one probe of margin, for
/// trilinear filtering. Falls back to the coarsest level. Monotonic non-decreasing in `distance`.
pub fn select_level_by_distance(
    distance: f64,
    base_spacing: f64,
    resolution: u32,
    level_count: u32,
) -> u32 {
    let half_extent_probes = (resolution as f64 / 2.0 - 1.0).max(0.5);
    let last = level_count.saturating_sub(1);
    for level in 0..last {
        if distance <= level_spacing(base_spacing, level) * half_extent_probes {
            return level;
        }
    }
    last
}

pub fn ivec3_to_dvec3(v: IVec3) -> DVec3 {
    DVec3::new(v.x as f64, v.y as f64, v.z as f64)
}

pub fn floor_to_ivec3(v: DVec3) -> IVec3 {
    IVec3::new(v.x.floor() as i32, v.y.floor() as i32, v.z.floor() as i32)
}

pub fn dvec3_to_vec3a(v: DVec3) -> Vec3A {
    Vec3A::new(v.x as f32, v.y as f32, v.z as f32)
}

pub fn dvec3_is_finite(v: DVec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
