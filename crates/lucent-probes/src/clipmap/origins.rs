use super::level::Placement;
use super::WorldProbeScheduler;
use crate::topology::*;

use itertools::iproduct;
use lucent_core::glam::{DVec3, IVec3};

/// A level's window moved. Storage slots of probes that stayed inside the window keep their data; the slots of probes
/// that entered the window were reset to `Empty`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorShifted {
    pub level: u32,
    /// Whole-probe movement of the window, `round((new_origin - prev_origin) / spacing)`.
    pub delta_probes: IVec3,
    pub prev_anchor: DVec3,
    pub new_anchor: DVec3,
    pub prev_origin: DVec3,
    pub new_origin: DVec3,
    pub prev_ring_offset: IVec3,
    pub new_ring_offset: IVec3,
}

impl WorldProbeScheduler {
    /// Re-centers every level on `camera`.
    ///
    /// Levels whose anchor did not change are untouched. When a level's window moves by `delta` probes, its ring offset
    /// advances by the same `delta`, so a probe that was at local index `i` (now `i - delta`) keeps its storage slot. The
    /// slab of newly exposed probes on the leading faces is reset to `Empty`, which gives it the highest update priority.
    /// A jump of a whole window or more, or a change of `base_spacing`, resets the level.
    pub fn update_origins(
        &mut self,
        camera: DVec3,
        base_spacing: f64,
        mut on_shift: impl FnMut(AnchorShifted),
    ) {
        if !(base_spacing > 0.0 && base_spacing.is_finite()) || !dvec3_is_finite(camera) {
            log::trace!(
                "Ignoring origin update for camera {:?} with base spacing {}",
                camera,
                base_spacing
            );
            return;
        }

        let resolution = self.config.resolution;
        let res = resolution as i32;

        for level_index in 0..self.levels.len() {
            let level = level_index as u32;
            let spacing = level_spacing(base_spacing, level);
            let new_cell = anchor_cell(camera, spacing);
            let new_anchor = ivec3_to_dvec3(new_cell) * spacing;
            let new_origin = origin_min_corner(new_anchor, spacing, resolution);

            let prev = match self.levels[level_index].placement().copied() {
                Some(prev) if prev.spacing == spacing => prev,
                other => {
                    if let Some(prev) = other {
                        log::debug!(
                            "Level {} spacing changed from {} to {}; resetting",
                            level,
                            prev.spacing,
                            spacing
                        );
                    }
                    self.levels[level_index].set_placement(Placement {
                        spacing,
                        anchor_cell: new_cell,
                        anchor: new_anchor,
                        origin: new_origin,
                        ring_offset: IVec3::ZERO,
                    });
                    self.reset_level_slots(level);
                    continue;
                }
            };

            if prev.anchor_cell == new_cell {
                continue;
            }

            let d = (new_origin - prev.origin) / spacing;
            let delta = IVec3::new(d.x.round() as i32, d.y.round() as i32, d.z.round() as i32);
            let full_reset = delta.x.abs().max(delta.y.abs()).max(delta.z.abs()) >= res;
            let new_ring_offset = if full_reset {
                IVec3::ZERO
            } else {
                wrap_index3(prev.ring_offset + delta, res)
            };

            self.levels[level_index].set_placement(Placement {
                spacing,
                anchor_cell: new_cell,
                anchor: new_anchor,
                origin: new_origin,
                ring_offset: new_ring_offset,
            });

            if full_reset {
                log::debug!("Level {} jumped {:?} probes; resetting", level, delta);
                self.reset_level_slots(level);
            } else {
                log::debug!(
                    "Level {} shifted {:?} probes, ring offset {:?} -> {:?}",
                    level,
                    delta,
                    prev.ring_offset,
                    new_ring_offset
                );
                self.reset_exposed_slabs(level, delta);
            }

            on_shift(AnchorShifted {
                level,
                delta_probes: delta,
                prev_anchor: prev.anchor,
                new_anchor,
                prev_origin: prev.origin,
                new_origin,
                prev_ring_offset: prev.ring_offset,
                new_ring_offset,
            });
        }
    }

    /// Resets the probes whose local indices were outside of the window before it moved by `delta`. Must run after the
    /// new ring offset is in place.
    fn reset_exposed_slabs(&mut self, level: u32, delta: IVec3) {
        let res = self.config.resolution as i32;
        let delta = delta.to_array();
        for axis in 0..3 {
            let d = delta[axis];
            let slab = if d > 0 {
                (res - d)..res
            } else if d < 0 {
                0..-d
            } else {
                continue;
            };
            for (a, u, v) in iproduct!(slab, 0..res, 0..res) {
                let mut local = [0; 3];
                local[axis] = a;
                local[(axis + 1) % 3] = u;
                local[(axis + 2) % 3] = v;
                let linear = self.levels[level as usize].local_to_linear(IVec3::from(local));
                self.reset_slot(level, linear);
            }
        }
    }
}
