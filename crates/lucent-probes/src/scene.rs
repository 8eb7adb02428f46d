use crate::world::{BlockWorld, LightRgbs};

use lucent_core::geometry::BoxIntersection;
use lucent_core::glam::{IVec3, Vec3A};
use lucent_core::ilattice::prelude::Extent;
use lucent_core::{CancelToken, Cancelled, Face, Ray};

/// Origins closer than this to a face of the box they start in are considered to be on that face.
pub const ON_FACE_EPSILON: f32 = 1e-4;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TraceOutcome {
    Hit,
    Miss,
}

/// Everything known about the first surface a ray hit. All fields are defaulted on a miss.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TraceHit {
    pub hit_distance: f32,
    pub hit_block_id: u16,
    pub hit_face: Option<Face>,
    pub hit_block_pos: IVec3,
    pub hit_face_normal: Vec3A,
    /// The voxel on the ray's side of the hit face, where light was sampled.
    pub sample_block_pos: IVec3,
    pub sample_light_rgbs: LightRgbs,
}

/// Something that rays can be cast against.
pub trait TraceScene: Send + Sync {
    /// Casts a ray from `origin` along `direction` for at most `max_distance`.
    ///
    /// Invalid input (a zero or non-finite direction, or a non-positive distance) is a miss. Only cancellation is an
    /// error.
    fn trace(
        &self,
        origin: Vec3A,
        direction: Vec3A,
        max_distance: f32,
        cancel: &CancelToken,
    ) -> Result<(TraceOutcome, TraceHit), Cancelled>;

    /// Whether the scene has data around `position`. Probes in unloaded space are not worth tracing.
    fn is_loaded(&self, _position: Vec3A) -> bool {
        true
    }
}

/// Traces rays through a [`BlockWorld`] one voxel at a time with a 3D DDA, testing the collision boxes of every solid
/// voxel the ray passes through.
pub struct VoxelTraceScene<W> {
    world: W,
}

impl<W: BlockWorld> VoxelTraceScene<W> {
    pub fn new(world: W) -> Self {
        Self { world }
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    /// Tests the ray against the collision boxes of the solid block in `voxel`, if any.
    fn hit_in_voxel(&self, ray: &Ray, voxel: IVec3, is_origin_voxel: bool) -> Option<(TraceHit, f32)> {
        let shape = self.world.most_solid_block(voxel)?;
        let voxel_min = voxel_min_corner(voxel);

        let mut nearest: Option<(f32, Face)> = None;
        for local_box in shape.collision_boxes.iter() {
            let aabb = Extent::from_min_and_shape(voxel_min + local_box.minimum, local_box.shape);
            let BoxIntersection {
                tmin, entry_face, ..
            } = match ray.cast_at_extent_with_face(aabb) {
                Some(i) => i,
                None => continue,
            };
            let (t, face) = if tmin < 0.0 {
                // Only the voxel containing the origin can contain the origin.
                if !is_origin_voxel {
                    continue;
                }
                (0.0, origin_face(ray, aabb))
            } else {
                (tmin, entry_face)
            };
            if nearest.map_or(true, |(best, _)| t < best) {
                nearest = Some((t, face));
            }
        }

        let (hit_distance, face) = nearest?;
        let sample_block_pos = voxel + face.normal();
        let sample_light_rgbs = if self.world.is_chunk_loaded(sample_block_pos) {
            self.world.light_rgbs(sample_block_pos).unwrap_or_default()
        } else {
            LightRgbs::default()
        };

        Some((
            TraceHit {
                hit_distance,
                hit_block_id: shape.block_id,
                hit_face: Some(face),
                hit_block_pos: voxel,
                hit_face_normal: face.normal_vec3a(),
                sample_block_pos,
                sample_light_rgbs,
            },
            hit_distance,
        ))
    }
}

impl<W: BlockWorld> TraceScene for VoxelTraceScene<W> {
    fn trace(
        &self,
        origin: Vec3A,
        direction: Vec3A,
        max_distance: f32,
        cancel: &CancelToken,
    ) -> Result<(TraceOutcome, TraceHit), Cancelled> {
        let miss = Ok((TraceOutcome::Miss, TraceHit::default()));

        let length_sq = direction.length_squared();
        if !(length_sq > 0.0 && length_sq.is_finite())
            || !(max_distance > 0.0 && max_distance.is_finite())
            || !vec3a_is_finite(origin)
        {
            return miss;
        }
        let direction = direction / length_sq.sqrt();
        let ray = Ray::new(origin, direction);

        let dir = direction.to_array();
        let start = origin.to_array();
        let mut voxel = containing_voxel(origin).to_array();
        let mut step = [0; 3];
        let mut t_delta = [f32::INFINITY; 3];
        let mut t_next = [f32::INFINITY; 3];
        for axis in 0..3 {
            if dir[axis] > 0.0 {
                step[axis] = 1;
                t_delta[axis] = 1.0 / dir[axis];
                t_next[axis] = ((voxel[axis] + 1) as f32 - start[axis]) / dir[axis];
            } else if dir[axis] < 0.0 {
                step[axis] = -1;
                t_delta[axis] = -1.0 / dir[axis];
                t_next[axis] = (voxel[axis] as f32 - start[axis]) / dir[axis];
            }
        }

        // Entry time of the current voxel.
        let mut t = 0.0;
        let mut is_origin_voxel = true;
        loop {
            cancel.check()?;

            if t > max_distance {
                return miss;
            }
            let p = IVec3::from(voxel);
            if !self.world.is_chunk_loaded(p) {
                return miss;
            }
            if let Some((hit, hit_t)) = self.hit_in_voxel(&ray, p, is_origin_voxel) {
                if hit_t <= max_distance {
                    return Ok((TraceOutcome::Hit, hit));
                }
                return miss;
            }

            // Ties go to the lowest axis.
            let axis = if t_next[0] <= t_next[1] && t_next[0] <= t_next[2] {
                0
            } else if t_next[1] <= t_next[2] {
                1
            } else {
                2
            };
            t = t_next[axis];
            voxel[axis] += step[axis];
            t_next[axis] += t_delta[axis];
            is_origin_voxel = false;
        }
    }

    fn is_loaded(&self, position: Vec3A) -> bool {
        vec3a_is_finite(position) && self.world.is_chunk_loaded(containing_voxel(position))
    }
}

/// The face to report for a ray that starts inside `aabb`: the nearest face within [`ON_FACE_EPSILON`] of the origin, or
/// otherwise the face opposing the dominant component of the direction.
fn origin_face(ray: &Ray, aabb: Extent<Vec3A>) -> Face {
    let start = ray.start.to_array();
    let min = aabb.minimum.to_array();
    let max = aabb.least_upper_bound().to_array();

    let mut nearest: Option<(f32, Face)> = None;
    for axis in 0..3 {
        for (dist, positive) in [(start[axis] - min[axis], false), (max[axis] - start[axis], true)] {
            if dist <= ON_FACE_EPSILON && nearest.map_or(true, |(best, _)| dist < best) {
                nearest = Some((dist, Face::new(axis, positive)));
            }
        }
    }
    if let Some((_, face)) = nearest {
        return face;
    }

    let dir = ray.velocity().to_array();
    let mut axis = 0;
    for a in 1..3 {
        if dir[a].abs() > dir[axis].abs() {
            axis = a;
        }
    }
    Face::new(axis, dir[axis] < 0.0)
}

fn containing_voxel(v: Vec3A) -> IVec3 {
    let f = v.floor();
    IVec3::new(f.x as i32, f.y as i32, f.z as i32)
}

fn voxel_min_corner(v: IVec3) -> Vec3A {
    Vec3A::new(v.x as f32, v.y as f32, v.z as f32)
}

fn vec3a_is_finite(v: Vec3A) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;
    use crate::world::{BlockShape, FnWorld};

    use lucent_core::approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Solid below y = 0, sky light everywhere, every chunk loaded.
    fn floor_world() -> impl BlockWorld {
        FnWorld::new(
            |_: IVec3| true,
            |p: IVec3| (p.y < 0).then(|| BlockShape::full_cube(1)),
            |_: IVec3| Some(LightRgbs::sky(1.0)),
        )
    }

    fn trace(scene: &impl TraceScene, origin: Vec3A, dir: Vec3A, max: f32) -> (TraceOutcome, TraceHit) {
        scene.trace(origin, dir, max, &CancelToken::new()).unwrap()
    }

    #[derive(Default)]
    struct CountingWorld {
        calls: AtomicUsize,
    }

    impl BlockWorld for CountingWorld {
        fn is_chunk_loaded(&self, _: IVec3) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn most_solid_block(&self, _: IVec3) -> Option<BlockShape> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            None
        }

        fn light_rgbs(&self, _: IVec3) -> Option<LightRgbs> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[test]
    fn invalid_input_misses_without_touching_world() {
        let scene = VoxelTraceScene::new(CountingWorld::default());
        let o = Vec3A::splat(0.5);
        for (dir, max) in [
            (Vec3A::ZERO, 10.0),
            (Vec3A::new(f32::NAN, 1.0, 0.0), 10.0),
            (Vec3A::new(f32::INFINITY, 0.0, 0.0), 10.0),
            (Vec3A::Y, 0.0),
            (Vec3A::Y, -1.0),
            (Vec3A::Y, f32::NAN),
        ] {
            let (outcome, hit) = trace(&scene, o, dir, max);
            assert_eq!(outcome, TraceOutcome::Miss);
            assert_eq!(hit, TraceHit::default());
        }
        assert_eq!(scene.world().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn hits_floor_from_above() {
        let scene = VoxelTraceScene::new(floor_world());
        let (outcome, hit) = trace(&scene, Vec3A::new(0.5, 1.5, 0.5), -Vec3A::Y, 10.0);
        assert_eq!(outcome, TraceOutcome::Hit);
        assert_relative_eq!(hit.hit_distance, 1.5);
        assert_eq!(hit.hit_block_id, 1);
        assert_eq!(hit.hit_face, Some(Face::PosY));
        assert_eq!(hit.hit_face_normal, Vec3A::Y);
        assert_eq!(hit.hit_block_pos, IVec3::new(0, -1, 0));
        assert_eq!(hit.sample_block_pos, IVec3::new(0, 0, 0));
        assert_eq!(hit.sample_light_rgbs, LightRgbs::sky(1.0));

        // Not normalized, and slanted.
        let (outcome, hit) = trace(&scene, Vec3A::new(0.5, 1.0, 0.5), Vec3A::new(2.0, -2.0, 0.0), 10.0);
        assert_eq!(outcome, TraceOutcome::Hit);
        assert_relative_eq!(hit.hit_distance, 2f32.sqrt(), epsilon = 1e-5);
        assert_eq!(hit.hit_block_pos, IVec3::new(1, -1, 0));
    }

    #[test]
    fn misses_beyond_max_distance_and_into_the_sky() {
        let scene = VoxelTraceScene::new(floor_world());
        let o = Vec3A::new(0.5, 1.5, 0.5);
        assert_eq!(trace(&scene, o, -Vec3A::Y, 1.0).0, TraceOutcome::Miss);
        assert_eq!(trace(&scene, o, -Vec3A::Y, 1.5).0, TraceOutcome::Hit);
        assert_eq!(trace(&scene, o, Vec3A::Y, 50.0).0, TraceOutcome::Miss);
    }

    #[test]
    fn unloaded_chunks_are_misses() {
        let world = FnWorld::new(
            |p: IVec3| p.y >= 0,
            |p: IVec3| (p.y < 0).then(|| BlockShape::full_cube(1)),
            |_: IVec3| None,
        );
        let scene = VoxelTraceScene::new(world);
        let (outcome, _) = trace(&scene, Vec3A::new(0.5, 1.5, 0.5), -Vec3A::Y, 10.0);
        assert_eq!(outcome, TraceOutcome::Miss);
        assert!(scene.is_loaded(Vec3A::new(0.5, 1.5, 0.5)));
        assert!(!scene.is_loaded(Vec3A::new(0.5, -1.5, 0.5)));
    }

    #[test]
    fn missing_light_is_zero() {
        let world = FnWorld::new(
            |_: IVec3| true,
            |p: IVec3| (p.y < 0).then(|| BlockShape::full_cube(1)),
            |_: IVec3| None,
        );
        let scene = VoxelTraceScene::new(world);
        let (outcome, hit) = trace(&scene, Vec3A::new(0.5, 1.5, 0.5), -Vec3A::Y, 10.0);
        assert_eq!(outcome, TraceOutcome::Hit);
        assert_eq!(hit.sample_light_rgbs, LightRgbs::default());
    }

    #[test]
    fn pass_through_blocks_and_partial_boxes() {
        let world = FnWorld::new(
            |_: IVec3| true,
            |p: IVec3| match p.y {
                -1 => Some(BlockShape::pass_through(2)),
                -2 => Some(BlockShape::slab(3)),
                _ => None,
            },
            |_: IVec3| None,
        );
        let scene = VoxelTraceScene::new(world);
        let (outcome, hit) = trace(&scene, Vec3A::new(0.5, 1.5, 0.5), -Vec3A::Y, 10.0);
        assert_eq!(outcome, TraceOutcome::Hit);
        assert_eq!(hit.hit_block_id, 3);
        // The slab's top is at y = -1.5.
        assert_relative_eq!(hit.hit_distance, 3.0);

        // A ray passing over the slab but through its voxel misses it.
        let (outcome, _) = trace(&scene, Vec3A::new(-3.0, -1.25, 0.5), Vec3A::X, 10.0);
        assert_eq!(outcome, TraceOutcome::Miss);
    }

    #[test]
    fn negative_direction_steps() {
        let world = FnWorld::new(
            |_: IVec3| true,
            |p: IVec3| (p == IVec3::new(-3, 0, 0)).then(|| BlockShape::full_cube(4)),
            |_: IVec3| Some(LightRgbs::new(1.0, 0.5, 0.25, 0.0)),
        );
        let scene = VoxelTraceScene::new(world);
        let (outcome, hit) = trace(&scene, Vec3A::splat(0.5), -Vec3A::X, 10.0);
        assert_eq!(outcome, TraceOutcome::Hit);
        assert_relative_eq!(hit.hit_distance, 2.5);
        assert_eq!(hit.hit_face, Some(Face::PosX));
        assert_eq!(hit.sample_block_pos, IVec3::new(-2, 0, 0));
        assert_eq!(hit.sample_light_rgbs, LightRgbs::new(1.0, 0.5, 0.25, 0.0));
    }

    #[test]
    fn exact_corner_steps_x_before_y() {
        let world = FnWorld::new(
            |_: IVec3| true,
            |p: IVec3| {
                (p == IVec3::new(1, 0, 0) || p == IVec3::new(0, 1, 0))
                    .then(|| BlockShape::full_cube(p.x as u16 + 10 * p.y as u16))
            },
            |_: IVec3| None,
        );
        let scene = VoxelTraceScene::new(world);
        let (outcome, hit) = trace(&scene, Vec3A::splat(0.5), Vec3A::new(1.0, 1.0, 0.0), 10.0);
        assert_eq!(outcome, TraceOutcome::Hit);
        assert_eq!(hit.hit_block_pos, IVec3::new(1, 0, 0));
        assert_eq!(hit.hit_face, Some(Face::NegX));
    }

    #[test]
    fn origin_inside_solid_block() {
        let scene = VoxelTraceScene::new(floor_world());

        // Deep inside: the face opposing the dominant direction.
        let (outcome, hit) = trace(&scene, Vec3A::new(0.5, -0.5, 0.5), Vec3A::new(0.3, -1.0, 0.0), 10.0);
        assert_eq!(outcome, TraceOutcome::Hit);
        assert_eq!(hit.hit_distance, 0.0);
        assert_eq!(hit.hit_face, Some(Face::PosY));
        assert_eq!(hit.hit_block_pos, IVec3::new(0, -1, 0));

        let (_, hit) = trace(&scene, Vec3A::new(0.5, -0.5, 0.5), Vec3A::new(-1.0, 0.2, 0.0), 10.0);
        assert_eq!(hit.hit_face, Some(Face::PosX));

        // Just under the surface: the surface wins regardless of direction.
        let (outcome, hit) = trace(&scene, Vec3A::new(0.5, -0.00005, 0.5), Vec3A::X, 10.0);
        assert_eq!(outcome, TraceOutcome::Hit);
        assert_eq!(hit.hit_face, Some(Face::PosY));
        assert_eq!(hit.sample_block_pos, IVec3::new(0, 0, 0));
    }

    #[test]
    fn cancelled_trace_is_an_error() {
        let scene = VoxelTraceScene::new(floor_world());
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(
            scene.trace(Vec3A::new(0.5, 1.5, 0.5), -Vec3A::Y, 10.0, &cancel),
            Err(Cancelled)
        );
    }
}
