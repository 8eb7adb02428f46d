use crate::glam::{IVec3, Vec3A};
use crate::ilattice::prelude::Extent;

#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub start: Vec3A,
    velocity: Vec3A,
}

impl Ray {
    pub fn new(start: Vec3A, velocity: Vec3A) -> Self {
        Self { start, velocity }
    }

    pub fn velocity(&self) -> Vec3A {
        self.velocity
    }

    /// If the ray intersects box `aabb`, returns the entrance and exit times of the ray and the face of `aabb` it enters
    /// through. This is the slab method, one axis at a time.
    ///
    /// Axes with zero velocity are handled explicitly instead of relying on infinities. When the entrance times of several
    /// axes are exactly equal, the lowest axis (X, then Y, then Z) is reported. If the ray starts inside the box, `tmin` is
    /// negative and `entry_face` is the face the ray would have entered through.
    pub fn cast_at_extent_with_face(&self, aabb: Extent<Vec3A>) -> Option<BoxIntersection> {
        let start = self.start.to_array();
        let velocity = self.velocity.to_array();
        let min = aabb.minimum.to_array();
        let max = aabb.least_upper_bound().to_array();

        let mut tmin = f32::NEG_INFINITY;
        let mut tmax = f32::INFINITY;
        let mut entry_face = None;
        for axis in 0..3 {
            if velocity[axis] == 0.0 {
                if start[axis] < min[axis] || start[axis] > max[axis] {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / velocity[axis];
            let mut t_near = (min[axis] - start[axis]) * inv;
            let mut t_far = (max[axis] - start[axis]) * inv;
            // Moving in +axis enters through the min face, whose outward normal points in -axis.
            let mut near_face = Face::new(axis, false);
            if t_near > t_far {
                std::mem::swap(&mut t_near, &mut t_far);
                near_face = Face::new(axis, true);
            }
            if entry_face.is_none() || t_near > tmin {
                tmin = t_near;
                entry_face = Some(near_face);
            }
            tmax = tmax.min(t_far);
        }

        let entry_face = entry_face?;
        (tmax >= tmin.max(0.0)).then(|| BoxIntersection {
            tmin,
            tmax,
            entry_face,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxIntersection {
    pub tmin: f32,
    pub tmax: f32,
    pub entry_face: Face,
}

/// One of the six faces of an axis-aligned box, named by its outward normal.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum Face {
    NegX = 0,
    PosX = 1,
    NegY = 2,
    PosY = 3,
    NegZ = 4,
    PosZ = 5,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::NegX,
        Face::PosX,
        Face::NegY,
        Face::PosY,
        Face::NegZ,
        Face::PosZ,
    ];

    /// `axis` must be in `0..3`.
    pub fn new(axis: usize, positive: bool) -> Self {
        Self::ALL[2 * axis + positive as usize]
    }

    pub fn axis(self) -> usize {
        self as usize / 2
    }

    pub fn is_positive(self) -> bool {
        self as usize % 2 == 1
    }

    pub fn opposite(self) -> Self {
        Self::new(self.axis(), !self.is_positive())
    }

    pub fn normal(self) -> IVec3 {
        let mut n = [0; 3];
        n[self.axis()] = if self.is_positive() { 1 } else { -1 };
        IVec3::from(n)
    }

    pub fn normal_vec3a(self) -> Vec3A {
        let n = self.normal();
        Vec3A::new(n.x as f32, n.y as f32, n.z as f32)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
