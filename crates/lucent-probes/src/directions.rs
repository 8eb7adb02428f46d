//! Sample directions for probe tracing, and the octahedral mapping between directions and atlas texels.
//!
//! The octahedral mapping is Y-up: the upper hemisphere fills the inner diamond of the tile and the lower hemisphere is
//! folded into the corners.

use lucent_core::glam::{Vec2, Vec3A};
use lucent_core::SmallKeyHashMap;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

/// `dir` need not be normalized, but must not be zero. The result is in `[-1, 1]²`.
pub fn octahedral_encode(dir: Vec3A) -> Vec2 {
    let d = dir / (dir.x.abs() + dir.y.abs() + dir.z.abs());
    if d.y >= 0.0 {
        Vec2::new(d.x, d.z)
    } else {
        Vec2::new(
            (1.0 - d.z.abs()) * sign_not_zero(d.x),
            (1.0 - d.x.abs()) * sign_not_zero(d.z),
        )
    }
}

/// Inverse of [`octahedral_encode`]; returns a unit vector.
pub fn octahedral_decode(uv: Vec2) -> Vec3A {
    let y = 1.0 - uv.x.abs() - uv.y.abs();
    let (x, z) = if y >= 0.0 {
        (uv.x, uv.y)
    } else {
        (
            (1.0 - uv.y.abs()) * sign_not_zero(uv.x),
            (1.0 - uv.x.abs()) * sign_not_zero(uv.y),
        )
    };
    Vec3A::new(x, y, z).normalize()
}

fn sign_not_zero(v: f32) -> f32 {
    if v >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Direction through the center of texel `[x, y]` of a `tile_size²` octahedral tile.
pub fn texel_to_direction(texel: [u32; 2], tile_size: u32) -> Vec3A {
    let size = tile_size as f32;
    let uv = Vec2::new(
        (texel[0] as f32 + 0.5) / size * 2.0 - 1.0,
        (texel[1] as f32 + 0.5) / size * 2.0 - 1.0,
    );
    octahedral_decode(uv)
}

/// The texel of a `tile_size²` octahedral tile that `dir` falls into.
pub fn direction_to_texel(dir: Vec3A, tile_size: u32) -> [u32; 2] {
    let uv = octahedral_encode(dir);
    let to_texel = |c: f32| {
        let t = ((c + 1.0) * 0.5 * tile_size as f32).floor() as i64;
        t.clamp(0, tile_size as i64 - 1) as u32
    };
    [to_texel(uv.x), to_texel(uv.y)]
}

/// An immutable table of unit sample directions, shared between every trace that uses it.
///
/// Octahedral tables list texel centers in row-major order, so direction `i` belongs to atlas texel `i`.
#[derive(Clone, Debug)]
pub struct TraceDirections {
    directions: Arc<[Vec3A]>,
    tile_size: Option<u32>,
}

impl TraceDirections {
    /// The `tile_size²` texel-center directions of an octahedral tile. Tables are built once per tile size.
    pub fn octahedral(tile_size: u32) -> Self {
        static CACHE: OnceLock<Mutex<SmallKeyHashMap<u32, Arc<[Vec3A]>>>> = OnceLock::new();

        let mut cache = CACHE
            .get_or_init(|| Mutex::new(SmallKeyHashMap::default()))
            .lock();
        let directions = cache
            .entry(tile_size)
            .or_insert_with(|| {
                log::debug!("Building {0}x{0} octahedral direction table", tile_size);
                (0..tile_size * tile_size)
                    .map(|i| texel_to_direction([i % tile_size, i / tile_size], tile_size))
                    .collect()
            })
            .clone();

        Self {
            directions,
            tile_size: Some(tile_size),
        }
    }

    /// `count` nearly evenly spaced directions on a spherical Fibonacci spiral. For an even `count`, exactly half of
    /// them point up.
    pub fn fibonacci(count: u32) -> Self {
        let golden_angle = std::f32::consts::PI * (3.0 - 5f32.sqrt());
        let n = count as f32;
        let directions = (0..count)
            .map(|i| {
                let y = 1.0 - (2 * i + 1) as f32 / n;
                let r = (1.0 - y * y).max(0.0).sqrt();
                let phi = golden_angle * i as f32;
                Vec3A::new(r * phi.cos(), y, r * phi.sin())
            })
            .collect();

        Self {
            directions,
            tile_size: None,
        }
    }

    pub fn from_directions(directions: Vec<Vec3A>) -> Self {
        Self {
            directions: directions.into_iter().map(|d| d.normalize_or_zero()).collect(),
            tile_size: None,
        }
    }

    pub fn directions(&self) -> &[Vec3A] {
        &self.directions
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    /// `Some` when direction `i` maps to atlas texel `i`.
    pub fn tile_size(&self) -> Option<u32> {
        self.tile_size
    }
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

    use lucent_core::approx::assert_relative_eq;

    #[test]
    fn poles_and_equator() {
        assert_eq!(octahedral_encode(Vec3A::Y), Vec2::ZERO);
        let down = octahedral_encode(-Vec3A::Y);
        assert_relative_eq!(down.x.abs(), 1.0);
        assert_relative_eq!(down.y.abs(), 1.0);
        assert_eq!(octahedral_encode(Vec3A::X), Vec2::new(1.0, 0.0));
        assert_eq!(octahedral_decode(Vec2::new(0.0, -1.0)), -Vec3A::Z);
    }

    #[test]
    fn every_texel_center_maps_back_to_its_texel() {
        for tile_size in [1, 2, 5, 8, 16] {
            for y in 0..tile_size {
                for x in 0..tile_size {
                    let dir = texel_to_direction([x, y], tile_size);
                    assert_relative_eq!(dir.length(), 1.0, epsilon = 1e-5);
                    assert_eq!(direction_to_texel(dir, tile_size), [x, y]);
                }
            }
        }
    }

    #[test]
    fn octahedral_tables_are_shared_and_row_major() {
        let a = TraceDirections::octahedral(4);
        let b = TraceDirections::octahedral(4);
        assert!(Arc::ptr_eq(&a.directions, &b.directions));
        assert_eq!(a.len(), 16);
        assert_eq!(a.tile_size(), Some(4));
        assert_eq!(a.directions()[6], texel_to_direction([2, 1], 4));
    }

    #[test]
    fn fibonacci_directions_are_unit_and_balanced() {
        let dirs = TraceDirections::fibonacci(64);
        assert_eq!(dirs.len(), 64);
        assert_eq!(dirs.tile_size(), None);
        let up = dirs.directions().iter().filter(|d| d.y > 0.0).count();
        assert_eq!(up, 32);
        let mut sum = Vec3A::ZERO;
        for d in dirs.directions() {
            assert_relative_eq!(d.length(), 1.0, epsilon = 1e-5);
            sum += *d;
        }
        assert!(sum.length() / 64.0 < 0.05);
    }
}
