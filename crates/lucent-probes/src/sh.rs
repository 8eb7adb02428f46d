//! L1 spherical harmonics.

use crate::upload::ShProbe;

use lucent_core::glam::Vec3A;
use std::f32::consts::PI;

const SH_C0: f32 = 0.282_095;
const SH_C1: f32 = 0.488_603;

/// Cosine lobe convolution factors for bands 0 and 1.
const A0: f32 = PI;
const A1: f32 = 2.0 * PI / 3.0;

/// The four basis functions evaluated at unit direction `dir`, ordered `[L0, L1(y), L1(z), L1(x)]`.
pub fn sh_basis(dir: Vec3A) -> [f32; 4] {
    [SH_C0, SH_C1 * dir.y, SH_C1 * dir.z, SH_C1 * dir.x]
}

/// Projects one sample of `value` arriving from `dir` into `coeffs`, weighted by `weight`.
pub fn add_sample(coeffs: &mut [f32; 4], dir: Vec3A, value: f32, weight: f32) {
    for (c, b) in coeffs.iter_mut().zip(sh_basis(dir)) {
        *c += b * value * weight;
    }
}

/// Irradiance at a surface with normal `normal`, from radiance projected into `coeffs`.
pub fn evaluate_irradiance(coeffs: &[f32; 4], normal: Vec3A) -> f32 {
    let b = sh_basis(normal);
    A0 * coeffs[0] * b[0] + A1 * (coeffs[1] * b[1] + coeffs[2] * b[2] + coeffs[3] * b[3])
}

impl ShProbe {
    pub fn add_sample(&mut self, dir: Vec3A, rgb: [f32; 3], sky: f32, weight: f32) {
        add_sample(&mut self.r, dir, rgb[0], weight);
        add_sample(&mut self.g, dir, rgb[1], weight);
        add_sample(&mut self.b, dir, rgb[2], weight);
        add_sample(&mut self.sky, dir, sky, weight);
    }

    /// RGB irradiance and sky visibility facing `normal`, never negative.
    pub fn irradiance(&self, normal: Vec3A) -> ([f32; 3], f32) {
        let e = |c: &[f32; 4]| evaluate_irradiance(c, normal).max(0.0);
        ([e(&self.r), e(&self.g), e(&self.b)], e(&self.sky))
    }

    pub fn scaled(&self, s: f32) -> Self {
        let m = |c: [f32; 4]| c.map(|v| v * s);
        Self {
            r: m(self.r),
            g: m(self.g),
            b: m(self.b),
            sky: m(self.sky),
        }
    }

    pub fn add(&self, other: &Self) -> Self {
        let a = |x: [f32; 4], y: [f32; 4]| [x[0] + y[0], x[1] + y[1], x[2] + y[2], x[3] + y[3]];
        Self {
            r: a(self.r, other.r),
            g: a(self.g, other.g),
            b: a(self.b, other.b),
            sky: a(self.sky, other.sky),
        }
    }

    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        let l = |a: [f32; 4], b: [f32; 4]| {
            let mut out = a;
            for i in 0..4 {
                out[i] = a[i] + (b[i] - a[i]) * t;
            }
            out
        };
        Self {
            r: l(self.r, other.r),
            g: l(self.g, other.g),
            b: l(self.b, other.b),
            sky: l(self.sky, other.sky),
        }
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
    use crate::directions::TraceDirections;

    use lucent_core::approx::assert_relative_eq;

    #[test]
    fn uniform_radiance_gives_pi_irradiance() {
        let dirs = TraceDirections::fibonacci(4096);
        let weight = 4.0 * PI / dirs.len() as f32;
        let mut coeffs = [0.0; 4];
        for &d in dirs.directions() {
            add_sample(&mut coeffs, d, 1.0, weight);
        }
        assert_relative_eq!(evaluate_irradiance(&coeffs, Vec3A::Y), PI, epsilon = 1e-2);
        assert_relative_eq!(evaluate_irradiance(&coeffs, -Vec3A::X), PI, epsilon = 1e-2);
    }

    #[test]
    fn upper_hemisphere_light_favors_up_normals() {
        let dirs = TraceDirections::fibonacci(1024);
        let weight = 4.0 * PI / dirs.len() as f32;
        let mut probe = ShProbe::default();
        for &d in dirs.directions() {
            let sky = if d.y > 0.0 { 1.0 } else { 0.0 };
            probe.add_sample(d, [0.0; 3], sky, weight);
        }
        let (_, up) = probe.irradiance(Vec3A::Y);
        let (_, down) = probe.irradiance(-Vec3A::Y);
        assert!(up > 2.5 && up < PI + 0.1, "{}", up);
        assert!(down < 0.6, "{}", down);

        let half = probe.scaled(0.5);
        assert_relative_eq!(half.irradiance(Vec3A::Y).1, up * 0.5, epsilon = 1e-5);
        let mid = probe.lerp(&ShProbe::default(), 0.5);
        assert_eq!(mid, half);
    }
}
