//! The world-probe clipmap.
//!
//! # Levels
//!
//! Irradiance probes are placed on a set of nested, camera-centered grids. Every [`ClipmapLevel`](crate::ClipmapLevel) has
//! the same number of probes per axis, but level `L` spaces them `2^L` times further apart than level 0, so each level
//! covers twice the extent of the one before it.
//!
//! Levels are stored toroidally. When the camera moves far enough that a level's snapped origin shifts, only the slabs of
//! probes that entered the window are reset; everything else keeps both its data and its storage slot.
//!
//! # Updates
//!
//! Each frame the [`WorldProbeScheduler`](crate::WorldProbeScheduler) selects a bounded list of probes to (re)trace, empty
//! ones first and nearest first. The [`TraceService`](crate::TraceService) runs those traces on worker threads against a
//! [`TraceScene`](crate::TraceScene), usually a [`VoxelTraceScene`](crate::VoxelTraceScene) over a
//! [`BlockWorld`](crate::BlockWorld). Finished traces are handed back to the scheduler and written to a
//! [`ProbeUploadSink`](crate::ProbeUploadSink) for the renderer.
//!
//! # Probe Data
//!
//! A probe is either four L1 spherical harmonic vectors (RGB radiance and sky visibility) or an octahedral tile of radiance
//! and hit distance. Both come with a short-range ambient occlusion estimate.

mod clipmap;
mod config;
mod directions;
mod error;
mod integrator;
mod sampling;
mod scene;
mod service;
mod sh;
mod topology;
mod units;
mod upload;
mod world;

pub use clipmap::*;
pub use config::*;
pub use directions::*;
pub use error::*;
pub use integrator::*;
pub use sampling::*;
pub use scene::*;
pub use service::*;
pub use sh::*;
pub use topology::*;
pub use units::*;
pub use upload::*;
pub use world::*;

pub use lucent_core as core;
pub use lucent_core::glam;
