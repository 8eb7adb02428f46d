//! Lucent: a moving field of global-illumination probes around a viewer in a block world.
//!
//! [`ProbeField`] runs the per-frame loop over the pieces in [`lucent_probes`]: re-center the clipmap on the camera,
//! select a budgeted list of probes, trace them on worker threads, and apply the finished traces to the probe store.

mod config;
mod field;

pub use config::{Config, ConfigError, FieldConfig};
pub use field::{FrameStats, ProbeField};

pub use lucent_core as core;
pub use lucent_probes as probes;
