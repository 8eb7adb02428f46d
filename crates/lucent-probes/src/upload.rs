//! The boundary between traced probe data and whatever stores it for rendering.

use bytemuck::{cast_slice, Pod, Zeroable};
use std::mem::size_of;

/// L1 spherical harmonics for one probe. `r`, `g` and `b` hold block light plus sky bounce, `sky` holds unoccluded
/// sky visibility. Coefficients are ordered `[L0, L1(y), L1(z), L1(x)]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct ShProbe {
    pub r: [f32; 4],
    pub g: [f32; 4],
    pub b: [f32; 4],
    pub sky: [f32; 4],
}

unsafe impl Zeroable for ShProbe {}
unsafe impl Pod for ShProbe {}

/// Everything uploaded per probe update, independent of the atlas.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct ProbeRecord {
    pub sh: ShProbe,
    pub ao_dir: [f32; 3],
    pub ao_confidence: f32,
    pub mean_log_hit_distance: f32,
    pub sky_intensity: f32,
    _pad: [f32; 2],
}

unsafe impl Zeroable for ProbeRecord {}
unsafe impl Pod for ProbeRecord {}

impl ProbeRecord {
    pub fn new(
        sh: ShProbe,
        ao_dir: [f32; 3],
        ao_confidence: f32,
        mean_log_hit_distance: f32,
        sky_intensity: f32,
    ) -> Self {
        Self {
            sh,
            ao_dir,
            ao_confidence,
            mean_log_hit_distance,
            sky_intensity,
            _pad: [0.0; 2],
        }
    }
}

/// One octahedral atlas texel. `alpha` is `log(hit_distance + 1)` for hits and `-log(max_distance + 1)` for misses.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct AtlasSample {
    pub radiance: [f32; 3],
    pub alpha: f32,
}

unsafe impl Zeroable for AtlasSample {}
unsafe impl Pod for AtlasSample {}

impl AtlasSample {
    pub fn is_miss(&self) -> bool {
        self.alpha < 0.0
    }
}

/// Receives probe data keyed by `(level, storage_linear_index, texel)`.
pub trait ProbeUploadSink {
    fn estimated_bytes_per_probe(&self) -> usize {
        size_of::<ProbeRecord>()
    }

    fn estimated_bytes_per_texel(&self) -> usize {
        size_of::<AtlasSample>()
    }

    fn write_probe(&mut self, level: u32, storage_linear_index: u32, record: &ProbeRecord);

    fn write_texel(&mut self, level: u32, storage_linear_index: u32, texel: u32, sample: AtlasSample);
}

/// How many bytes one probe update costs the upload layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UploadCostModel {
    pub bytes_per_probe: usize,
    pub bytes_per_texel: usize,
}

impl Default for UploadCostModel {
    fn default() -> Self {
        Self {
            bytes_per_probe: size_of::<ProbeRecord>(),
            bytes_per_texel: size_of::<AtlasSample>(),
        }
    }
}

impl UploadCostModel {
    pub fn from_sink(sink: &impl ProbeUploadSink) -> Self {
        Self {
            bytes_per_probe: sink.estimated_bytes_per_probe(),
            bytes_per_texel: sink.estimated_bytes_per_texel(),
        }
    }

    pub fn bytes_per_update(&self, texels_per_update: usize) -> usize {
        self.bytes_per_probe
            .saturating_add(texels_per_update.saturating_mul(self.bytes_per_texel))
    }
}

/// Keeps every level's probe records (and optionally atlas tiles) in flat arrays indexed by storage linear index, ready
/// to be copied into GPU buffers.
pub struct CpuProbeStore {
    texels_per_probe: u32,
    levels: Vec<StoreLevel>,
}

struct StoreLevel {
    records: Vec<ProbeRecord>,
    atlas: Vec<AtlasSample>,
    dirty: Vec<u32>,
    dirty_mask: Vec<bool>,
}

impl CpuProbeStore {
    /// `texels_per_probe` is zero when no atlas is kept.
    pub fn new(level_count: u32, slots_per_level: u32, texels_per_probe: u32) -> Self {
        let slots = slots_per_level as usize;
        Self {
            texels_per_probe,
            levels: (0..level_count)
                .map(|_| StoreLevel {
                    records: vec![ProbeRecord::default(); slots],
                    atlas: vec![AtlasSample::default(); slots * texels_per_probe as usize],
                    dirty: Vec::new(),
                    dirty_mask: vec![false; slots],
                })
                .collect(),
        }
    }

    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn texels_per_probe(&self) -> u32 {
        self.texels_per_probe
    }

    pub fn record(&self, level: u32, storage_linear_index: u32) -> &ProbeRecord {
        &self.levels[level as usize].records[storage_linear_index as usize]
    }

    /// The atlas tile of one probe, in texel order.
    pub fn tile(&self, level: u32, storage_linear_index: u32) -> &[AtlasSample] {
        let n = self.texels_per_probe as usize;
        let start = storage_linear_index as usize * n;
        &self.levels[level as usize].atlas[start..start + n]
    }

    pub fn record_bytes(&self, level: u32) -> &[u8] {
        cast_slice(&self.levels[level as usize].records)
    }

    pub fn atlas_bytes(&self, level: u32) -> &[u8] {
        cast_slice(&self.levels[level as usize].atlas)
    }

    /// Storage linear indices written on `level` since the last call, in first-write order.
    pub fn take_dirty(&mut self, level: u32) -> Vec<u32> {
        let level = &mut self.levels[level as usize];
        for &i in level.dirty.iter() {
            level.dirty_mask[i as usize] = false;
        }
        std::mem::take(&mut level.dirty)
    }

    fn mark_dirty(&mut self, level: u32, storage_linear_index: u32) {
        let level = &mut self.levels[level as usize];
        let i = storage_linear_index as usize;
        if !level.dirty_mask[i] {
            level.dirty_mask[i] = true;
            level.dirty.push(storage_linear_index);
        }
    }
}

impl ProbeUploadSink for CpuProbeStore {
    fn write_probe(&mut self, level: u32, storage_linear_index: u32, record: &ProbeRecord) {
        self.levels[level as usize].records[storage_linear_index as usize] = *record;
        self.mark_dirty(level, storage_linear_index);
    }

    fn write_texel(&mut self, level: u32, storage_linear_index: u32, texel: u32, sample: AtlasSample) {
        if texel >= self.texels_per_probe {
            log::warn!(
                "Dropping texel {} for a store with {} texels per probe",
                texel,
                self.texels_per_probe
            );
            return;
        }
        let i = storage_linear_index as usize * self.texels_per_probe as usize + texel as usize;
        self.levels[level as usize].atlas[i] = sample;
        self.mark_dirty(level, storage_linear_index);
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

    #[test]
    fn record_sizes_match_gpu_layout() {
        assert_eq!(size_of::<ShProbe>(), 64);
        assert_eq!(size_of::<ProbeRecord>(), 96);
        assert_eq!(size_of::<AtlasSample>(), 16);

        let cost = UploadCostModel::default();
        assert_eq!(cost.bytes_per_update(0), 96);
        assert_eq!(cost.bytes_per_update(64), 96 + 64 * 16);
    }

    #[test]
    fn store_tracks_dirty_slots_once() {
        let mut store = CpuProbeStore::new(2, 8, 4);
        let record = ProbeRecord::new(ShProbe::default(), [0.0, 1.0, 0.0], 0.5, 1.0, 0.25);

        store.write_probe(1, 5, &record);
        store.write_texel(1, 5, 3, AtlasSample { radiance: [1.0; 3], alpha: -2.0 });
        store.write_probe(1, 2, &record);

        assert_eq!(store.take_dirty(1), vec![5, 2]);
        assert!(store.take_dirty(1).is_empty());
        assert!(store.take_dirty(0).is_empty());

        assert_eq!(store.record(1, 5), &record);
        assert!(store.tile(1, 5)[3].is_miss());
        assert_eq!(store.record_bytes(1).len(), 8 * 96);
        assert_eq!(store.atlas_bytes(1).len(), 8 * 4 * 16);
    }
}
