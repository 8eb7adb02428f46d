pub mod cancel;
pub mod frame_budget;
pub mod geometry;
pub mod work_timer;

pub use cancel::{CancelToken, Cancelled};
pub use frame_budget::FrameBudget;
pub use geometry::{Face, Ray};
pub use work_timer::WorkTimer;

use ahash::AHashMap;
pub type SmallKeyHashMap<K, V> = AHashMap<K, V>;

// Re-exports.
pub use approx;
pub use ilattice::glam as glam;
pub use ilattice;
pub use static_assertions;
