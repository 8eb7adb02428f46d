/// A value measured in probe spacings of one clipmap level, relative to that level's origin.
///
/// Probe `i` of a level has its center at `i + 0.5` in these units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeUnits<T>(pub T);

impl<T> ProbeUnits<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}
