use thiserror::Error;

/// Misconfiguration detected while constructing clipmap components.
#[derive(Debug, Error)]
pub enum ClipmapError {
    #[error("a clipmap needs at least one level")]
    NoLevels,
    #[error("clipmap level count {0} is too large")]
    TooManyLevels(u32),
    #[error("clipmap resolution must be positive")]
    ZeroResolution,
    #[error("clipmap resolution {0} overflows the 32-bit storage index")]
    ResolutionTooLarge(u32),
    #[error("base spacing {0} must be positive and finite")]
    InvalidBaseSpacing(f64),
    #[error("octahedral tile size must be positive")]
    ZeroTileSize,
    #[error("trace service needs a positive queue capacity")]
    ZeroQueueCapacity,
    #[error("trace service needs at least one worker")]
    NoWorkers,
    #[error("failed to spawn trace worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}
