use thiserror::Error;

/// Everything that can stop a simulation from starting.
///
/// Once the first tick runs nothing here can be produced anymore, stepping is
/// infallible.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("particle count must be greater than zero")]
    ZeroParticles,

    #[error("bounds must be finite and positive, got {right}x{bottom}")]
    DegenerateBounds { right: f32, bottom: f32 },

    #[error("invalid radius range {min}..={max}")]
    InvalidRadius { min: f32, max: f32 },

    #[error("particles of radius {radius} don't fit inside {right}x{bottom}")]
    RadiusExceedsBounds { radius: f32, right: f32, bottom: f32 },

    #[error("invalid speed range {min}..={max}")]
    InvalidSpeed { min: f32, max: f32 },

    #[error("wall restitution must be within 0..=1, got {0}")]
    InvalidRestitution(f32),

    #[error("time step must be finite and positive, got {0}")]
    InvalidTimeStep(f32),

    #[error("spawn attempts must be greater than zero")]
    ZeroSpawnAttempts,

    #[error("could only place {placed} of {requested} particles without overlap")]
    SpawnFailed { placed: usize, requested: usize },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("this CPU doesn't support AVX2")]
    SimdUnsupported,

    #[cfg(feature = "gpu")]
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[cfg(feature = "gpu")]
    #[error("adapter is missing required features: {0:?}")]
    MissingFeatures(wgpu::Features),

    #[cfg(feature = "gpu")]
    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[cfg(feature = "gpu")]
    #[error("failed to create compute pipeline: {0}")]
    Pipeline(String),
}

pub type Result<T, E = SimError> = std::result::Result<T, E>;
