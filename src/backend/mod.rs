//! Interchangeable ways of running the collision kernel.

use std::fmt;

use crate::{kernel::TickInput, particle::ParticleStore};

#[cfg(feature = "gpu")]
pub mod gpu;
pub mod scalar;
pub mod simd;

#[cfg(feature = "gpu")]
pub use gpu::GpuBackend;
pub use scalar::ScalarBackend;
pub use simd::SimdBackend;

/// Advances every particle in the store by one tick.
///
/// Implementations are picked once at startup and used through generics, so
/// the hot loop never goes through a vtable.
pub trait SimulationStep {
    const NAME: &'static str;

    fn step(&mut self, store: &mut ParticleStore, input: &TickInput);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    /// Worker pool running the scalar kernel on disjoint slices
    Scalar,
    /// AVX2, eight neighbours per instruction
    Simd,
    /// Compute shader, one invocation per particle
    #[cfg(feature = "gpu")]
    Gpu,
}

impl BackendKind {
    /// Whether the backend applies `TickInput::interaction`.
    pub fn applies_interaction(self) -> bool {
        #[cfg(feature = "gpu")]
        {
            matches!(self, BackendKind::Gpu)
        }
        #[cfg(not(feature = "gpu"))]
        {
            let _ = self;
            false
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Scalar => f.write_str(ScalarBackend::NAME),
            BackendKind::Simd => f.write_str(SimdBackend::NAME),
            #[cfg(feature = "gpu")]
            BackendKind::Gpu => f.write_str(GpuBackend::NAME),
        }
    }
}
