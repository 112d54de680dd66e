//! AVX2 backend.
//!
//! Runs on the calling thread. For each particle its 3x3 candidates are packed
//! into structure-of-arrays lanes and tested eight at a time: the particle is
//! broadcast across a register, overlap and approach become lane masks, and
//! masked responses are accumulated without branching. Candidates left over
//! after the last full register go through the scalar pair routine.

use glam::Vec2;
use log::info;

use super::SimulationStep;
use crate::{
    config::SimulationConfig,
    error::{Result, SimError},
    grid::SpatialGrid,
    kernel::{self, Snapshot, TickInput},
    particle::ParticleStore,
};

/// f32 lanes in a 256-bit register.
pub const LANES: usize = 8;

pub struct SimdBackend {
    grid: SpatialGrid,
    restitution: f32,
    lanes: NeighborLanes,

    contacts: Vec<u32>,
    next_positions: Vec<Vec2>,
    next_velocities: Vec<Vec2>,
}

impl SimdBackend {
    pub fn is_supported() -> bool {
        #[cfg(target_arch = "x86_64")]
        {
            is_x86_feature_detected!("avx2")
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            false
        }
    }

    pub fn new(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;

        if !Self::is_supported() {
            return Err(SimError::SimdUnsupported);
        }

        info!("SIMD backend processing {LANES} neighbours per instruction");

        Ok(Self {
            grid: SpatialGrid::new(config.cell_size(), config.bounds),
            restitution: config.restitution,
            lanes: NeighborLanes::default(),

            contacts: Vec::with_capacity(config.particles),
            next_positions: Vec::with_capacity(config.particles),
            next_velocities: Vec::with_capacity(config.particles),
        })
    }
}

impl SimulationStep for SimdBackend {
    const NAME: &'static str = "simd";

    fn step(&mut self, store: &mut ParticleStore, input: &TickInput) {
        let n = store.len();
        self.grid.fit_radius(store.max_radius(), input.bounds);
        self.grid.rebuild(store.positions(), input.bounds);
        let snapshot = Snapshot::of(store);

        self.contacts.resize(n, 0);
        for i in 0..n {
            let neighbors = self.grid.neighborhood(snapshot.positions[i]);
            self.lanes.gather(i, &snapshot, neighbors, None);

            let (packed, consumed) = count_packed(&self.lanes, &snapshot, i);
            let rest = self.lanes.index[consumed..].iter().copied();
            self.contacts[i] = packed + kernel::count_contacts(i, &snapshot, rest);
        }

        self.next_positions.resize(n, Vec2::ZERO);
        self.next_velocities.resize(n, Vec2::ZERO);
        for i in 0..n {
            let neighbors = self.grid.neighborhood(snapshot.positions[i]);
            self.lanes
                .gather(i, &snapshot, neighbors, Some(&self.contacts));

            let (mut push, mut kick, consumed) =
                respond_packed(&self.lanes, &snapshot, i, self.contacts[i]);
            for &j in &self.lanes.index[consumed..] {
                if let Some((dp, dv)) = kernel::pair_response(i, j, &snapshot, &self.contacts) {
                    push += dp;
                    kick += dv;
                }
            }

            (self.next_positions[i], self.next_velocities[i]) =
                kernel::finish(i, &snapshot, push, kick, input, self.restitution);
        }

        store.swap_motion(&mut self.next_positions, &mut self.next_velocities);
    }
}

/// Candidate neighbours of one particle, one array per component so each
/// register load is a single contiguous read.
#[derive(Debug, Default)]
struct NeighborLanes {
    index: Vec<usize>,
    x: Vec<f32>,
    y: Vec<f32>,
    vx: Vec<f32>,
    vy: Vec<f32>,
    radius: Vec<f32>,
    contacts: Vec<f32>,
}

impl NeighborLanes {
    fn clear(&mut self) {
        self.index.clear();
        self.x.clear();
        self.y.clear();
        self.vx.clear();
        self.vy.clear();
        self.radius.clear();
        self.contacts.clear();
    }

    fn gather(
        &mut self,
        i: usize,
        snapshot: &Snapshot<'_>,
        neighbors: impl Iterator<Item = usize>,
        contacts: Option<&[u32]>,
    ) {
        self.clear();

        for j in neighbors.filter(|&j| j != i) {
            let position = snapshot.positions[j];
            let velocity = snapshot.velocities[j];

            self.index.push(j);
            self.x.push(position.x);
            self.y.push(position.y);
            self.vx.push(velocity.x);
            self.vy.push(velocity.y);
            self.radius.push(snapshot.radii[j]);
            if let Some(contacts) = contacts {
                self.contacts.push(contacts[j] as f32);
            }
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn full_lanes(&self) -> usize {
        self.len() - self.len() % LANES
    }
}

/// Contacts found in whole registers, and how many candidates that covered.
#[cfg(target_arch = "x86_64")]
fn count_packed(lanes: &NeighborLanes, snapshot: &Snapshot<'_>, i: usize) -> (u32, usize) {
    let full = lanes.full_lanes();
    // SAFETY: `SimdBackend::new` refuses to build without AVX2 and `full` never
    // exceeds the gathered length.
    let count = unsafe {
        avx2::count_contacts(
            lanes,
            full,
            snapshot.positions[i],
            snapshot.velocities[i],
            snapshot.radii[i],
        )
    };
    (count, full)
}

#[cfg(not(target_arch = "x86_64"))]
fn count_packed(_lanes: &NeighborLanes, _snapshot: &Snapshot<'_>, _i: usize) -> (u32, usize) {
    (0, 0)
}

/// Summed position and velocity change from whole registers, and how many
/// candidates that covered.
#[cfg(target_arch = "x86_64")]
fn respond_packed(
    lanes: &NeighborLanes,
    snapshot: &Snapshot<'_>,
    i: usize,
    contacts: u32,
) -> (Vec2, Vec2, usize) {
    let full = lanes.full_lanes();
    // SAFETY: see `count_packed`.
    let (push, kick) = unsafe {
        avx2::respond(
            lanes,
            full,
            snapshot.positions[i],
            snapshot.velocities[i],
            snapshot.radii[i],
            contacts,
        )
    };
    (push, kick, full)
}

#[cfg(not(target_arch = "x86_64"))]
fn respond_packed(
    _lanes: &NeighborLanes,
    _snapshot: &Snapshot<'_>,
    _i: usize,
    _contacts: u32,
) -> (Vec2, Vec2, usize) {
    (Vec2::ZERO, Vec2::ZERO, 0)
}

#[cfg(target_arch = "x86_64")]
mod avx2 {
    use std::arch::x86_64::*;

    use glam::Vec2;

    use super::{NeighborLanes, LANES};
    use crate::kernel::MIN_DISTANCE_SQUARED;

    /// Lane values the kernel needs for both phases.
    struct Candidates {
        nx: __m256,
        ny: __m256,
        distance: __m256,
        reach: __m256,
        radius: __m256,
        touching: __m256,
        approach: __m256,
    }

    #[inline]
    #[target_feature(enable = "avx2")]
    unsafe fn load(values: &[f32], base: usize) -> __m256 {
        _mm256_loadu_ps(values.as_ptr().add(base))
    }

    #[inline]
    #[target_feature(enable = "avx2")]
    unsafe fn candidates(
        lanes: &NeighborLanes,
        base: usize,
        position: Vec2,
        velocity: Vec2,
        radius: f32,
    ) -> Candidates {
        let dx = _mm256_sub_ps(load(&lanes.x, base), _mm256_set1_ps(position.x));
        let dy = _mm256_sub_ps(load(&lanes.y, base), _mm256_set1_ps(position.y));
        let distance_squared = _mm256_add_ps(_mm256_mul_ps(dx, dx), _mm256_mul_ps(dy, dy));

        let other_radius = load(&lanes.radius, base);
        let reach = _mm256_add_ps(_mm256_set1_ps(radius), other_radius);
        let touching = _mm256_and_ps(
            _mm256_cmp_ps::<_CMP_LT_OQ>(distance_squared, _mm256_mul_ps(reach, reach)),
            _mm256_cmp_ps::<_CMP_GT_OQ>(distance_squared, _mm256_set1_ps(MIN_DISTANCE_SQUARED)),
        );

        // Lanes outside `touching` may hold NaN from here on, every use masks them.
        let distance = _mm256_sqrt_ps(distance_squared);
        let nx = _mm256_div_ps(dx, distance);
        let ny = _mm256_div_ps(dy, distance);

        let rvx = _mm256_sub_ps(_mm256_set1_ps(velocity.x), load(&lanes.vx, base));
        let rvy = _mm256_sub_ps(_mm256_set1_ps(velocity.y), load(&lanes.vy, base));
        let approach = _mm256_add_ps(_mm256_mul_ps(rvx, nx), _mm256_mul_ps(rvy, ny));

        Candidates {
            nx,
            ny,
            distance,
            reach,
            radius: other_radius,
            touching,
            approach,
        }
    }

    #[inline]
    #[target_feature(enable = "avx2")]
    unsafe fn sum(v: __m256) -> f32 {
        let mut out = [0.0f32; LANES];
        _mm256_storeu_ps(out.as_mut_ptr(), v);
        out.iter().sum()
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn count_contacts(
        lanes: &NeighborLanes,
        full: usize,
        position: Vec2,
        velocity: Vec2,
        radius: f32,
    ) -> u32 {
        let zero = _mm256_setzero_ps();
        let mut count = 0;

        for base in (0..full).step_by(LANES) {
            let c = candidates(lanes, base, position, velocity, radius);
            let approaching = _mm256_and_ps(c.touching, _mm256_cmp_ps::<_CMP_GT_OQ>(c.approach, zero));
            count += (_mm256_movemask_ps(approaching) as u32).count_ones();
        }

        count
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn respond(
        lanes: &NeighborLanes,
        full: usize,
        position: Vec2,
        velocity: Vec2,
        radius: f32,
        contacts: u32,
    ) -> (Vec2, Vec2) {
        let zero = _mm256_setzero_ps();
        let two = _mm256_set1_ps(2.0);
        let mass = _mm256_set1_ps(radius * radius);
        let own_contacts = _mm256_set1_ps(contacts.max(1) as f32);

        let mut push_x = zero;
        let mut push_y = zero;
        let mut kick_x = zero;
        let mut kick_y = zero;

        for base in (0..full).step_by(LANES) {
            let c = candidates(lanes, base, position, velocity, radius);

            // separation, split by radius
            let depth = _mm256_div_ps(
                _mm256_mul_ps(_mm256_sub_ps(c.reach, c.distance), c.radius),
                c.reach,
            );
            push_x = _mm256_sub_ps(push_x, _mm256_and_ps(c.touching, _mm256_mul_ps(c.nx, depth)));
            push_y = _mm256_sub_ps(push_y, _mm256_and_ps(c.touching, _mm256_mul_ps(c.ny, depth)));

            // elastic impulse, shared over the larger contact count
            let approaching = _mm256_and_ps(c.touching, _mm256_cmp_ps::<_CMP_GT_OQ>(c.approach, zero));
            let other_mass = _mm256_mul_ps(c.radius, c.radius);
            let shared = _mm256_max_ps(own_contacts, load(&lanes.contacts, base));
            let strength = _mm256_div_ps(
                _mm256_mul_ps(
                    _mm256_div_ps(_mm256_mul_ps(two, other_mass), _mm256_add_ps(mass, other_mass)),
                    c.approach,
                ),
                shared,
            );
            kick_x = _mm256_sub_ps(kick_x, _mm256_and_ps(approaching, _mm256_mul_ps(c.nx, strength)));
            kick_y = _mm256_sub_ps(kick_y, _mm256_and_ps(approaching, _mm256_mul_ps(c.ny, strength)));
        }

        (
            Vec2::new(sum(push_x), sum(push_y)),
            Vec2::new(sum(kick_x), sum(kick_y)),
        )
    }
}
