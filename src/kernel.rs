//! Per-particle collision kernel shared by every backend.
//!
//! A tick reads an immutable [`Snapshot`] of the previous state and produces
//! each particle's next position and velocity independently, in two phases:
//!
//! 1. [`count_contacts`]: how many neighbours a particle is approaching.
//! 2. [`advance`]: positional separation and elastic impulse from every
//!    overlapping neighbour, then integration and wall reflection.
//!
//! Both sides of a pair evaluate the same impulse with opposite normals, so
//! the outcome doesn't depend on which particle is evaluated first. Impulses
//! are divided by the larger contact count of the pair, which leaves an
//! isolated pair with the exact elastic exchange and keeps crowded contacts
//! from adding kinetic energy.

use glam::Vec2;

use crate::{config::Bounds, particle::ParticleStore};

/// Squared distances at or below this have no usable collision normal.
pub const MIN_DISTANCE_SQUARED: f32 = f32::EPSILON;

/// Pointer driven attraction, only honoured by the GPU backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interaction {
    pub position: Vec2,
    pub active: bool,
}

/// Everything the frame bridge hands to the simulation for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInput {
    pub dt: f32,
    pub bounds: Bounds,
    pub interaction: Option<Interaction>,
}

impl TickInput {
    pub fn new(dt: f32, bounds: Bounds) -> Self {
        Self {
            dt,
            bounds,
            interaction: None,
        }
    }
}

/// Read-only view of the state at the start of a tick.
#[derive(Clone, Copy)]
pub struct Snapshot<'a> {
    pub positions: &'a [Vec2],
    pub velocities: &'a [Vec2],
    pub radii: &'a [f32],
}

impl<'a> Snapshot<'a> {
    pub fn of(store: &'a ParticleStore) -> Self {
        Self {
            positions: store.positions(),
            velocities: store.velocities(),
            radii: store.radii(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Unit normal from `a` towards `b` and the centre distance, if the circles
/// overlap.
#[inline]
pub fn overlap(a: Vec2, b: Vec2, reach: f32) -> Option<(Vec2, f32)> {
    let delta = b - a;
    let distance_squared = delta.length_squared();

    if distance_squared >= reach * reach || distance_squared <= MIN_DISTANCE_SQUARED {
        return None;
    }

    let distance = distance_squared.sqrt();
    Some((delta / distance, distance))
}

/// Area proportional mass.
#[inline]
pub fn mass(radius: f32) -> f32 {
    radius * radius
}

/// Displacement of `a` pushing it out of `b`, the pair splits the overlap by
/// radius.
#[inline]
pub fn separation(normal: Vec2, distance: f32, radius_a: f32, radius_b: f32) -> Vec2 {
    let reach = radius_a + radius_b;
    -normal * ((reach - distance) * radius_b / reach)
}

/// Velocity change of `a` from an elastic collision with `b` along `normal`,
/// shared out over `contacts` simultaneous collisions.
#[inline]
pub fn impulse(normal: Vec2, approach: f32, radius_a: f32, radius_b: f32, contacts: f32) -> Vec2 {
    let mass_a = mass(radius_a);
    let mass_b = mass(radius_b);
    -normal * (2.0 * mass_b / (mass_a + mass_b) * approach / contacts)
}

/// Number of neighbours particle `i` overlaps and moves towards.
pub fn count_contacts(
    i: usize,
    snapshot: &Snapshot<'_>,
    neighbors: impl Iterator<Item = usize>,
) -> u32 {
    let position = snapshot.positions[i];
    let velocity = snapshot.velocities[i];
    let radius = snapshot.radii[i];

    let mut contacts = 0;
    for j in neighbors {
        if j == i {
            continue;
        }

        let reach = radius + snapshot.radii[j];
        if let Some((normal, _)) = overlap(position, snapshot.positions[j], reach) {
            if (velocity - snapshot.velocities[j]).dot(normal) > 0.0 {
                contacts += 1;
            }
        }
    }

    contacts
}

/// Position and velocity change `i` receives from `j`, if they touch.
#[inline]
pub fn pair_response(
    i: usize,
    j: usize,
    snapshot: &Snapshot<'_>,
    contacts: &[u32],
) -> Option<(Vec2, Vec2)> {
    let radius_a = snapshot.radii[i];
    let radius_b = snapshot.radii[j];
    let (normal, distance) = overlap(
        snapshot.positions[i],
        snapshot.positions[j],
        radius_a + radius_b,
    )?;

    let push = separation(normal, distance, radius_a, radius_b);

    let approach = (snapshot.velocities[i] - snapshot.velocities[j]).dot(normal);
    let kick = if approach > 0.0 {
        let shared = contacts[i].max(contacts[j]).max(1) as f32;
        impulse(normal, approach, radius_a, radius_b, shared)
    } else {
        Vec2::ZERO
    };

    Some((push, kick))
}

/// Next position and velocity of particle `i`.
pub fn advance(
    i: usize,
    snapshot: &Snapshot<'_>,
    contacts: &[u32],
    neighbors: impl Iterator<Item = usize>,
    input: &TickInput,
    restitution: f32,
) -> (Vec2, Vec2) {
    let mut push = Vec2::ZERO;
    let mut kick = Vec2::ZERO;

    for j in neighbors {
        if j == i {
            continue;
        }

        if let Some((dp, dv)) = pair_response(i, j, snapshot, contacts) {
            push += dp;
            kick += dv;
        }
    }

    finish(i, snapshot, push, kick, input, restitution)
}

/// Applies accumulated collision response, then integrates and reflects.
#[inline]
pub fn finish(
    i: usize,
    snapshot: &Snapshot<'_>,
    push: Vec2,
    kick: Vec2,
    input: &TickInput,
    restitution: f32,
) -> (Vec2, Vec2) {
    let position = snapshot.positions[i] + push;
    let velocity = snapshot.velocities[i] + kick;
    integrate(
        position,
        velocity,
        snapshot.radii[i],
        input.dt,
        input.bounds,
        restitution,
    )
}

#[inline]
pub fn integrate(
    position: Vec2,
    velocity: Vec2,
    radius: f32,
    dt: f32,
    bounds: Bounds,
    restitution: f32,
) -> (Vec2, Vec2) {
    reflect(position + velocity * dt, velocity, radius, bounds, restitution)
}

/// Keeps the circle inside the bounds, turning the velocity component that
/// points through a wall around. Bounds narrower than the diameter pin the
/// circle against the near wall.
#[inline]
pub fn reflect(
    mut position: Vec2,
    mut velocity: Vec2,
    radius: f32,
    bounds: Bounds,
    restitution: f32,
) -> (Vec2, Vec2) {
    if position.x - radius < 0.0 {
        position.x = radius;
        velocity.x = velocity.x.abs() * restitution;
    } else if position.x + radius > bounds.right {
        position.x = (bounds.right - radius).max(radius);
        velocity.x = -velocity.x.abs() * restitution;
    }

    if position.y - radius < 0.0 {
        position.y = radius;
        velocity.y = velocity.y.abs() * restitution;
    } else if position.y + radius > bounds.bottom {
        position.y = (bounds.bottom - radius).max(radius);
        velocity.y = -velocity.y.abs() * restitution;
    }

    (position, velocity)
}

/// Runs both phases over every particle against every other one. Slow, only
/// meant as a reference for the real backends.
pub fn step_all_pairs(store: &mut ParticleStore, input: &TickInput, restitution: f32) {
    let snapshot = Snapshot::of(store);
    let n = snapshot.len();

    let contacts: Vec<u32> = (0..n)
        .map(|i| count_contacts(i, &snapshot, 0..n))
        .collect();
    let (mut positions, mut velocities): (Vec<Vec2>, Vec<Vec2>) = (0..n)
        .map(|i| advance(i, &snapshot, &contacts, 0..n, input, restitution))
        .unzip();

    store.swap_motion(&mut positions, &mut velocities);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Particle;
    use glam::Vec3;
    use proptest::prelude::*;

    fn particle(position: Vec2, velocity: Vec2, radius: f32) -> Particle {
        Particle {
            position,
            velocity,
            color: Vec3::ONE,
            radius,
        }
    }

    fn kinetic_energy(store: &ParticleStore) -> f64 {
        store
            .velocities()
            .iter()
            .zip(store.radii())
            .map(|(v, &r)| 0.5 * mass(r) as f64 * v.length_squared() as f64)
            .sum()
    }

    const OPEN: Bounds = Bounds {
        right: 1000.0,
        bottom: 1000.0,
    };

    #[test]
    fn wall_reverses_normal_velocity() {
        let bounds = Bounds::new(100.0, 100.0);

        let (position, velocity) = integrate(
            Vec2::new(98.5, 50.0),
            Vec2::new(10.0, 0.0),
            1.0,
            0.1,
            bounds,
            1.0,
        );
        assert_eq!(position, Vec2::new(99.0, 50.0));
        assert_eq!(velocity, Vec2::new(-10.0, 0.0));

        let (position, velocity) = integrate(
            Vec2::new(50.0, 1.5),
            Vec2::new(3.0, -10.0),
            1.0,
            0.1,
            bounds,
            1.0,
        );
        assert!(position.abs_diff_eq(Vec2::new(50.3, 1.0), 1e-5));
        assert_eq!(velocity, Vec2::new(3.0, 10.0));
    }

    #[test]
    fn wall_does_not_flip_particles_already_leaving() {
        let bounds = Bounds::new(100.0, 100.0);
        let (position, velocity) =
            reflect(Vec2::new(0.5, 50.0), Vec2::new(2.0, 0.0), 1.0, bounds, 1.0);

        assert_eq!(position, Vec2::new(1.0, 50.0));
        assert_eq!(velocity, Vec2::new(2.0, 0.0));
    }

    #[test]
    fn bounds_narrower_than_the_circle_pin_it_to_the_near_wall() {
        let bounds = Bounds::new(3.0, 100.0);
        let (position, velocity) =
            reflect(Vec2::new(2.5, 50.0), Vec2::new(4.0, 0.0), 2.0, bounds, 1.0);

        assert_eq!(position, Vec2::new(2.0, 50.0));
        assert_eq!(velocity, Vec2::new(-4.0, 0.0));
        assert!(position.x - 2.0 >= 0.0);
    }

    #[test]
    fn restitution_damps_wall_bounces() {
        let bounds = Bounds::new(100.0, 100.0);
        let (_, velocity) = reflect(
            Vec2::new(50.0, 99.5),
            Vec2::new(0.0, 8.0),
            1.0,
            bounds,
            0.5,
        );
        assert_eq!(velocity, Vec2::new(0.0, -4.0));
    }

    #[test]
    fn equal_masses_exchange_velocity_head_on() {
        let normal = Vec2::X;
        let va = Vec2::new(1.0, 0.0);
        let vb = Vec2::new(-1.0, 0.0);
        let approach = (va - vb).dot(normal);

        let a = va + impulse(normal, approach, 1.0, 1.0, 1.0);
        let b = vb + impulse(-normal, (vb - va).dot(-normal), 1.0, 1.0, 1.0);

        assert_eq!(a, Vec2::new(-1.0, 0.0));
        assert_eq!(b, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn overlapping_pair_is_pushed_apart_by_radius() {
        let mut store = ParticleStore::from_particles([
            particle(Vec2::new(100.0, 100.0), Vec2::ZERO, 1.0),
            particle(Vec2::new(102.0, 100.0), Vec2::ZERO, 3.0),
        ]);
        step_all_pairs(&mut store, &TickInput::new(0.0, OPEN), 1.0);

        // 2 units of overlap, the small one takes 3/4 of it
        let p = store.positions();
        assert!((p[0].x - 98.5).abs() < 1e-5);
        assert!((p[1].x - 102.5).abs() < 1e-5);
        assert_eq!(store.velocities(), &[Vec2::ZERO, Vec2::ZERO]);
    }

    #[test]
    fn separating_pair_gets_no_impulse() {
        let mut store = ParticleStore::from_particles([
            particle(Vec2::new(100.0, 100.0), Vec2::new(-1.0, 0.0), 1.0),
            particle(Vec2::new(101.5, 100.0), Vec2::new(1.0, 0.0), 1.0),
        ]);
        step_all_pairs(&mut store, &TickInput::new(0.0, OPEN), 1.0);

        assert_eq!(
            store.velocities(),
            &[Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)]
        );
    }

    #[test]
    fn coincident_centres_are_ignored() {
        let mut store = ParticleStore::from_particles([
            particle(Vec2::new(100.0, 100.0), Vec2::X, 1.0),
            particle(Vec2::new(100.0, 100.0), -Vec2::X, 1.0),
        ]);
        step_all_pairs(&mut store, &TickInput::new(0.0, OPEN), 1.0);

        assert!(store.positions().iter().all(|p| p.is_finite()));
        assert_eq!(store.velocities(), &[Vec2::X, -Vec2::X]);
    }

    #[test]
    fn oblique_collision_of_unequal_circles_conserves_energy() {
        let mut store = ParticleStore::from_particles([
            particle(Vec2::new(100.0, 100.0), Vec2::new(3.0, 1.0), 2.0),
            particle(Vec2::new(104.0, 102.0), Vec2::new(-1.0, -0.5), 3.5),
        ]);
        let before = kinetic_energy(&store);
        step_all_pairs(&mut store, &TickInput::new(0.0, OPEN), 1.0);
        let after = kinetic_energy(&store);

        assert!(((after - before) / before).abs() < 1e-5, "{before} -> {after}");
        assert_ne!(store.velocities()[0], Vec2::new(3.0, 1.0));
    }

    proptest! {
        #[test]
        fn crowded_contacts_never_add_energy(
            bodies in prop::collection::vec(
                ((490.0f32..510.0, 490.0f32..510.0), (-5.0f32..5.0, -5.0f32..5.0), 1.0f32..4.0),
                2..10,
            ),
        ) {
            let mut store = ParticleStore::from_particles(bodies.iter().map(|&((x, y), (vx, vy), r)| {
                particle(Vec2::new(x, y), Vec2::new(vx, vy), r)
            }));

            let before = kinetic_energy(&store);
            step_all_pairs(&mut store, &TickInput::new(0.0, OPEN), 1.0);
            let after = kinetic_energy(&store);

            prop_assert!(after <= before * (1.0 + 1e-4) + 1e-6, "{} -> {}", before, after);
        }
    }
}
