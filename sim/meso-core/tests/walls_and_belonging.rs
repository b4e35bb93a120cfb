//! Walls and belonging checkers driven through the coordinator, the way
//! driver scripts use them.

use meso_core::belonging::EllipsoidBelongingChecker;
use meso_core::ic::{ComQ, RigidIc, UniformIc};
use meso_core::integrators::VelocityVerlet;
use meso_core::interactions::factory;
use meso_core::pvs::{AnyVector, ParticleVector, RigidVector};
use meso_core::walls::{PlaneWall, Wall};
use meso_core::{Coordinator, CoordinatorConfig, Real, Vector3};

fn base_coordinator(domain: Vector3<Real>) -> Coordinator {
    let config = CoordinatorConfig::new(domain, 0.001)
        .with_log_filename("stderr")
        .with_debug_level(2);
    Coordinator::new(config).expect("coordinator")
}

fn slab_walls(u: &mut Coordinator, lo: Real, hi: Real) {
    // Fluid slab between global z = lo and z = hi.
    u.register_wall(
        Wall::new("top", Box::new(PlaneWall::new(Vector3::new(0.0, 0.0, 1.0), hi))),
        10,
    )
    .expect("top wall");
    u.register_wall(
        Wall::new(
            "bottom",
            Box::new(PlaneWall::new(Vector3::new(0.0, 0.0, -1.0), -lo)),
        ),
        10,
    )
    .expect("bottom wall");
}

#[test]
fn wall_bounce_confines_the_fluid() {
    let mut u = base_coordinator(Vector3::new(6.0, 6.0, 6.0));
    slab_walls(&mut u, 1.0, 5.0);

    u.register_particle_vector(
        AnyVector::Plain(ParticleVector::new("solvent", 1.0)),
        Some(&UniformIc::new(4.0)),
        0,
    )
    .expect("solvent");

    u.register_interaction(factory::dpd("dpd", 1.0, 10.0, 10.0, 1.0, 0.5))
        .expect("dpd");
    u.set_interaction("dpd", "solvent", "solvent").expect("set dpd");
    u.register_integrator(Box::new(VelocityVerlet::new("vv")))
        .expect("vv");
    u.set_integrator("vv", "solvent").expect("set vv");

    u.set_wall("top", "solvent").expect("attach top");
    u.set_wall("bottom", "solvent").expect("attach bottom");

    u.run(100).expect("run");

    let sim = u.simulation();
    let domain = *sim.domain();
    for p in &sim.pv(0).pv().local.positions {
        let z = domain.local_to_global(*p).z;
        assert!(
            (0.95..=5.05).contains(&z),
            "particle left the slab at z = {z}"
        );
    }
}

#[test]
fn frozen_wall_layer_plus_mc_volume() {
    let mut u = base_coordinator(Vector3::new(6.0, 6.0, 6.0));
    slab_walls(&mut u, 1.0, 5.0);

    // Two thirds of the box are fluid.
    let volume = u
        .compute_volume_inside_walls(&["top", "bottom"], 100_000)
        .expect("mc volume");
    assert!((volume - 144.0).abs() < 8.0, "volume {volume}");

    let idx = u
        .make_frozen_wall_particles(
            "wall_frozen",
            &["top", "bottom"],
            vec![factory::dpd("dpd_eq", 1.0, 10.0, 10.0, 1.0, 0.5)],
            Box::new(VelocityVerlet::new("vv_eq")),
            4.0,
            50,
        )
        .expect("frozen layer");

    let pv = u.simulation().pv(idx);
    assert!(!pv.pv().local.is_empty());
    // All frozen particles carry zero velocity.
    assert!(pv.pv().local.velocities.iter().all(|v| v.norm() == 0.0));
}

#[test]
fn sdf_dump_writes_grid() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut u = base_coordinator(Vector3::new(4.0, 4.0, 4.0));
    slab_walls(&mut u, 1.0, 3.0);

    let base = dir.path().join("xdmf_wall").to_string_lossy().into_owned();
    u.dump_walls_sdf(&["top", "bottom"], Vector3::new(0.5, 0.5, 0.5), &base)
        .expect("dump sdf");
    assert!(std::fs::metadata(format!("{base}.sdf")).is_ok());
    assert!(std::fs::metadata(format!("{base}.json")).is_ok());
}

#[test]
fn frozen_rigid_particles_lie_inside_the_shape() {
    let mut u = base_coordinator(Vector3::new(9.0, 9.0, 9.0));

    let axes = Vector3::new(2.0, 2.0, 2.0);
    let coords = vec![Vector3::zeros()];
    let rov = RigidVector::ellipsoid("shape", 1.0, coords.len(), axes, None);
    u.register_particle_vector(
        AnyVector::Rigid(rov),
        Some(&RigidIc {
            com_q: vec![ComQ::from_row([4.5, 4.5, 4.5, 1.0, 0.0, 0.0, 0.0])],
            coords,
        }),
        0,
    )
    .expect("shape");

    let checker = EllipsoidBelongingChecker::new("shapeChecker");
    let idx = u
        .make_frozen_rigid_particles(
            &checker,
            "shape",
            vec![factory::dpd("dpd_eq", 1.0, 10.0, 10.0, 1.0, 0.5)],
            Box::new(VelocityVerlet::new("vv_eq")),
            6.0,
            30,
        )
        .expect("frozen rigid");

    let sim = u.simulation();
    let pv = sim.pv(idx);
    assert_eq!(pv.name(), "shape_frozen");
    assert!(!pv.pv().local.is_empty());

    let motion = sim
        .pv(sim.pv_index("shape").expect("shape"))
        .as_rigid()
        .expect("rigid")
        .motions[0];
    for p in &pv.pv().local.positions {
        let b = p - motion.com;
        let e = (b.x / axes.x).powi(2) + (b.y / axes.y).powi(2) + (b.z / axes.z).powi(2);
        assert!(e < 1.0, "frozen particle outside the shape: e = {e}");
    }
}

#[test]
fn belonging_split_creates_frozen_ellipsoid() {
    let mut u = base_coordinator(Vector3::new(9.0, 9.0, 9.0));

    u.register_particle_vector(
        AnyVector::Plain(ParticleVector::new("pv", 1.0)),
        Some(&UniformIc::new(8.0)),
        0,
    )
    .expect("solvent");

    let axes = Vector3::new(3.0, 3.0, 3.0);
    let coords = vec![
        Vector3::new(-axes.x, -axes.y, -axes.z),
        Vector3::new(axes.x, axes.y, axes.z),
    ];
    let rov = RigidVector::ellipsoid("OV", 1.0, coords.len(), axes, None);
    u.register_particle_vector(
        AnyVector::Rigid(rov),
        Some(&RigidIc {
            com_q: vec![ComQ::from_row([4.5, 4.5, 4.5, 1.0, 0.0, 0.0, 0.0])],
            coords,
        }),
        0,
    )
    .expect("shape");

    u.register_object_belonging_checker(
        Box::new(EllipsoidBelongingChecker::new("ellipsoidChecker")),
        "OV",
    )
    .expect("checker");

    let frozen = u
        .apply_object_belonging_checker("ellipsoidChecker", "pv", 500, "frozenEllipsoid", "", 0)
        .expect("apply checker")
        .expect("new pv created");

    u.register_integrator(Box::new(VelocityVerlet::new("vv")))
        .expect("vv");
    u.set_integrator("vv", "pv").expect("vv pv");

    u.run(5).expect("run");

    let sim = u.simulation();
    let n_inside = sim.pv(frozen).pv().local.len();
    let n_outside = sim.pv(sim.pv_index("pv").expect("pv")).pv().local.len();

    // Volume fraction of a radius-3 ball in a 9^3 box is ~15.5%.
    let total = (n_inside + n_outside) as f64;
    let fraction = n_inside as f64 / total;
    assert!(
        (0.10..0.22).contains(&fraction),
        "inside fraction {fraction} ({n_inside}/{total})"
    );

    // The split respects the surface.
    let rov_idx = sim.pv_index("OV").expect("ov");
    let motion = sim.pv(rov_idx).as_rigid().expect("rigid").motions[0];
    for p in &sim.pv(frozen).pv().local.positions {
        let b = p - motion.com;
        let e = (b.x / axes.x).powi(2) + (b.y / axes.y).powi(2) + (b.z / axes.z).powi(2);
        assert!(e < 1.05, "frozen particle outside the ellipsoid: e = {e}");
    }
}
