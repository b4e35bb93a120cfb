//! MDPD and SDPD fluids: the intermediate density pass feeding the final
//! force pass.

use hashbrown::HashMap;
use meso_core::ic::UniformIc;
use meso_core::integrators::VelocityVerlet;
use meso_core::interactions::factory;
use meso_core::pvs::{channel_names, AnyVector, ParticleVector};
use meso_core::{Coordinator, CoordinatorConfig, Real, Vector3};

fn base(density: Real) -> Coordinator {
    let config = CoordinatorConfig::new(Vector3::new(6.0, 6.0, 6.0), 0.001)
        .with_log_filename("stderr")
        .with_debug_level(2);
    let mut u = Coordinator::new(config).expect("coordinator");
    u.register_particle_vector(
        AnyVector::Plain(ParticleVector::new("solvent", 1.0)),
        Some(&UniformIc::new(density)),
        0,
    )
    .expect("solvent");
    u.register_integrator(Box::new(VelocityVerlet::new("vv")))
        .expect("vv");
    u
}

#[test]
fn mdpd_requires_a_density_interaction() {
    let mut u = base(6.0);
    u.register_interaction(factory::mdpd("mdpd", 1.0, 0.75, -40.0, 25.0, 4.5, 0.1, 0.5))
        .expect("mdpd");
    u.set_interaction("mdpd", "solvent", "solvent").expect("set");
    u.set_integrator("vv", "solvent").expect("vv");

    let err = u.run(1).expect_err("must fail without densities");
    assert!(err.to_string().contains("densities"), "{err}");
}

#[test]
fn mdpd_fluid_runs_and_computes_densities() {
    let mut u = base(6.0);
    u.register_interaction(factory::density("den", 0.75, "MDPD").expect("density"))
        .expect("register density");
    u.set_interaction("den", "solvent", "solvent").expect("set den");
    u.register_interaction(factory::mdpd("mdpd", 1.0, 0.75, -40.0, 25.0, 4.5, 0.1, 0.5))
        .expect("mdpd");
    u.set_interaction("mdpd", "solvent", "solvent").expect("set mdpd");
    u.set_integrator("vv", "solvent").expect("vv");

    u.run(20).expect("run");

    let set = &u.simulation().pv(0).pv().local;
    let densities = set
        .channels
        .scalar(channel_names::DENSITIES)
        .expect("densities channel");
    let mean: f64 =
        densities.iter().map(|&d| f64::from(d)).sum::<f64>() / densities.len() as f64;
    // The smoothed density is the number density plus the self-contribution
    // w(0) = 15 / (2 pi rd^3) of the normalized weight.
    let w0 = 15.0 / (2.0 * std::f64::consts::PI * 0.75f64.powi(3));
    let expected = 6.0 + w0;
    assert!(
        (mean - expected).abs() < 2.5,
        "mean density {mean} vs {expected}"
    );
    assert!(set.positions.iter().all(|p| p.iter().all(|c| c.is_finite())));
}

#[test]
fn sdpd_fluid_is_stable() {
    let mut params = HashMap::new();
    params.insert("sound_speed".to_owned(), 8.0 as Real);

    let mut u = base(8.0);
    u.register_interaction(factory::density("den", 1.0, "WendlandC2").expect("density"))
        .expect("register density");
    u.set_interaction("den", "solvent", "solvent").expect("set den");
    u.register_interaction(
        factory::sdpd("sdpd", 1.0, 5.0, 0.05, "Linear", "WendlandC2", false, &params)
            .expect("sdpd"),
    )
    .expect("register sdpd");
    u.set_interaction("sdpd", "solvent", "solvent").expect("set sdpd");
    u.set_integrator("vv", "solvent").expect("vv");

    u.run(20).expect("run");

    let set = &u.simulation().pv(0).pv().local;
    assert!(set
        .velocities
        .iter()
        .all(|v| v.iter().all(|c| c.is_finite())));

    let p_total: Vector3<Real> = set.velocities.iter().sum();
    assert!(
        p_total.norm() / (set.len() as Real) < 0.1,
        "momentum per particle {}",
        p_total.norm() / set.len() as Real
    );
}

#[test]
fn stress_output_appears_when_requested() {
    let mut u = base(4.0);
    u.register_interaction(factory::dpd_with_stress(
        "dpd", 1.0, 10.0, 10.0, 0.5, 0.5, 0.0,
    ))
    .expect("dpd");
    u.set_interaction("dpd", "solvent", "solvent").expect("set");
    u.set_integrator("vv", "solvent").expect("vv");
    u.run(3).expect("run");

    let set = &u.simulation().pv(0).pv().local;
    let stresses = set
        .channels
        .stress(channel_names::STRESSES)
        .expect("stress channel");
    // A dense repulsive fluid has positive pressure: positive trace on
    // average.
    let trace: f64 = stresses
        .iter()
        .map(|s| f64::from(s.xx + s.yy + s.zz))
        .sum::<f64>()
        / stresses.len() as f64;
    assert!(trace > 0.0, "mean stress trace {trace}");
}
