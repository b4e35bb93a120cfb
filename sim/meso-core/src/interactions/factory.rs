//! Construction of interactions from descriptor strings and parameter maps.
//!
//! Driver code selects models by name ("wlc" / "Lim", "Kantor" /
//! "Juelicher", "MDPD" / "WendlandC2", "Linear" / "QuasiIncompressible")
//! and passes numeric parameters in a string-keyed map; invalid
//! combinations are configuration errors.

use hashbrown::HashMap;
use meso_types::{Real, Result, SimError};

use super::membrane::params::{read_bending, read_common, read_shear};
use super::membrane::MembraneForces;
use super::pairwise::density::{DensityKernel, MdpdDensityWeight, WendlandC2Weight};
use super::pairwise::dpd::DpdKernel;
use super::pairwise::lj::LjKernel;
use super::pairwise::mdpd::MdpdKernel;
use super::pairwise::sdpd::{LinearEos, QuasiIncompressibleEos, SdpdKernel};
use super::pairwise::{PairwiseDensity, PairwiseForces};
use super::Interaction;

fn read(map: &HashMap<String, Real>, key: &str) -> Result<Real> {
    map.get(key)
        .copied()
        .ok_or_else(|| SimError::invalid_config(format!("missing parameter '{key}'")))
}

/// Classical DPD forces.
#[must_use]
pub fn dpd(
    name: &str,
    rc: Real,
    a: Real,
    gamma: Real,
    kbt: Real,
    power: Real,
) -> Box<dyn Interaction> {
    Box::new(PairwiseForces::new(
        name,
        DpdKernel::new(rc, a, gamma, kbt, power, 0x4242_4242),
    ))
}

/// DPD forces with periodic per-particle stress output.
#[must_use]
pub fn dpd_with_stress(
    name: &str,
    rc: Real,
    a: Real,
    gamma: Real,
    kbt: Real,
    power: Real,
    stress_period: Real,
) -> Box<dyn Interaction> {
    Box::new(
        PairwiseForces::new(name, DpdKernel::new(rc, a, gamma, kbt, power, 0x4242_4242))
            .with_stress(stress_period),
    )
}

/// MDPD forces (require a density interaction on the same particle
/// vectors).
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn mdpd(
    name: &str,
    rc: Real,
    rd: Real,
    a: Real,
    b: Real,
    gamma: Real,
    kbt: Real,
    power: Real,
) -> Box<dyn Interaction> {
    Box::new(PairwiseForces::new(
        name,
        MdpdKernel::new(rc, rd, a, b, gamma, kbt, power, 0x4242_4242),
    ))
}

/// Repulsive Lennard-Jones contact forces.
#[must_use]
pub fn lj(
    name: &str,
    rc: Real,
    epsilon: Real,
    sigma: Real,
    max_force: Real,
    object_aware: bool,
) -> Box<dyn Interaction> {
    Box::new(PairwiseForces::new(
        name,
        LjKernel::new(rc, epsilon, sigma, max_force, object_aware),
    ))
}

/// Intermediate density interaction.
///
/// # Errors
///
/// Unknown density kernel descriptor.
pub fn density(name: &str, rc: Real, kernel: &str) -> Result<Box<dyn Interaction>> {
    match kernel {
        "MDPD" => Ok(Box::new(PairwiseDensity::new(
            name,
            DensityKernel::new(rc, MdpdDensityWeight),
        ))),
        "WendlandC2" => Ok(Box::new(PairwiseDensity::new(
            name,
            DensityKernel::new(rc, WendlandC2Weight),
        ))),
        other => Err(SimError::invalid_config(format!(
            "invalid density '{other}'"
        ))),
    }
}

/// SDPD forces over a Wendland C2 density (which must be computed by a
/// `WendlandC2` density interaction).
///
/// # Errors
///
/// Unknown EOS descriptor, missing parameters.
#[allow(clippy::too_many_arguments)]
pub fn sdpd(
    name: &str,
    rc: Real,
    viscosity: Real,
    kbt: Real,
    eos: &str,
    density_kernel: &str,
    stress: bool,
    parameters: &HashMap<String, Real>,
) -> Result<Box<dyn Interaction>> {
    if density_kernel != "WendlandC2" {
        return Err(SimError::invalid_config(format!(
            "invalid density '{density_kernel}'"
        )));
    }

    let stress_period = if stress {
        Some(read(parameters, "stress_period")?)
    } else {
        None
    };

    let boxed: Box<dyn Interaction> = match eos {
        "Linear" => {
            let sound_speed = read(parameters, "sound_speed")?;
            let kernel = SdpdKernel::new(rc, LinearEos { sound_speed }, viscosity, kbt, 0x5d9d);
            match stress_period {
                Some(period) => Box::new(PairwiseForces::new(name, kernel).with_stress(period)),
                None => Box::new(PairwiseForces::new(name, kernel)),
            }
        }
        "QuasiIncompressible" => {
            let p0 = read(parameters, "p0")?;
            let rho_r = read(parameters, "rho_r")?;
            let kernel =
                SdpdKernel::new(rc, QuasiIncompressibleEos { p0, rho_r }, viscosity, kbt, 0x5d9d);
            match stress_period {
                Some(period) => Box::new(PairwiseForces::new(name, kernel).with_stress(period)),
                None => Box::new(PairwiseForces::new(name, kernel)),
            }
        }
        other => Err(SimError::invalid_config(format!(
            "invalid pressure parameter: '{other}'"
        )))?,
    };
    Ok(boxed)
}

/// Membrane forces from model descriptors and a parameter map, as a
/// concrete value (the sub-stepping integrator owns one directly).
///
/// # Errors
///
/// Unknown model combination or missing parameters.
pub fn membrane_forces(
    name: &str,
    shear_desc: &str,
    bending_desc: &str,
    parameters: &HashMap<String, Real>,
    stress_free: bool,
    grow_until: Real,
) -> Result<MembraneForces> {
    let common = read_common(parameters)?;
    let shear = read_shear(shear_desc, parameters)?;
    let bending = read_bending(bending_desc, parameters)?;
    Ok(MembraneForces::new(
        name,
        common,
        shear,
        bending,
        stress_free,
        grow_until,
    ))
}

/// Membrane forces as a registrable interaction.
///
/// # Errors
///
/// Unknown model combination or missing parameters.
pub fn membrane(
    name: &str,
    shear_desc: &str,
    bending_desc: &str,
    parameters: &HashMap<String, Real>,
    stress_free: bool,
    grow_until: Real,
) -> Result<Box<dyn Interaction>> {
    Ok(Box::new(membrane_forces(
        name,
        shear_desc,
        bending_desc,
        parameters,
        stress_free,
        grow_until,
    )?))
}
