//! Membrane force parameters.
//!
//! Parameters arrive as a string-keyed map, the way driver code assembles
//! them; missing keys are configuration errors naming the key.

use hashbrown::HashMap;
use meso_types::{Real, Result, SimError};

/// Parameters shared by every membrane model.
#[derive(Debug, Clone, Copy)]
pub struct CommonMembraneParams {
    /// Target total surface area.
    pub tot_area: Real,
    /// Target enclosed volume.
    pub tot_volume: Real,
    /// Global area constraint stiffness.
    pub ka_tot: Real,
    /// Global volume constraint stiffness.
    pub kv_tot: Real,
    /// Central (along-bond) membrane friction.
    pub gamma_c: Real,
    /// Tangential membrane friction.
    pub gamma_t: Real,
    /// Temperature; thermal forces are enabled when positive.
    pub kbt: Real,
}

impl CommonMembraneParams {
    /// Whether fluctuation forces are active.
    #[must_use]
    pub fn fluctuation_forces(&self) -> bool {
        self.kbt > 1e-6
    }
}

/// In-plane elasticity model.
#[derive(Debug, Clone, Copy)]
pub enum ShearModel {
    /// Worm-like-chain bonds with a power-law repulsion and local area
    /// conservation.
    Wlc {
        /// Equilibrium spring extension ratio `l0 / lmax`.
        x0: Real,
        /// Spring constant.
        ks: Real,
        /// Exponent of the repulsive power term.
        mpow: Real,
        /// Local area conservation stiffness.
        kd: Real,
    },
    /// The Lim-Wortis-Mukhopadhyay strain-invariant energy.
    Lim {
        /// Area compression modulus.
        ka: Real,
        /// Cubic area strain coefficient.
        a3: Real,
        /// Quartic area strain coefficient.
        a4: Real,
        /// Shear modulus.
        mu: Real,
        /// Area-shear coupling coefficient.
        b1: Real,
        /// Quadratic shear coefficient.
        b2: Real,
    },
}

/// Out-of-plane bending model.
#[derive(Debug, Clone, Copy)]
pub enum BendingModel {
    /// Kantor-Nelson dihedral springs.
    Kantor {
        /// Bending stiffness.
        kb: Real,
        /// Spontaneous dihedral angle.
        theta: Real,
    },
    /// Jülicher discrete curvature energy with an area-difference term.
    Juelicher {
        /// Bending stiffness.
        kb: Real,
        /// Spontaneous curvature.
        c0: Real,
        /// Area-difference elasticity stiffness.
        kad: Real,
        /// Spontaneous area difference.
        da0: Real,
    },
}

fn read(map: &HashMap<String, Real>, key: &str) -> Result<Real> {
    map.get(key)
        .copied()
        .ok_or_else(|| SimError::invalid_config(format!("missing membrane parameter '{key}'")))
}

/// Read the common parameter block.
///
/// # Errors
///
/// Missing keys produce a configuration error naming the key.
pub fn read_common(map: &HashMap<String, Real>) -> Result<CommonMembraneParams> {
    Ok(CommonMembraneParams {
        tot_area: read(map, "tot_area")?,
        tot_volume: read(map, "tot_volume")?,
        ka_tot: read(map, "ka_tot")?,
        kv_tot: read(map, "kv_tot")?,
        gamma_c: read(map, "gammaC")?,
        gamma_t: read(map, "gammaT")?,
        kbt: read(map, "kBT")?,
    })
}

/// Read a shear model block by its selector string (`"wlc"` or `"Lim"`).
///
/// # Errors
///
/// Unknown selector or missing keys.
pub fn read_shear(desc: &str, map: &HashMap<String, Real>) -> Result<ShearModel> {
    match desc {
        "wlc" => Ok(ShearModel::Wlc {
            x0: read(map, "x0")?,
            ks: read(map, "ks")?,
            mpow: read(map, "mpow")?,
            kd: read(map, "ka")?,
        }),
        "Lim" => Ok(ShearModel::Lim {
            ka: read(map, "ka")?,
            a3: read(map, "a3")?,
            a4: read(map, "a4")?,
            mu: read(map, "mu")?,
            b1: read(map, "b1")?,
            b2: read(map, "b2")?,
        }),
        other => Err(SimError::invalid_config(format!(
            "unknown membrane shear model '{other}' (expected 'wlc' or 'Lim')"
        ))),
    }
}

/// Read a bending model block by its selector string (`"Kantor"` or
/// `"Juelicher"`).
///
/// # Errors
///
/// Unknown selector or missing keys.
pub fn read_bending(desc: &str, map: &HashMap<String, Real>) -> Result<BendingModel> {
    match desc {
        "Kantor" => Ok(BendingModel::Kantor {
            kb: read(map, "kb")?,
            theta: read(map, "theta")?,
        }),
        "Juelicher" => Ok(BendingModel::Juelicher {
            kb: read(map, "kb")?,
            c0: read(map, "C0")?,
            kad: read(map, "kad")?,
            da0: read(map, "DA0")?,
        }),
        other => Err(SimError::invalid_config(format!(
            "unknown membrane bending model '{other}' (expected 'Kantor' or 'Juelicher')"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn full_map() -> HashMap<String, Real> {
        [
            ("tot_area", 62.2242),
            ("tot_volume", 26.6649),
            ("ka_tot", 4900.0),
            ("kv_tot", 7500.0),
            ("gammaC", 52.0),
            ("gammaT", 0.0),
            ("kBT", 0.0),
            ("x0", 0.457),
            ("ks", 35.4),
            ("mpow", 2.0),
            ("ka", 5000.0),
            ("kb", 44.4),
            ("theta", 6.97),
        ]
        .iter()
        .map(|&(k, v)| (k.to_owned(), v as Real))
        .collect()
    }

    #[test]
    fn test_read_wlc_kantor() {
        let map = full_map();
        let common = read_common(&map).unwrap();
        assert!(!common.fluctuation_forces());
        assert!(matches!(
            read_shear("wlc", &map).unwrap(),
            ShearModel::Wlc { .. }
        ));
        assert!(matches!(
            read_bending("Kantor", &map).unwrap(),
            BendingModel::Kantor { .. }
        ));
    }

    #[test]
    fn test_missing_key_is_named() {
        let mut map = full_map();
        map.remove("kv_tot");
        let err = read_common(&map).unwrap_err();
        assert!(err.to_string().contains("kv_tot"));
    }

    #[test]
    fn test_unknown_models_rejected() {
        let map = full_map();
        assert!(read_shear("hookean", &map).is_err());
        assert!(read_bending("Helfrich", &map).is_err());
    }
}
