//! Coordinator configuration.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Real, SimError};

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LogTarget {
    /// A log file `<prefix>_00000.log` next to the working directory.
    File(String),
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl LogTarget {
    /// Interpret a filename prefix the way the coordinator does: the special
    /// values `"stdout"` and `"stderr"` select the streams.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Self {
        match prefix {
            "stdout" => Self::Stdout,
            "stderr" => Self::Stderr,
            other => Self::File(other.to_owned()),
        }
    }
}

/// Configuration of the simulation coordinator.
///
/// # Example
///
/// ```
/// use meso_types::CoordinatorConfig;
/// use nalgebra::Vector3;
///
/// let config = CoordinatorConfig::new(Vector3::new(8.0, 8.0, 8.0), 0.001)
///     .with_checkpoint(1000, "restart/")
///     .with_debug_level(3);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoordinatorConfig {
    /// Number of simulation tasks per axis. The domain is split in equal
    /// chunks between the ranks.
    pub nranks: [usize; 3],
    /// Size of the global simulation domain. Periodic boundary conditions
    /// are applied at the domain boundaries.
    pub domain: Vector3<Real>,
    /// Timestep of the simulation.
    pub dt: Real,
    /// Prefix of the log output, or the literal `stdout` / `stderr`.
    pub log_filename: String,
    /// Verbosity from 1 (fatal errors only) to 8 (everything, flushed).
    pub debug_level: u8,
    /// Save the state of all simulation components every that many steps.
    /// Zero disables global checkpointing.
    pub checkpoint_every: i64,
    /// Folder where checkpoint files will reside.
    pub checkpoint_folder: String,
}

impl CoordinatorConfig {
    /// Configuration with a single rank, the given domain and timestep, and
    /// the defaults of the original coordinator for everything else.
    #[must_use]
    pub fn new(domain: Vector3<Real>, dt: Real) -> Self {
        Self {
            nranks: [1, 1, 1],
            domain,
            dt,
            log_filename: "log".to_owned(),
            debug_level: 3,
            checkpoint_every: 0,
            checkpoint_folder: "restart/".to_owned(),
        }
    }

    /// Set the checkpoint period and folder.
    #[must_use]
    pub fn with_checkpoint(mut self, every: i64, folder: impl Into<String>) -> Self {
        self.checkpoint_every = every;
        self.checkpoint_folder = folder.into();
        self
    }

    /// Set the debug level (1..=8).
    #[must_use]
    pub fn with_debug_level(mut self, level: u8) -> Self {
        self.debug_level = level;
        self
    }

    /// Set the log target prefix.
    #[must_use]
    pub fn with_log_filename(mut self, prefix: impl Into<String>) -> Self {
        self.log_filename = prefix.into();
        self
    }

    /// The log target implied by `log_filename`.
    #[must_use]
    pub fn log_target(&self) -> LogTarget {
        LogTarget::from_prefix(&self.log_filename)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] for non-positive domain or
    /// timestep, a debug level outside 1..=8, or a rank grid this build
    /// cannot serve (only the single-node exchange engine is available).
    pub fn validate(&self) -> crate::Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SimError::invalid_config(format!(
                "timestep must be positive and finite, got {}",
                self.dt
            )));
        }
        for k in 0..3 {
            if !(self.domain[k].is_finite() && self.domain[k] > 0.0) {
                return Err(SimError::invalid_config(format!(
                    "domain size must be positive and finite, got {:?}",
                    self.domain
                )));
            }
        }
        if self.nranks.iter().any(|&n| n == 0) {
            return Err(SimError::invalid_config("rank grid entries must be > 0"));
        }
        if self.nranks.iter().product::<usize>() != 1 {
            return Err(SimError::invalid_config(
                "multi-rank runs need an MPI exchange engine; this build only \
                 provides the single-node engine (nranks must be [1, 1, 1])",
            ));
        }
        if !(1..=8).contains(&self.debug_level) {
            return Err(SimError::invalid_config(format!(
                "debug level must be in 1..=8, got {}",
                self.debug_level
            )));
        }
        if self.checkpoint_every < 0 {
            return Err(SimError::invalid_config("checkpoint_every must be >= 0"));
        }
        Ok(())
    }
}
