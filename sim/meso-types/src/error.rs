//! Error types for simulation operations.

use thiserror::Error;

/// Errors that can occur while configuring or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// A handler (interaction, integrator, wall, ...) was registered twice
    /// under the same name.
    #[error("more than one {kind} is called '{name}'")]
    DuplicateName {
        /// Handler kind, e.g. "particle vector" or "integrator".
        kind: &'static str,
        /// The clashing name.
        name: String,
    },

    /// A name lookup failed.
    #[error("no such {kind}: '{name}'")]
    NotFound {
        /// Handler kind that was looked up.
        kind: &'static str,
        /// The missing name.
        name: String,
    },

    /// A particle vector name is reserved or malformed.
    #[error("invalid name for a particle vector (reserved word or empty): '{0}'")]
    InvalidPvName(String),

    /// A checkpoint file required for restart is absent.
    #[error("missing checkpoint file: {path}")]
    MissingCheckpoint {
        /// Path of the file that was expected.
        path: String,
    },

    /// Belonging-checker splitting was asked to do something contradictory.
    #[error("invalid belonging split of '{source_pv}' into '{inside}' / '{outside}': {reason}")]
    InvalidSplit {
        /// Source particle vector.
        source_pv: String,
        /// Requested inside destination.
        inside: String,
        /// Requested outside destination.
        outside: String,
        /// What is wrong with the request.
        reason: &'static str,
    },

    /// Simulation diverged (`NaN` or non-finite values detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },

    /// Underlying I/O failure (checkpoints, dumps, mesh files).
    #[error("i/o error on '{path}': {source}")]
    Io {
        /// Path involved in the failed operation.
        path: String,
        /// The originating error.
        #[source]
        source: std::io::Error,
    },

    /// A file had an unexpected format (mesh file, checkpoint payload).
    #[error("malformed file '{path}': {reason}")]
    MalformedFile {
        /// Path of the offending file.
        path: String,
        /// What could not be parsed.
        reason: String,
    },

    /// The task dependency graph could not be scheduled.
    #[error("task graph cannot be compiled: {reason}")]
    TaskGraph {
        /// Usually a cycle description.
        reason: String,
    },
}

impl SimError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a duplicate-name error.
    #[must_use]
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error with the path it happened on.
    #[must_use]
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a malformed-file error.
    #[must_use]
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::duplicate("integrator", "vv");
        assert!(err.to_string().contains("integrator"));
        assert!(err.to_string().contains("vv"));

        let err = SimError::not_found("particle vector", "solvent");
        assert!(err.to_string().contains("solvent"));

        let err = SimError::MissingCheckpoint {
            path: "restart/pv.chk".into(),
        };
        assert!(err.to_string().contains("restart/pv.chk"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(SimError::invalid_config("bad").is_config_error());
        assert!(SimError::diverged("NaN in velocity").is_diverged());
        assert!(!SimError::diverged("NaN").is_config_error());
    }
}
