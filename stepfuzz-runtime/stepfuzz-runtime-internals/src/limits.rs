use crate::error::Error;
use std::env;

/// The fixed budgets every input runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Opcode dispatches plus native calls one request may perform.
    pub max_steps: u32,
    /// Largest input, compiled source string or native string argument, in bytes.
    pub max_size: usize,
}

pub const DEFAULT_MAX_STEPS: u32 = 1000;
pub const DEFAULT_MAX_SIZE: usize = 8 * 1024;

impl Limits {
    pub const fn default() -> Limits {
        Limits {
            max_steps: DEFAULT_MAX_STEPS,
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    pub const fn with_max_steps(self, max_steps: u32) -> Self {
        Self { max_steps, ..self }
    }

    pub const fn with_max_size(self, max_size: usize) -> Self {
        Self { max_size, ..self }
    }

    /// Defaults, overridden by `STEPFUZZ_MAX_STEPS` and `STEPFUZZ_MAX_SIZE` where set.
    pub fn from_env() -> Result<Limits, Error> {
        let mut limits = Limits::default();
        if let Some(v) = env::var("STEPFUZZ_MAX_STEPS").ok().filter(|v| !v.is_empty()) {
            limits.max_steps = v.parse().map_err(|_| Error::InvalidEnvVar {
                var: "STEPFUZZ_MAX_STEPS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = env::var("STEPFUZZ_MAX_SIZE").ok().filter(|v| !v.is_empty()) {
            limits.max_size = v.parse().map_err(|_| Error::InvalidEnvVar {
                var: "STEPFUZZ_MAX_SIZE",
                value: v.clone(),
            })?;
        }
        Ok(limits)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_steps == 0 {
            return Err(Error::InvalidArgument("step budget must be greater than 0"));
        }
        if self.max_size == 0 {
            return Err(Error::InvalidArgument("size ceiling must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Limits {
        Limits::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let limits = Limits::default();
        assert_eq!(limits.max_steps, 1000);
        assert_eq!(limits.max_size, 8192);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn zero_limits_are_invalid() {
        assert!(matches!(
            Limits::default().with_max_steps(0).validate(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(Limits::default().with_max_size(0).validate().is_err());
    }
}
