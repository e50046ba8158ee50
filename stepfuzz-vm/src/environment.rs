use crate::error::Error;
use crate::hooks::Hooks;
use crate::natives::{self, NativeFunction};
use std::collections::HashMap;
use std::env;
use std::rc::Rc;
use tracing::debug;

/// Process-wide interpreter settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvConfig {
    /// Reclaim every object a request created when it ends, including ones kept alive only by
    /// reference cycles.
    pub tracked_alloc: bool,
    /// Largest string, in bytes, a request may build.
    pub memory_limit: usize,
    /// Deepest call stack a request may build.
    pub max_nesting: usize,
    /// Deepest chain of nested dispatch invocations (`eval`, `call`, destructors). Each one
    /// recurses on the host stack, so this is kept well below `max_nesting`.
    pub max_reentry: usize,
}

impl EnvConfig {
    pub const fn default() -> EnvConfig {
        EnvConfig {
            tracked_alloc: false,
            memory_limit: 2 * 1024 * 1024,
            max_nesting: 256,
            max_reentry: 64,
        }
    }

    pub const fn with_tracked_alloc(self, tracked_alloc: bool) -> Self {
        Self {
            tracked_alloc,
            ..self
        }
    }

    pub const fn with_memory_limit(self, memory_limit: usize) -> Self {
        Self {
            memory_limit,
            ..self
        }
    }

    pub const fn with_max_nesting(self, max_nesting: usize) -> Self {
        Self {
            max_nesting,
            ..self
        }
    }

    pub const fn with_max_reentry(self, max_reentry: usize) -> Self {
        Self {
            max_reentry,
            ..self
        }
    }

    /// Defaults, overridden by `STEPFUZZ_TRACKED_ALLOC`, `STEPFUZZ_MEMORY_LIMIT`,
    /// `STEPFUZZ_MAX_NESTING` and `STEPFUZZ_MAX_REENTRY` where set.
    pub fn from_env() -> Result<EnvConfig, Error> {
        let mut config = EnvConfig::default();
        if let Some(v) = var("STEPFUZZ_TRACKED_ALLOC") {
            config.tracked_alloc = match v.as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => return Err(invalid("STEPFUZZ_TRACKED_ALLOC", v)),
            };
        }
        if let Some(v) = var("STEPFUZZ_MEMORY_LIMIT") {
            config.memory_limit = v
                .parse()
                .map_err(|_| invalid("STEPFUZZ_MEMORY_LIMIT", v.clone()))?;
        }
        if let Some(v) = var("STEPFUZZ_MAX_NESTING") {
            config.max_nesting = v
                .parse()
                .map_err(|_| invalid("STEPFUZZ_MAX_NESTING", v.clone()))?;
        }
        if let Some(v) = var("STEPFUZZ_MAX_REENTRY") {
            config.max_reentry = v
                .parse()
                .map_err(|_| invalid("STEPFUZZ_MAX_REENTRY", v.clone()))?;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.memory_limit == 0 {
            return Err(Error::InvalidArgument("memory limit must be greater than 0"));
        }
        if self.max_nesting == 0 {
            return Err(Error::InvalidArgument("nesting limit must be greater than 0"));
        }
        if self.max_reentry == 0 {
            return Err(Error::InvalidArgument("re-entry limit must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for EnvConfig {
    fn default() -> EnvConfig {
        EnvConfig::default()
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn invalid(var: &'static str, value: String) -> Error {
    Error::InvalidEnvVar { var, value }
}

/// State shared by every request in the process: configuration, native functions and the
/// installed entry points.
pub struct Environment {
    config: EnvConfig,
    natives: HashMap<Rc<str>, Rc<NativeFunction>>,
    hooks: Hooks,
}

impl Environment {
    /// Bring up the environment with the built-in functions registered and the default entry
    /// points installed.
    pub fn startup(config: EnvConfig) -> Result<Environment, Error> {
        config.validate()?;
        let mut env = Environment {
            config,
            natives: HashMap::new(),
            hooks: Hooks::default(),
        };
        for f in natives::stdlib() {
            env.register_native(f)?;
        }
        debug!(natives = env.natives.len(), "interpreter environment started");
        Ok(env)
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    pub fn register_native(&mut self, f: NativeFunction) -> Result<(), Error> {
        let name: Rc<str> = f.name().into();
        if self.natives.contains_key(&name) {
            return Err(Error::DuplicateNative(name.to_string()));
        }
        self.natives.insert(name, Rc::new(f));
        Ok(())
    }

    pub fn native(&self, name: &str) -> Option<&Rc<NativeFunction>> {
        self.natives.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn validate_rejects_zero_limits() {
        assert!(EnvConfig::default().validate().is_ok());
        assert!(EnvConfig::default()
            .with_memory_limit(0)
            .validate()
            .is_err());
        assert!(EnvConfig::default().with_max_nesting(0).validate().is_err());
        assert!(EnvConfig::default().with_max_reentry(0).validate().is_err());
    }

    #[test]
    fn duplicate_natives_rejected() {
        let mut env = Environment::startup(EnvConfig::default()).unwrap();
        let dup = NativeFunction::new("strlen", 0, None, |_, _| Ok(Value::Null));
        assert!(matches!(
            env.register_native(dup),
            Err(Error::DuplicateNative(name)) if name == "strlen"
        ));
        assert!(env.native("str_repeat").is_some());
    }
}
