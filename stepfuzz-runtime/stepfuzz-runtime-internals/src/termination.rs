use std::fmt;
use stepfuzz_vm::Bailout;

/// Where a size check fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardSite {
    /// The fuzz input itself. Oversized inputs are skipped rather than aborted.
    Input,
    /// A string about to be compiled, from the main script or from `eval`.
    CompiledSource,
    /// A string argument of a native call.
    NativeArgument,
}

impl fmt::Display for GuardSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardSite::Input => write!(f, "input"),
            GuardSite::CompiledSource => write!(f, "compiled source"),
            GuardSite::NativeArgument => write!(f, "native argument"),
        }
    }
}

/// Why the harness aborted a request.
///
/// This is the payload of the harness's bailouts. The interpreter cannot catch it, so it reaches
/// the driver through every frame and is recovered there with
/// [`from_bailout`](#method.from_bailout).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminationDetails {
    StepBudgetExhausted {
        max_steps: u32,
    },
    SizeCeilingExceeded {
        site: GuardSite,
        len: usize,
        max_size: usize,
    },
}

impl TerminationDetails {
    pub fn into_bailout(self) -> Bailout {
        Bailout::provide(self)
    }

    /// Recover the details from a bailout raised by the harness, or give the bailout back.
    pub fn from_bailout(bailout: Bailout) -> Result<TerminationDetails, Bailout> {
        match bailout {
            Bailout::Provided {
                type_name,
                provided,
            } => match provided.downcast::<TerminationDetails>() {
                Ok(details) => Ok(*details),
                Err(provided) => Err(Bailout::Provided {
                    type_name,
                    provided,
                }),
            },
            other => Err(other),
        }
    }

    /// Borrow the details of a harness bailout without consuming it.
    pub fn of(bailout: &Bailout) -> Option<&TerminationDetails> {
        bailout
            .provided_details()
            .and_then(|d| d.downcast_ref::<TerminationDetails>())
    }
}

impl fmt::Display for TerminationDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationDetails::StepBudgetExhausted { max_steps } => {
                write!(f, "step budget of {} exhausted", max_steps)
            }
            TerminationDetails::SizeCeilingExceeded {
                site,
                len,
                max_size,
            } => write!(f, "{} of {} bytes exceeds ceiling of {}", site, len, max_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepfuzz_vm::FatalError;

    #[test]
    fn recovered_from_bailout() {
        let details = TerminationDetails::StepBudgetExhausted { max_steps: 3 };
        let bailout = details.clone().into_bailout();
        assert_eq!(TerminationDetails::of(&bailout), Some(&details));
        assert_eq!(TerminationDetails::from_bailout(bailout).unwrap(), details);
    }

    #[test]
    fn foreign_bailouts_given_back() {
        let foreign = TerminationDetails::from_bailout(Bailout::provide(7u8)).unwrap_err();
        assert_eq!(
            foreign.provided_details().and_then(|d| d.downcast_ref::<u8>()),
            Some(&7)
        );
        let fatal = Bailout::fatal(FatalError::NestingLimit(1));
        assert!(TerminationDetails::from_bailout(fatal).unwrap_err().is_fatal());
    }
}
