use crate::termination::{GuardSite, TerminationDetails};
use stepfuzz_vm::Bailout;
use tracing::trace;

/// Byte ceiling shared by the input, compiled sources and native string arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeCeiling {
    max_size: usize,
}

impl SizeCeiling {
    pub fn new(max_size: usize) -> Self {
        SizeCeiling { max_size }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn admits(&self, len: usize) -> bool {
        len <= self.max_size
    }

    pub fn check_size(&self, site: GuardSite, len: usize) -> Result<(), Bailout> {
        if self.admits(len) {
            return Ok(());
        }
        trace!(%site, len, max_size = self.max_size, "size ceiling exceeded");
        Err(TerminationDetails::SizeCeilingExceeded {
            site,
            len,
            max_size: self.max_size,
        }
        .into_bailout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary() {
        let ceiling = SizeCeiling::new(8);
        assert!(ceiling.check_size(GuardSite::NativeArgument, 8).is_ok());
        let bailout = ceiling
            .check_size(GuardSite::NativeArgument, 9)
            .unwrap_err();
        assert_eq!(
            TerminationDetails::of(&bailout),
            Some(&TerminationDetails::SizeCeilingExceeded {
                site: GuardSite::NativeArgument,
                len: 9,
                max_size: 8,
            })
        );
    }
}
