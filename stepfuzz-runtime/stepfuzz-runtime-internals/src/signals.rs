use crate::error::Error;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

/// Ignore `SIGPIPE` for the whole process, so a request writing to a closed pipe sees an I/O
/// error instead of killing the fuzzer. Returns the handler that was replaced.
pub fn ignore_broken_pipe() -> Result<SigHandler, Error> {
    let sa = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    let saved = unsafe { sigaction(Signal::SIGPIPE, &sa)? };
    Ok(saved.handler())
}
