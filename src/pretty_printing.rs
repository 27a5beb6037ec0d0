//! Colored log output.

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use console::style;
use num_traits::Signed;

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Enable info-level log output for the rest of the process.
pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::Relaxed);
}

pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Different log-types that can be used to print out messages in different
/// colors.
pub enum LogType {
    Neutral,
    Success,
    Failure,
}

/// Small wrapper to print out colored log messages. Neutral and success
/// messages only appear in verbose mode; failures always print to stderr.
pub fn log(kind: LogType, msg: &str) {
    match kind {
        LogType::Neutral => {
            if verbose() {
                println!("{} {}", style("[-]").blue(), msg);
            }
        }
        LogType::Success => {
            if verbose() {
                println!("{} {}", style("[+]").green(), msg);
            }
        }
        LogType::Failure => {
            eprintln!("{} {}", style("[!]").red(), msg);
        }
    }
}

/// Small helper type that is used to print out hex values as eg. -0x20
/// instead of 0xffffffe0.
pub struct ReallySigned<T: PartialOrd + Signed + fmt::LowerHex>(pub T);

impl<T: PartialOrd + Signed + fmt::LowerHex> fmt::LowerHex for ReallySigned<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let prefix = if f.alternate() { "0x" } else { "" };
        let bare_hex = format!("{:x}", self.0.abs());
        f.pad_integral(self.0 >= T::zero(), prefix, &bare_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn really_signed_formats_negative_values() {
        assert_eq!(format!("{:x}", ReallySigned(-0x20i64)), "-20");
        assert_eq!(format!("{:#x}", ReallySigned(0x1fi64)), "0x1f");
    }
}
