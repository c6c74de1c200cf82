//! Facts about the current process used to stamp log records
//!
//! Hostname and program name are resolved once and cached for the life of
//! the process.

use std::path::Path;
use std::sync::OnceLock;

/// Fallback when the program name cannot be determined
const UNKNOWN_PROGRAM: &str = "logcast";

static PROGRAM_NAME: OnceLock<String> = OnceLock::new();
static HOSTNAME: OnceLock<String> = OnceLock::new();

/// Name of the running program without directory or `.exe` suffix.
///
/// This is the default facility of a producer.
pub fn program_name() -> &'static str {
    PROGRAM_NAME.get_or_init(|| {
        std::env::args_os()
            .next()
            .and_then(|arg0| {
                Path::new(&arg0)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_PROGRAM.to_string())
    })
}

/// Full hostname of this machine
pub fn hostname() -> &'static str {
    HOSTNAME.get_or_init(|| gethostname::gethostname().to_string_lossy().into_owned())
}

/// Current process id
pub fn pid() -> u32 {
    std::process::id()
}
