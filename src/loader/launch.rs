//! Browser launch arguments.
//!
//! Computes the flag that makes a browser load the built extension
//! directories, merging with any load flag the host runner already set.

use tracing::debug;

use super::definition::ExtensionDefinition;

/// The load flag prefix, comma-joined list of unpacked extension dirs.
pub const LOAD_EXTENSION_FLAG: &str = "--load-extension=";

/// The browser a launch is targeting, as reported by the host runner's
/// lifecycle hook.
#[derive(Debug, Clone, Default)]
pub struct BrowserDescriptor {
    /// Browser name, e.g. "chrome".
    pub name: String,
}

impl BrowserDescriptor {
    /// Creates a descriptor for a browser name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Merges the load flag for every definition valid under the target browser
/// into the launch arguments.
///
/// Definitions whose `valid_browsers` is empty match every browser. When no
/// definition matches, the arguments are returned unchanged. An existing
/// load flag is extended with a comma rather than duplicated.
#[must_use]
pub fn compute_args(
    definitions: &[ExtensionDefinition],
    browser: &BrowserDescriptor,
    mut args: Vec<String>,
) -> Vec<String> {
    let dir_list: Vec<String> = definitions
        .iter()
        .filter(|def| def.loads_under(&browser.name))
        .map(|def| def.dest_dir.to_string_lossy().into_owned())
        .collect();

    if dir_list.is_empty() {
        return args;
    }

    let dir_list = dir_list.join(",");
    debug!("Loading extensions for {}: {}", browser.name, dir_list);

    if let Some(existing) = args
        .iter_mut()
        .find(|arg| arg.starts_with(LOAD_EXTENSION_FLAG))
    {
        existing.push(',');
        existing.push_str(&dir_list);
    } else {
        args.push(format!("{}{}", LOAD_EXTENSION_FLAG, dir_list));
    }

    args
}
