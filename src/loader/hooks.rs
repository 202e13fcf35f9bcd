//! Hook script generation.
//!
//! The hook files are JS templates shipped with the crate; each build
//! substitutes the alias placeholder so multiple extensions loaded at once
//! get distinctly-addressed hook code.

use std::path::Path;

use tokio::fs;

use super::manifest::{BACKGROUND_HOOK_FILE, CONTENT_HOOK_FILE};
use super::{HOOK_FILES_DIR, LoaderError};

/// Background hook template.
pub const BACKGROUND_TEMPLATE: &str = include_str!("templates/background.js");

/// Content-script hook template.
pub const CONTENT_TEMPLATE: &str = include_str!("templates/contentscript.js");

/// Placeholder substituted with the extension alias.
pub const ALIAS_PLACEHOLDER: &str = "{{alias}}";

/// Renders a hook template for an alias.
#[must_use]
pub fn render(template: &str, alias: &str) -> String {
    template.replace(ALIAS_PLACEHOLDER, alias)
}

/// Writes both hook files into `<dest_dir>/webext-rig-hooks/`.
pub async fn write_hook_files(
    dest_dir: &Path,
    alias: &str,
    background_template: &str,
    content_template: &str,
) -> Result<(), LoaderError> {
    let hook_dir = dest_dir.join(HOOK_FILES_DIR);
    fs::create_dir_all(&hook_dir).await?;

    fs::write(
        hook_dir.join(BACKGROUND_HOOK_FILE),
        render(background_template, alias),
    )
    .await?;
    fs::write(
        hook_dir.join(CONTENT_HOOK_FILE),
        render(content_template, alias),
    )
    .await?;

    Ok(())
}
