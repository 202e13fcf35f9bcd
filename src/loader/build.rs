//! Build orchestrator.
//!
//! Materializes one extension definition into its working directory:
//! validate the source, clear and recreate the destination, copy or unpack,
//! patch the manifest, and write the hook files. Rebuilds are from-scratch
//! copies into the same directory, so no stale files survive an update.

use std::io::{self, Cursor};
use std::path::Path;

use tokio::fs;
use tracing::{debug, info};

use super::definition::ExtensionDefinition;
use super::manifest::{self, Manifest, PatchOptions};
use super::{LoaderError, hooks};

/// CRX container magic.
const CRX_MAGIC: &[u8; 4] = b"Cr24";

/// Builds one extension into its working directory.
pub async fn build_extension(def: &ExtensionDefinition) -> Result<(), LoaderError> {
    if !def.source.exists() {
        return Err(LoaderError::SourceNotFound(def.source.clone()));
    }

    info!(
        "Preparing extension {} from {} to {}",
        def.alias,
        def.source.display(),
        def.dest_dir.display()
    );

    // Full replace: rebuilds are idempotent from-scratch copies
    if def.dest_dir.exists() {
        fs::remove_dir_all(&def.dest_dir).await?;
    }
    fs::create_dir_all(&def.dest_dir).await?;

    if def.source.is_dir() {
        copy_dir(&def.source, &def.dest_dir).await?;
    } else {
        let bytes = fs::read(&def.source).await?;
        unpack_archive(&bytes, &def.dest_dir)?;
    }

    let original = Manifest::load(&def.dest_dir).await?;
    let patched = manifest::patch(
        &original,
        &PatchOptions {
            alias: def.alias.clone(),
            skip_hooks: def.skip_hooks,
            runner_matches: def.runner_matches.clone(),
        },
    );

    if !def.skip_hooks {
        hooks::write_hook_files(
            &def.dest_dir,
            &def.alias,
            &def.background_hook_template,
            &def.content_hook_template,
        )
        .await?;
    }

    patched.write(&def.dest_dir).await?;

    debug!("Extension {} ready at {}", def.alias, def.dest_dir.display());
    Ok(())
}

/// Recursively copies a directory tree.
async fn copy_dir(src: &Path, dst: &Path) -> Result<(), LoaderError> {
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = stack.pop() {
        fs::create_dir_all(&to).await?;

        let mut entries = fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let from_path = entry.path();
            let to_path = to.join(entry.file_name());

            if entry.file_type().await?.is_dir() {
                stack.push((from_path, to_path));
            } else {
                fs::copy(&from_path, &to_path).await?;
            }
        }
    }

    Ok(())
}

/// Unpacks a packed extension (plain zip, or a zip behind a CRX2/CRX3
/// header) into the destination directory.
fn unpack_archive(bytes: &[u8], dest: &Path) -> Result<(), LoaderError> {
    let payload = strip_crx_header(bytes)?;

    let mut archive = zip::ZipArchive::new(Cursor::new(payload))
        .map_err(|e| LoaderError::Archive(format!("Failed to open archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| LoaderError::Archive(format!("Failed to read archive entry: {}", e)))?;

        // Skip entries that would escape the destination
        let Some(relative) = file.enclosed_name() else {
            continue;
        };
        let outpath = dest.join(relative);

        if file.is_dir() {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = std::fs::File::create(&outpath)?;
            io::copy(&mut file, &mut outfile)?;
        }
    }

    Ok(())
}

/// Returns the zip payload of a packed extension, skipping a CRX header when
/// present.
fn strip_crx_header(bytes: &[u8]) -> Result<&[u8], LoaderError> {
    if bytes.len() < 4 || &bytes[..4] != CRX_MAGIC {
        return Ok(bytes);
    }
    if bytes.len() < 16 {
        return Err(LoaderError::Archive("Truncated CRX header".to_string()));
    }

    let version = read_u32(bytes, 4);
    let offset = match version {
        2 => {
            let pubkey_len = read_u32(bytes, 8) as usize;
            let sig_len = read_u32(bytes, 12) as usize;
            16 + pubkey_len + sig_len
        }
        3 => {
            let header_len = read_u32(bytes, 8) as usize;
            12 + header_len
        }
        v => {
            return Err(LoaderError::Archive(format!(
                "Unsupported CRX version: {}",
                v
            )));
        }
    };

    bytes
        .get(offset..)
        .ok_or_else(|| LoaderError::Archive("Truncated CRX payload".to_string()))
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}
