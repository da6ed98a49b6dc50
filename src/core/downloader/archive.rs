use std::path::{Path, PathBuf};

use tracing::warn;

use crate::core::error::{UpdateError, UpdateResult};

/// Extract a full bundle package into `dest`, replacing any previous content.
///
/// Entries land in a staging sibling first; `dest` is only replaced once every
/// entry was written, so a broken package leaves the old bundle intact.
/// Blocking; run it on `spawn_blocking`.
pub fn extract_package(archive_path: &Path, dest: &Path) -> UpdateResult<usize> {
    let staging = staging_path(dest);
    remove_dir_if_exists(&staging)?;

    let written = match extract_into(archive_path, &staging) {
        Ok(written) => written,
        Err(e) => {
            if let Err(cleanup) = remove_dir_if_exists(&staging) {
                warn!("Failed to clean {:?}: {}", staging, cleanup);
            }
            return Err(e);
        }
    };

    remove_dir_if_exists(dest)?;
    std::fs::rename(&staging, dest).map_err(|source| UpdateError::Io {
        path: dest.to_path_buf(),
        source,
    })?;
    Ok(written)
}

fn extract_into(archive_path: &Path, dest: &Path) -> UpdateResult<usize> {
    let file = std::fs::File::open(archive_path).map_err(|source| UpdateError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file)?;

    std::fs::create_dir_all(dest).map_err(|source| UpdateError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let rel_path = entry
            .enclosed_name()
            .ok_or_else(|| UpdateError::Other(format!("Unsafe path in package: {}", entry.name())))?;

        let out_path = dest.join(rel_path);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|source| UpdateError::Io {
                path: out_path,
                source,
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| UpdateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut out = std::fs::File::create(&out_path).map_err(|source| UpdateError::Io {
            path: out_path.clone(),
            source,
        })?;
        std::io::copy(&mut entry, &mut out).map_err(|source| UpdateError::Io {
            path: out_path,
            source,
        })?;
        written += 1;
    }

    Ok(written)
}

fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".extracting");
    dest.with_file_name(name)
}

fn remove_dir_if_exists(path: &Path) -> UpdateResult<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UpdateError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
pub(crate) fn write_test_package(path: &Path, files: &[(&str, &str)]) {
    use std::io::Write;

    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, content) in files {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}
