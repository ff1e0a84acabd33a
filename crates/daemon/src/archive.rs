// SPDX-License-Identifier: MIT

//! Exported archive format v1 (spec.md §6, §9): a 16-byte skippable
//! zstd frame carrying a tiny magic/version payload, followed by a
//! zstd-compressed tar stream whose first entry is a synthesized
//! `config.json` describing the exported machine, followed by its
//! `rootfs/` tree.
//!
//! The 16-byte header is itself a valid zstd "skippable frame" (magic
//! range `0x184D2A50..=0x184D2A5F`, a 4-byte little-endian content
//! size, then the content) — any zstd-aware tool that honors skippable
//! frames can seek past it straight into the real compressed stream;
//! this crate additionally uses it to hard-reject archives from a
//! future format version rather than guessing at their layout (spec.md
//! §9: "implementers should treat unknown version bytes as a hard
//! error").

use conman_core::{Error, MachineRecord};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// The exact 16-byte marker frame spec.md §6 specifies: zstd skippable-
/// frame magic `0x184D2A5C`, content size `8`, and an 8-byte content
/// encoding format version `1`.
const MAGIC_FRAME: [u8; 16] = [
    0x5c, 0x2a, 0x4d, 0x18, 0x08, 0x00, 0x00, 0x00, 0x07, 0xb5, 0x1a, 0xcc, 0x01, 0x00, 0x00, 0x00,
];

const CONFIG_ENTRY_NAME: &str = "config.json";
const ROOTFS_ENTRY_PREFIX: &str = "rootfs";

/// The synthesized config-JSON header embedded as the tar stream's
/// first entry (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportHeader {
    pub version: u32,
    pub record: MachineRecord,
    pub exported_at_epoch_ms: u64,
    pub host_uid: u32,
    pub host_gid: u32,
    pub source_fs: String,
}

/// Write `rootfs_dir`'s tree, tagged with `header`, to `dest` in the v1
/// archive format. Runs the actual tar/zstd work on a blocking thread
/// since neither crate is async.
pub async fn export(dest: PathBuf, rootfs_dir: PathBuf, header: ExportHeader) -> Result<(), Error> {
    tokio::task::spawn_blocking(move || export_blocking(&dest, &rootfs_dir, &header))
        .await
        .map_err(|e| Error::ExternalProcess { program: "export".to_string(), stderr: e.to_string() })?
}

fn export_blocking(dest: &Path, rootfs_dir: &Path, header: &ExportHeader) -> Result<(), Error> {
    let file = std::fs::File::create(dest)
        .map_err(|e| Error::ExternalProcess { program: "export".to_string(), stderr: e.to_string() })?;
    write_archive(file, rootfs_dir, header).map_err(|e| {
        let _ = std::fs::remove_file(dest);
        e
    })
}

fn write_archive(mut file: std::fs::File, rootfs_dir: &Path, header: &ExportHeader) -> Result<(), Error> {
    file.write_all(&MAGIC_FRAME)
        .map_err(|e| Error::ExternalProcess { program: "export".to_string(), stderr: e.to_string() })?;

    let encoder = zstd::stream::write::Encoder::new(file, 0)
        .map_err(|e| Error::ExternalProcess { program: "zstd".to_string(), stderr: e.to_string() })?;
    let mut builder = tar::Builder::new(encoder);

    let json = serde_json::to_vec_pretty(header)
        .map_err(|e| Error::ExternalProcess { program: "export".to_string(), stderr: e.to_string() })?;
    let mut tar_header = tar::Header::new_gnu();
    tar_header.set_size(json.len() as u64);
    tar_header.set_mode(0o644);
    tar_header.set_cksum();
    builder
        .append_data(&mut tar_header, CONFIG_ENTRY_NAME, &json[..])
        .map_err(|e| Error::ExternalProcess { program: "tar".to_string(), stderr: e.to_string() })?;

    if rootfs_dir.exists() {
        builder
            .append_dir_all(ROOTFS_ENTRY_PREFIX, rootfs_dir)
            .map_err(|e| Error::ExternalProcess { program: "tar".to_string(), stderr: e.to_string() })?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::ExternalProcess { program: "tar".to_string(), stderr: e.to_string() })?;
    encoder
        .finish()
        .map_err(|e| Error::ExternalProcess { program: "zstd".to_string(), stderr: e.to_string() })?;
    Ok(())
}

/// Extract an archive written by [`export`] into `extract_root`,
/// returning the parsed header. The caller finds the extracted rootfs
/// tree at `extract_root.join("rootfs")`.
pub async fn import(src: PathBuf, extract_root: PathBuf) -> Result<ExportHeader, Error> {
    tokio::task::spawn_blocking(move || import_blocking(&src, &extract_root))
        .await
        .map_err(|e| Error::ExternalProcess { program: "import".to_string(), stderr: e.to_string() })?
}

fn import_blocking(src: &Path, extract_root: &Path) -> Result<ExportHeader, Error> {
    let mut file = std::fs::File::open(src)
        .map_err(|e| Error::ExternalProcess { program: "import".to_string(), stderr: e.to_string() })?;

    let mut marker = [0u8; 16];
    std::io::Read::read_exact(&mut file, &mut marker)
        .map_err(|e| Error::ExternalProcess { program: "import".to_string(), stderr: e.to_string() })?;
    if marker != MAGIC_FRAME {
        return Err(Error::Unsupported("archive version (unrecognized marker frame)"));
    }

    let decoder = zstd::stream::read::Decoder::new(file)
        .map_err(|e| Error::ExternalProcess { program: "zstd".to_string(), stderr: e.to_string() })?;
    let mut archive = tar::Archive::new(decoder);

    std::fs::create_dir_all(extract_root)
        .map_err(|e| Error::ExternalProcess { program: "import".to_string(), stderr: e.to_string() })?;

    let mut header: Option<ExportHeader> = None;
    for entry in archive
        .entries()
        .map_err(|e| Error::ExternalProcess { program: "tar".to_string(), stderr: e.to_string() })?
    {
        let mut entry =
            entry.map_err(|e| Error::ExternalProcess { program: "tar".to_string(), stderr: e.to_string() })?;
        let path = entry
            .path()
            .map_err(|e| Error::ExternalProcess { program: "tar".to_string(), stderr: e.to_string() })?
            .to_path_buf();

        if path.as_os_str() == CONFIG_ENTRY_NAME {
            let mut bytes = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut bytes)
                .map_err(|e| Error::ExternalProcess { program: "import".to_string(), stderr: e.to_string() })?;
            header = Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| Error::ExternalProcess { program: "import".to_string(), stderr: e.to_string() })?,
            );
        } else {
            entry
                .unpack_in(extract_root)
                .map_err(|e| Error::ExternalProcess { program: "tar".to_string(), stderr: e.to_string() })?;
        }
    }

    header.ok_or(Error::Unsupported("archive missing config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conman_core::ImageSpec;

    fn header() -> ExportHeader {
        ExportHeader {
            version: 1,
            record: MachineRecord::test_new("ubuntu", ImageSpec::new("ubuntu")),
            exported_at_epoch_ms: 1_700_000_000_000,
            host_uid: 501,
            host_gid: 20,
            source_fs: "apfs".to_string(),
        }
    }

    #[tokio::test]
    async fn export_then_import_round_trips_header_and_rootfs() {
        let dir = tempfile::tempdir().unwrap();
        let rootfs = dir.path().join("rootfs");
        tokio::fs::create_dir_all(rootfs.join("etc")).await.unwrap();
        tokio::fs::write(rootfs.join("etc/hostname"), b"ubuntu\n").await.unwrap();

        let archive_path = dir.path().join("machine.conarchive");
        export(archive_path.clone(), rootfs, header()).await.unwrap();

        let extract_root = dir.path().join("extracted");
        let imported = import(archive_path, extract_root.clone()).await.unwrap();
        assert_eq!(imported.record.name, "ubuntu");
        assert_eq!(imported.host_uid, 501);

        let hostname = tokio::fs::read_to_string(extract_root.join("rootfs/etc/hostname")).await.unwrap();
        assert_eq!(hostname, "ubuntu\n");
    }

    #[tokio::test]
    async fn import_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.conarchive");
        tokio::fs::write(&path, [0u8; 16]).await.unwrap();
        let err = import(path, dir.path().join("extracted")).await.unwrap_err();
        assert_eq!(err.kind(), conman_core::ErrorKind::Unsupported);
    }
}
