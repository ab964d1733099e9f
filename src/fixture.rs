//! Buildpack fixture used to capture the staging environment.
//!
//! The buildpack's `compile` step dumps its environment between two
//! sentinels and then fails, so staging never needs to succeed for the
//! environment to reach the log stream.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::{Error, Result};
use crate::logs::WindowMarkers;

/// Script run by the platform while staging.
pub const COMPILE_SCRIPT: &str = "#!/usr/bin/env bash
sleep 5
echo START_ENV_CMD
env
echo END_ENV_CMD
exit 1
";

/// Detection always fails; the buildpack is selected explicitly.
pub const DETECT_SCRIPT: &str = "#!/bin/bash
exit 1
";

/// Never reached because compile fails first.
pub const RELEASE_SCRIPT: &str = "#!/usr/bin/env bash
exit 1
";

/// Archive entries in the order they are written.
pub const ENTRIES: [(&str, &str); 3] = [
    ("bin/compile", COMPILE_SCRIPT),
    ("bin/detect", DETECT_SCRIPT),
    ("bin/release", RELEASE_SCRIPT),
];

const ARCHIVE_NAME: &str = "buildpack.zip";

/// A buildpack archive on disk, removed when dropped.
#[derive(Debug)]
pub struct BuildpackFixture {
    /// Holds the temp directory alive for the archive's lifetime.
    _dir: TempDir,
    archive_path: PathBuf,
}

impl BuildpackFixture {
    /// Writes the buildpack archive into a fresh temp directory.
    pub fn create() -> Result<Self> {
        Self::create_in(std::env::temp_dir())
    }

    /// Writes the buildpack archive into a fresh directory under `base`.
    pub fn create_in(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref();
        let dir = tempfile::Builder::new()
            .prefix("default-env-var-test")
            .tempdir_in(base)
            .map_err(|e| {
                Error::Fixture(format!("failed to create temp dir in {}: {}", base.display(), e))
            })?;

        let archive_path = dir.path().join(ARCHIVE_NAME);
        write_archive(&archive_path)?;

        tracing::info!(path = ?archive_path, "created buildpack fixture");

        Ok(Self {
            _dir: dir,
            archive_path,
        })
    }

    /// Returns the path of the zip archive.
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Returns the sentinels the compile script prints around `env`.
    pub fn markers() -> WindowMarkers {
        WindowMarkers::default()
    }
}

fn write_archive(path: &Path) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| Error::Fixture(format!("failed to create {}: {}", path.display(), e)))?;
    let mut writer = ZipWriter::new(file);

    // Fixed timestamp keeps the archive bytes identical between builds.
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755)
        .last_modified_time(DateTime::default());

    for (name, body) in ENTRIES {
        writer.start_file(name, options)?;
        writer.write_all(body.as_bytes())?;
    }

    writer.finish()?;
    Ok(())
}
