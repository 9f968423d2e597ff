// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use snafu::{OptionExt, ResultExt, Whatever};

/// A directory holding the HDL sources and Verilator artifacts of one run.
///
/// Every path it hands out is absolute, so nothing depends on the process's
/// current directory.
#[derive(Debug, Clone)]
pub struct BuildDirectory {
    root: Utf8PathBuf,
}

impl BuildDirectory {
    /// Creates `path` and its parents if needed.
    pub fn prepare(path: impl AsRef<Utf8Path>) -> Result<Self, Whatever> {
        let path = path.as_ref();
        fs::create_dir_all(path).whatever_context(format!(
            "Failed to create build directory {path}"
        ))?;
        let root = path.canonicalize_utf8().whatever_context(format!(
            "Failed to resolve build directory {path}"
        ))?;
        log::debug!("Using build directory {}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Where the Verilator runtime keeps its per-model artifacts.
    pub fn artifacts(&self) -> Utf8PathBuf {
        self.root.join("artifacts")
    }

    /// Writes `contents` to `file_name` in the directory, overwriting it only
    /// when it differs so the Verilated library is not needlessly rebuilt.
    pub fn emit_source(
        &self,
        file_name: &str,
        contents: &str,
    ) -> Result<Utf8PathBuf, Whatever> {
        let path = self.root.join(file_name);
        if fs::read_to_string(&path).ok().as_deref() != Some(contents) {
            fs::write(&path, contents)
                .whatever_context(format!("Failed to write {path}"))?;
            log::info!("Wrote {}", path);
        }
        Ok(path)
    }

    /// Copies the file at `source` into the directory under the same name.
    pub fn copy_source(
        &self,
        source: impl AsRef<Utf8Path>,
    ) -> Result<Utf8PathBuf, Whatever> {
        let source = source.as_ref();
        let file_name = source
            .file_name()
            .whatever_context(format!("{source} does not name a file"))?;
        let contents = fs::read_to_string(source)
            .whatever_context(format!("Failed to read {source}"))?;
        self.emit_source(file_name, &contents)
    }
}
