// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! This crate implements the Verilator runtime for instantiating hardware
//! modules whose interface is only known at runtime.
//!
//! A [`VerilatorRuntime`] is handed a list of (System)Verilog sources. Asking
//! it for a model with [`VerilatorRuntime::create_dyn_model`] invokes
//! `verilator` to build a shared library (or reuses one from a previous run),
//! loads it, and returns a [`DynamicVerilatedModel`] whose ports are read and
//! written by name.

use std::{
    collections::{HashMap, hash_map::Entry},
    ffi::OsString,
    fmt, fs,
    io::Write,
    os::fd::FromRawFd,
    sync::{LazyLock, Mutex},
    time::Instant,
};

use build_library::build_library;
use camino::{Utf8Path, Utf8PathBuf};
use dashmap::DashMap;
use libloading::Library;
use owo_colors::OwoColorize;
use snafu::{ResultExt, Whatever, whatever};

mod build_library;
pub mod dynamic;
pub mod vcd;

pub use dynamic::{
    AsDynamicVerilatedModel, DynamicVerilatedModel, DynamicVerilatedModelError,
    VerilatorValue,
};

/// Verilator-defined types for C FFI.
pub mod types {
    /// From the Verilator documentation: "Data representing 'bit' of 1-8 packed
    /// bits."
    pub type CData = u8;

    /// From the Verilator documentation: "Data representing 'bit' of 9-16
    /// packed bits"
    pub type SData = u16;

    /// From the Verilator documentation: "Data representing 'bit' of 17-32
    /// packed bits."
    pub type IData = u32;

    /// From the Verilator documentation: "Data representing 'bit' of 33-64
    /// packed bits."
    pub type QData = u64;
}

/// <https://www.digikey.com/en/maker/blogs/2024/verilog-ports-part-7-of-our-verilog-journey>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
    Inout,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => "input",
            PortDirection::Output => "output",
            PortDirection::Inout => "inout",
        }
        .fmt(f)
    }
}

/// One port on the interface of a Verilog module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Port {
    pub name: String,
    pub msb: usize,
    pub lsb: usize,
    pub direction: PortDirection,
}

impl Port {
    pub fn new(
        name: impl Into<String>,
        msb: usize,
        lsb: usize,
        direction: PortDirection,
    ) -> Self {
        Self {
            name: name.into(),
            msb,
            lsb,
            direction,
        }
    }

    /// The number of bits in the port. Only meaningful when `msb >= lsb`.
    pub fn width(&self) -> usize {
        self.msb + 1 - self.lsb
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}:{}] {}",
            self.direction, self.msb, self.lsb, self.name
        )
    }
}

/// Optional configuration for creating a [`VerilatorRuntime`]. Usually, you can
/// just use [`VerilatorRuntimeOptions::default()`].
#[derive(Debug, Clone)]
pub struct VerilatorRuntimeOptions {
    /// The name of the `verilator` executable, interpreted in some way by the
    /// OS/shell.
    pub verilator_executable: OsString,

    /// If `None`, there will be no optimization. If a value from `0` to `3`
    /// inclusive, the flag `-O<level>` will be passed. Enabling will slow
    /// compilation times.
    pub verilator_optimization: Option<usize>,

    /// Whether Verilator should always be invoked instead of only when the
    /// source files change.
    pub force_verilator_rebuild: bool,

    /// A list of warnings to disable.
    pub ignored_warnings: Vec<String>,

    /// Whether to use the log crate.
    pub log: bool,
}

impl Default for VerilatorRuntimeOptions {
    fn default() -> Self {
        Self {
            verilator_executable: "verilator".into(),
            verilator_optimization: None,
            force_verilator_rebuild: false,
            ignored_warnings: vec![],
            log: false,
        }
    }
}

impl VerilatorRuntimeOptions {
    /// The same as the [`Default`] implementation except that the log crate is
    /// used.
    pub fn default_logging() -> Self {
        Self {
            log: true,
            ..Default::default()
        }
    }
}

/// Per-model build configuration.
#[derive(Debug, Clone, Default)]
pub struct VerilatedModelConfig {
    /// Build the model with `--trace` so that
    /// [`DynamicVerilatedModel::open_vcd`] can be used. Traced and untraced
    /// builds of the same module live in separate artifact directories.
    pub enable_tracing: bool,
}

/// Identifies one built library: (top module, source path, tracing).
type LibraryKey = (String, Utf8PathBuf, bool);

/// Runtime for (System)Verilog code.
pub struct VerilatorRuntime {
    artifact_directory: Utf8PathBuf,
    source_files: Vec<Utf8PathBuf>,
    include_directories: Vec<Utf8PathBuf>,
    options: VerilatorRuntimeOptions,
    libraries: HashMap<LibraryKey, Library>,
}

/* <Forgive me father for I have sinned> */

// TODO: make cross-platform
static STDERR: LazyLock<Mutex<fs::File>> =
    LazyLock::new(|| Mutex::new(unsafe { fs::File::from_raw_fd(2) }));

macro_rules! eprintln_nocapture {
    ($($contents:tt)*) => {{
        use snafu::ResultExt;

        writeln!(
            &mut STDERR.lock().expect("poisoned"),
            $($contents)*
        )
        .whatever_context("Failed to write to non-captured stderr")
    }};
}

#[derive(Default)]
struct ThreadLocalFileLock;

/// The file_guard handles locking across processes, but does not guarantee
/// locking between threads in one process.
static THREAD_LOCK: LazyLock<DashMap<Utf8PathBuf, Mutex<ThreadLocalFileLock>>> =
    LazyLock::new(DashMap::default);

/* </Forgive me father for I have sinned> */

impl VerilatorRuntime {
    /// Creates a new runtime for instantiating (System)Verilog modules as Rust
    /// objects.
    pub fn new(
        artifact_directory: &Utf8Path,
        source_files: &[&Utf8Path],
        include_directories: &[&Utf8Path],
        options: VerilatorRuntimeOptions,
    ) -> Result<Self, Whatever> {
        if options.log {
            log::info!("Validating source files");
        }
        for source_file in source_files {
            if !source_file.is_file() {
                whatever!(
                    "Source file {} does not exist or is not a file. Note that if it's a relative path, you must be in the correct directory",
                    source_file
                );
            }
        }

        Ok(Self {
            artifact_directory: artifact_directory.to_owned(),
            source_files: source_files
                .iter()
                .map(|path| path.to_path_buf())
                .collect(),
            include_directories: include_directories
                .iter()
                .map(|path| path.to_path_buf())
                .collect(),
            options,
            libraries: HashMap::new(),
        })
    }

    /// The directory under which every model gets its own build directory.
    pub fn artifact_directory(&self) -> &Utf8Path {
        &self.artifact_directory
    }

    /// Constructs a new dynamic model. Uses lazy and incremental building for
    /// efficiency. You must guarantee the correctness of the suppplied
    /// information, namely, that `name` is precisely the name of the
    /// Verilog module, `source_path` is one of the source files given to the
    /// runtime, and `ports` is a correct subset of the ports of the Verilog
    /// module.
    pub fn create_dyn_model<'ctx>(
        &'ctx mut self,
        name: &str,
        source_path: &Utf8Path,
        ports: &[Port],
        config: &VerilatedModelConfig,
    ) -> Result<DynamicVerilatedModel<'ctx>, Whatever> {
        let log = self.options.log;
        let library = self
            .build_or_retrieve_library(name, source_path, ports, config)
            .whatever_context(
                "Failed to build or retrieve verilator dynamic library",
            )?;

        let new_main: extern "C" fn() -> *mut libc::c_void =
            *unsafe { library.get(format!("ffi_new_V{name}").as_bytes()) }
                .whatever_context(format!(
                    "Failed to load constructor for module {}",
                    name
                ))?;
        let delete_main: extern "C" fn(*mut libc::c_void) =
            *unsafe { library.get(format!("ffi_delete_V{name}").as_bytes()) }
                .whatever_context(format!(
                    "Failed to load destructor for module {}",
                    name
                ))?;
        let eval_main: extern "C" fn(*mut libc::c_void) =
            *unsafe { library.get(format!("ffi_V{name}_eval").as_bytes()) }
                .whatever_context(format!(
                    "Failed to load evalulator for module {}",
                    name
                ))?;

        let main = new_main();
        if main.is_null() {
            whatever!("Constructor for module {} returned null", name);
        }
        if log {
            log::info!("Instantiated model {}", name);
        }

        let ports = ports
            .iter()
            .map(|port| (port.name.clone(), (port.width(), port.direction)))
            .collect();

        Ok(DynamicVerilatedModel {
            ports,
            name: name.to_string(),
            main,
            delete_main,
            eval_main,
            tracing: config.enable_tracing,
            library,
        })
    }

    /// Invokes verilator to build a dynamic library for the Verilog module
    /// named `name` defined in the file `source_path` and with signature
    /// `ports`.
    ///
    /// If the library is already cached for the given module name/source
    /// path/tracing triple, then it is returned immediately.
    ///
    /// It is required that the `ports` signature matches a subset of the ports
    /// defined on the Verilog module exactly.
    ///
    /// If `self.options.force_verilator_rebuild`, then the library will always
    /// be rebuilt. Otherwise, it is only rebuilt when a source file is newer
    /// than the previous build.
    ///
    /// See [`build_library::build_library`] for more information.
    ///
    /// # Safety
    ///
    /// This function is thread-safe.
    fn build_or_retrieve_library(
        &mut self,
        name: &str,
        source_path: &Utf8Path,
        ports: &[Port],
        config: &VerilatedModelConfig,
    ) -> Result<&Library, Whatever> {
        if name.chars().any(|c| c == '\\' || c == ' ') {
            whatever!("Escaped module names are not supported");
        }

        if self.options.log {
            log::info!("Validating model source file");
        }
        if !self.source_files.iter().any(|source_file| {
            match (source_file.canonicalize_utf8(), source_path.canonicalize_utf8())
            {
                (Ok(lhs), Ok(rhs)) => lhs == rhs,
                _ => false,
            }
        }) {
            whatever!(
                "Module `{}` requires source file {}, which was not provided to the runtime",
                name,
                source_path
            );
        }

        if let Some(port) = ports.iter().find(|port| port.msb < port.lsb) {
            whatever!(
                "Port {} on module {} was specified with the high bit less than the low bit",
                port.name,
                name
            );
        }
        if let Some(port) = ports.iter().find(|port| port.width() > 64) {
            whatever!(
                "Port {} on module {} is greater than 64 bits",
                port.name,
                name
            );
        }

        let key = (
            name.to_string(),
            source_path.to_path_buf(),
            config.enable_tracing,
        );
        if let Entry::Vacant(entry) = self.libraries.entry(key.clone()) {
            let local_directory_name = format!(
                "{name}_{}{}",
                source_path.as_str().replace("_", "__").replace("/", "_"),
                if config.enable_tracing { "_traced" } else { "" }
            );
            let local_artifacts_directory =
                self.artifact_directory.join(&local_directory_name);

            if self.options.log {
                log::info!(
                    "Creating artifacts directory {}",
                    local_artifacts_directory
                );
            }
            fs::create_dir_all(&local_artifacts_directory).whatever_context(
                format!(
                    "Failed to create artifacts directory {}",
                    local_artifacts_directory,
                ),
            )?;

            eprintln_nocapture!(
                "{} waiting for file lock on build directory",
                "    Blocking".bold().cyan(),
            )?;

            // # Safety
            // build_library is not thread-safe, so we have to lock the
            // directory
            if self.options.log {
                log::info!("Acquiring file lock on artifact directory");
            }
            let file_lock = fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(self.artifact_directory.join(format!("{local_directory_name}.lock")))
                .whatever_context(
                    "Failed to open file lock file for artifacts directory (this is not the actual lock itself, it is an I/O error)",
                )?;

            let _file_lock =
                file_guard::lock(&file_lock, file_guard::Lock::Exclusive, 0, 1)
                    .whatever_context(
                        "Failed to acquire file lock for artifacts directory",
                    )?;

            let thread_mutex = THREAD_LOCK
                .entry(local_artifacts_directory.clone())
                .or_default();
            let Ok(_thread_lock) = thread_mutex.lock() else {
                whatever!(
                    "Failed to acquire thread-local lock for artifacts directory"
                );
            };

            eprintln_nocapture!(
                "{} {} ({})",
                "   Compiling".bold().green(),
                name,
                source_path
            )?;
            let start = Instant::now();

            if self.options.log {
                log::info!("Building the dynamic library with verilator");
            }
            let library_path = build_library(
                &self.source_files,
                &self.include_directories,
                name,
                ports,
                &local_artifacts_directory,
                &self.options,
                config.enable_tracing,
            )
            .whatever_context("Failed to build verilator dynamic library")?;

            if self.options.log {
                log::info!("Opening the dynamic library");
            }
            let library = unsafe { Library::new(library_path.as_std_path()) }
                .whatever_context("Failed to load verilator dynamic library")?;

            entry.insert(library);

            let duration = start.elapsed();
            eprintln_nocapture!(
                "{} `verilator-{}` profile target(s) in {}.{:02}s",
                "    Finished".bold().green(),
                self.options
                    .verilator_optimization
                    .map(|level| format!("O{level}"))
                    .unwrap_or("unoptimized".into()),
                duration.as_secs(),
                duration.subsec_millis() / 10
            )?;
        }

        Ok(self.libraries.get(&key).expect(
            "If it didn't exist, we just inserted it into the hash map",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_width_counts_both_ends() {
        let port = Port::new("sum", 31, 0, PortDirection::Output);
        assert_eq!(port.width(), 32);
        assert_eq!(Port::new("clk", 0, 0, PortDirection::Input).width(), 1);
    }

    #[test]
    fn port_displays_like_a_declaration() {
        let port = Port::new("in_a", 31, 0, PortDirection::Input);
        assert_eq!(port.to_string(), "input [31:0] in_a");
    }

    #[test]
    fn runtime_rejects_missing_source() {
        let result = VerilatorRuntime::new(
            "artifacts".into(),
            &["definitely/not/here.sv".as_ref()],
            &[],
            VerilatorRuntimeOptions::default(),
        );
        assert!(result.is_err());
    }
}
