// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

// hardcoded knowledge:
// - output library is obj_dir/libV${top_module}_dyn.so
// - verilated.h, verilated_vcd_c.h are on verilator's include path
// - a traced model needs Verilated::traceEverOn before its first eval

use std::{fmt::Write, fs, process::Command, time::SystemTime};

use camino::{Utf8Path, Utf8PathBuf};
use snafu::{OptionExt, ResultExt, Whatever, whatever};

use crate::{Port, PortDirection, VerilatorRuntimeOptions};

/// The Verilator C type holding a port of `width` bits.
fn c_type_for_width(width: usize) -> Option<&'static str> {
    if width == 0 {
        None
    } else if width <= 8 {
        Some("CData")
    } else if width <= 16 {
        Some("SData")
    } else if width <= 32 {
        Some("IData")
    } else if width <= 64 {
        Some("QData")
    } else {
        None
    }
}

fn build_ffi(
    artifact_directory: &Utf8Path,
    top: &str,
    ports: &[Port],
    enable_tracing: bool,
) -> Result<Utf8PathBuf, Whatever> {
    let ffi_wrappers = artifact_directory.join("ffi.cpp");

    let (trace_include, trace_ever_on) = if enable_tracing {
        (
            "#include \"verilated_vcd_c.h\"",
            "Verilated::traceEverOn(true);",
        )
    } else {
        ("", "")
    };

    let mut buffer = String::new();
    writeln!(
        &mut buffer,
        r#"
#include <cstdint>
#include "verilated.h"
{trace_include}
#include "V{top}.h"

extern "C" {{
    void* ffi_new_V{top}() {{
        {trace_ever_on}
        return new V{top}{{}};
    }}

    void ffi_V{top}_eval(V{top}* top) {{
        top->eval();
    }}

    void ffi_delete_V{top}(V{top}* top) {{
        top->final();
        delete top;
    }}
"#
    )
    .whatever_context("Failed to format utility FFI")?;

    if enable_tracing {
        writeln!(
            &mut buffer,
            r#"
    void* ffi_V{top}_open_trace(V{top}* top, const char* path) {{
        VerilatedVcdC* vcd = new VerilatedVcdC;
        top->trace(vcd, 99);
        vcd->open(path);
        return vcd;
    }}

    void ffi_VerilatedVcdC_dump(VerilatedVcdC* vcd, uint64_t timestamp) {{
        vcd->dump(timestamp);
    }}

    void ffi_VerilatedVcdC_open_next(VerilatedVcdC* vcd, bool increment_filename) {{
        vcd->openNext(increment_filename);
    }}

    void ffi_VerilatedVcdC_flush(VerilatedVcdC* vcd) {{
        vcd->flush();
    }}

    void ffi_VerilatedVcdC_close_and_delete(VerilatedVcdC* vcd) {{
        vcd->close();
        delete vcd;
    }}
"#
        )
        .whatever_context("Failed to format tracing FFI")?;
    }

    for port in ports {
        let Port {
            name: port_name,
            direction,
            ..
        } = port;
        let c_type = c_type_for_width(port.width()).with_whatever_context(|| {
            format!(
                "Port `{}` on top module `{}` is {} bits wide, but only 1 to 64 bits are supported",
                port_name,
                top,
                port.width()
            )
        })?;

        if matches!(direction, PortDirection::Input | PortDirection::Inout) {
            writeln!(
                &mut buffer,
                r#"
    void ffi_V{top}_pin_{port_name}(V{top}* top, {c_type} new_value) {{
        top->{port_name} = new_value;
    }}
            "#
            )
            .whatever_context("Failed to format input port FFI")?;
        }

        // every port is readable so that drivers can observe their own inputs
        writeln!(
            &mut buffer,
            r#"
    {c_type} ffi_V{top}_read_{port_name}(V{top}* top) {{
        return top->{port_name};
    }}
            "#
        )
        .whatever_context("Failed to format port read FFI")?;
    }

    writeln!(&mut buffer, "}} // extern \"C\"")
        .whatever_context("Failed to format ending brace")?;

    fs::write(&ffi_wrappers, buffer)
        .whatever_context("Failed to write FFI wrappers file")?;

    Ok(ffi_wrappers)
}

fn last_modified(path: &Utf8Path) -> Result<SystemTime, Whatever> {
    fs::metadata(path)
        .whatever_context(format!("Failed to read file metadata for {}", path))?
        .modified()
        .whatever_context(format!(
            "Failed to determine last-modified time for {}",
            path
        ))
}

fn needs_rebuild(
    source_files: &[Utf8PathBuf],
    library_path: &Utf8Path,
    verilator_artifact_directory: &Utf8Path,
) -> Result<bool, Whatever> {
    if !verilator_artifact_directory.exists() || !library_path.is_file() {
        return Ok(true);
    }

    let Some(last_built) = fs::read_dir(verilator_artifact_directory)
        .whatever_context(format!(
            "{} exists but could not read it",
            verilator_artifact_directory
        ))?
        .flatten() // Remove failed
        .filter_map(|entry| {
            entry
                .metadata()
                .ok()
                .filter(|metadata| metadata.is_file())
                .and_then(|metadata| metadata.modified().ok())
        })
        .max()
    else {
        return Ok(true);
    };

    for source_file in source_files {
        if last_modified(source_file)? > last_built {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Generates the FFI shim for `top_module` and runs Verilator over the sources
/// and the shim, producing a shared library in `artifact_directory/obj_dir`.
/// Returns the path of the library, which may be a previous build if nothing
/// changed since.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_library(
    source_files: &[Utf8PathBuf],
    include_directories: &[Utf8PathBuf],
    top_module: &str,
    ports: &[Port],
    artifact_directory: &Utf8Path,
    options: &VerilatorRuntimeOptions,
    enable_tracing: bool,
) -> Result<Utf8PathBuf, Whatever> {
    let ffi_artifact_directory = artifact_directory.join("ffi");
    fs::create_dir_all(&ffi_artifact_directory).whatever_context(
        "Failed to create ffi subdirectory under artifacts directory",
    )?;
    let verilator_artifact_directory = artifact_directory.join("obj_dir");
    let library_name = format!("V{}_dyn", top_module);
    let library_path =
        verilator_artifact_directory.join(format!("lib{}.so", library_name));

    if !options.force_verilator_rebuild
        && !needs_rebuild(
            source_files,
            &library_path,
            &verilator_artifact_directory,
        )
        .whatever_context("Failed to check if artifacts need rebuilding")?
    {
        if options.log {
            log::info!("Reusing dynamic library at {}", library_path);
        }
        return Ok(library_path);
    }

    let _ffi_wrappers = build_ffi(
        &ffi_artifact_directory,
        top_module,
        ports,
        enable_tracing,
    )
    .whatever_context("Failed to build FFI wrappers")?;

    // bug in verilator#5226 means the directory must be relative to -Mdir
    let ffi_wrappers = Utf8Path::new("../ffi/ffi.cpp");

    // verilator runs with -Mdir as its own root for some paths, so hand it
    // absolute sources
    let mut absolute_sources = Vec::with_capacity(source_files.len());
    for source_file in source_files {
        absolute_sources.push(source_file.canonicalize_utf8().whatever_context(
            format!("Failed to canonicalize source file {}", source_file),
        )?);
    }

    let mut verilator_command = Command::new(&options.verilator_executable);
    verilator_command
        .args(["--cc", "-sv", "--build", "-j", "0"])
        .args(["-CFLAGS", "-shared -fpic"])
        .args(["--lib-create", &library_name])
        .args(["--Mdir", verilator_artifact_directory.as_str()])
        .args(["--top-module", top_module]);
    if enable_tracing {
        verilator_command.arg("--trace");
    }
    if let Some(level) = options.verilator_optimization {
        if level > 3 {
            whatever!(
                "Invalid Verilator optimization level {}, expected 0 to 3",
                level
            );
        }
        verilator_command.arg(format!("-O{level}"));
    }
    for warning in &options.ignored_warnings {
        verilator_command.arg(format!("-Wno-{warning}"));
    }
    for include_directory in include_directories {
        verilator_command.arg(format!("-I{include_directory}"));
    }
    verilator_command
        .args(absolute_sources.iter().map(|path| path.as_str()))
        .arg(ffi_wrappers);

    if options.log {
        log::info!("Invoking {:?}", verilator_command);
    }
    let verilator_output = verilator_command
        .output()
        .whatever_context("Invocation of verilator failed")?;

    if !verilator_output.status.success() {
        whatever!(
            "Invocation of verilator failed with nonzero exit code {}\n\n--- STDOUT ---\n{}\n\n--- STDERR ---\n{}",
            verilator_output.status,
            String::from_utf8(verilator_output.stdout).unwrap_or_default(),
            String::from_utf8(verilator_output.stderr).unwrap_or_default()
        );
    }

    Ok(library_path)
}
