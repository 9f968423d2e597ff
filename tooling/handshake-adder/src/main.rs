// Copyright (C) 2024 Ethan Uppal.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3 of the License only.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{env, fs};

use argh::FromArgs;
use camino::{Utf8Path, Utf8PathBuf};
use handshake::{
    ADDER_SOURCE, BuildDirectory, Design, Handshake, Outcome, ReferenceAdder,
    Scenario, Simulation,
};
use handshake_verilator::{
    VerilatedModelConfig, VerilatorRuntime, VerilatorRuntimeOptions,
};
use owo_colors::OwoColorize;
use snafu::{ResultExt, Whatever, whatever};

const DEFAULT_BUILD_DIRECTORY: &str = "build/handshake-adder";

/// Drive the latency-insensitive adder through its valid/ready handshake
#[derive(FromArgs)]
struct HandshakeAdderCommand {
    /// directory for the generated HDL source, Verilator artifacts, and
    /// waveforms
    #[argh(
        option,
        short = 'b',
        default = "Utf8PathBuf::from(DEFAULT_BUILD_DIRECTORY)"
    )]
    build_dir: Utf8PathBuf,

    /// TOML scenario to run instead of the built-in one
    #[argh(option, short = 's')]
    scenario: Option<Utf8PathBuf>,

    /// simulate with the Rust reference model instead of Verilator
    #[argh(switch)]
    reference: bool,

    /// write a VCD waveform to adder.vcd in the build directory
    #[argh(switch)]
    trace: bool,

    /// the verilator executable to invoke
    #[argh(option, default = "String::from(\"verilator\")")]
    verilator: String,

    /// verilator optimization level, from 0 to 3
    #[argh(option)]
    optimization: Option<usize>,

    /// rerun verilator even if the build is up to date
    #[argh(switch)]
    rebuild: bool,

    /// clock cycles to wait for a response before giving up
    #[argh(option)]
    max_ticks: Option<u64>,
}

/// Reads the scenario at `path`, resolving its `source` against the file's
/// directory.
fn load_scenario(path: &Utf8Path) -> Result<Scenario, Whatever> {
    let contents = fs::read_to_string(path)
        .whatever_context(format!("Failed to read scenario {path}"))?;
    let mut scenario = Scenario::from_toml(&contents)
        .whatever_context(format!("Failed to parse scenario {path}"))?;
    if let (Some(source), Some(directory)) = (&scenario.source, path.parent()) {
        scenario.source = Some(directory.join(source));
    }
    Ok(scenario)
}

fn report(outcome: &Outcome) {
    match outcome {
        Outcome::Reset => {
            println!("{}", "       RESET".bold().bright_cyan());
        }
        Outcome::Called { .. } => println!("{outcome}"),
        Outcome::Checked { .. } => {
            println!("{} {}", "        PASS".bold().bright_green(), outcome);
        }
    }
}

fn run<S: Simulation>(
    scenario: &Scenario,
    simulation: S,
) -> Result<(), Whatever> {
    log::info!("Running {} step(s)", scenario.steps.len());
    let mut handshake = Handshake::new(simulation, scenario.handshake.clone());
    let result = scenario.run(&mut handshake, report);
    let cycles = handshake.simulation().cycles();

    match result {
        Ok(()) => {
            println!(
                "{} after {} cycle{}",
                "    FINISHED".bold().bright_cyan(),
                cycles,
                if cycles == 1 { "" } else { "s" },
            );
            Ok(())
        }
        Err(error) => {
            println!(
                "{} after {} cycle{}",
                "        FAIL".bold().bright_red(),
                cycles,
                if cycles == 1 { "" } else { "s" },
            );
            Err(error).whatever_context("Scenario did not complete")
        }
    }
}

#[snafu::report]
fn main() -> Result<(), Whatever> {
    let command: HandshakeAdderCommand = argh::from_env();

    if env::var("RUST_LOG").is_ok() {
        env_logger::init();
    }

    let mut scenario = match &command.scenario {
        Some(path) => load_scenario(path)?,
        None => Scenario::builtin()?,
    };
    if let Some(max_ticks) = command.max_ticks {
        scenario.handshake.max_ticks = max_ticks;
    }

    if command.reference {
        if command.trace {
            whatever!("The reference model cannot write a waveform");
        }
        return run(&scenario, ReferenceAdder::for_scenario(&scenario)?);
    }

    let build = BuildDirectory::prepare(&command.build_dir)?;
    let source = match &scenario.source {
        Some(source) => build.copy_source(source)?,
        None => build.emit_source("adder.sv", ADDER_SOURCE)?,
    };
    let design = Design::load(&source, scenario.top.as_deref())?;

    let mut runtime = VerilatorRuntime::new(
        &build.artifacts(),
        &[source.as_path()],
        &[],
        VerilatorRuntimeOptions {
            verilator_executable: command.verilator.into(),
            verilator_optimization: command.optimization,
            force_verilator_rebuild: command.rebuild,
            ..VerilatorRuntimeOptions::default_logging()
        },
    )?;
    let mut model = design.instantiate(
        &mut runtime,
        &scenario.clock,
        &VerilatedModelConfig {
            enable_tracing: command.trace,
        },
    )?;
    if command.trace {
        model
            .trace_to(build.root().join("adder.vcd"))
            .whatever_context("Failed to open waveform")?;
    }

    run(&scenario, model)
}
