// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use std::{env, fs};

use camino::Utf8Path;
use handshake::{
    ADDER_SOURCE, ADDER_TOP, BuildDirectory, ClockedModel, Design, Handshake,
    HandshakeConfig, HandshakeError, ReferenceAdder, Scenario, SignalError,
    Simulation,
};
use handshake_verilator::{
    VerilatedModelConfig, VerilatorRuntime, VerilatorRuntimeOptions,
};
use snafu::{ResultExt, Whatever};

fn runtime(
    build: &BuildDirectory,
) -> Result<(VerilatorRuntime, Design), Whatever> {
    if env::var("RUST_LOG").is_ok() {
        let _ = env_logger::try_init();
    }

    let source = build.emit_source("adder.sv", ADDER_SOURCE)?;
    let design = Design::load(&source, Some(ADDER_TOP))?;
    let runtime = VerilatorRuntime::new(
        &build.artifacts(),
        &[source.as_path()],
        &[],
        VerilatorRuntimeOptions::default_logging(),
    )?;
    Ok((runtime, design))
}

fn build_directory(name: &str) -> Result<BuildDirectory, Whatever> {
    BuildDirectory::prepare(
        Utf8Path::new(env!("CARGO_TARGET_TMPDIR")).join(name),
    )
}

#[test]
#[ignore = "requires verilator on PATH"]
#[snafu::report]
fn verilated_adder_runs_the_builtin_scenario() -> Result<(), Whatever> {
    let build = build_directory("verilated-adder")?;
    let (mut runtime, design) = runtime(&build)?;
    let model = design.instantiate(
        &mut runtime,
        "clk",
        &VerilatedModelConfig::default(),
    )?;

    let scenario = Scenario::builtin()?;
    let mut adder = Handshake::new(model, scenario.handshake.clone());

    let mut results = vec![];
    let error = scenario
        .run(&mut adder, |outcome| results.push(outcome.to_string()))
        .expect_err("the last check expects the wrong sum");

    assert_eq!(
        results,
        ["reset", "70", "25", "in_a = 5, in_b = 16 => sum = 21"]
    );
    assert!(matches!(
        error,
        HandshakeError::Mismatch {
            actual: 21,
            expected: 5,
            ..
        }
    ));

    Ok(())
}

#[test]
#[ignore = "requires verilator on PATH"]
#[snafu::report]
fn verilated_adder_agrees_with_the_reference_model() -> Result<(), Whatever> {
    let build = build_directory("lockstep-adder")?;
    let (mut runtime, design) = runtime(&build)?;
    let mut model = design.instantiate(
        &mut runtime,
        "clk",
        &VerilatedModelConfig::default(),
    )?;
    let mut reference = ReferenceAdder::new();

    let mut verilated = Handshake::new(&mut model, HandshakeConfig::default());
    let mut modeled =
        Handshake::new(&mut reference, HandshakeConfig::default());
    verilated.reset().whatever_context("reset")?;
    modeled.reset().whatever_context("reset")?;

    for operands in [[0, 0], [30, 40], [u64::from(u32::MAX), 2], [7, 9]] {
        assert_eq!(
            verilated.call(&operands).whatever_context("call")?,
            modeled.call(&operands).whatever_context("call")?
        );
    }

    for port in ReferenceAdder::ports() {
        assert_eq!(
            model.read(&port.name).whatever_context("read")?,
            reference.read(&port.name).whatever_context("read")?,
            "{} differs",
            port.name
        );
    }

    Ok(())
}

#[test]
#[ignore = "requires verilator on PATH"]
#[snafu::report]
fn traced_adder_writes_a_vcd() -> Result<(), Whatever> {
    let build = build_directory("traced-adder")?;
    let (mut runtime, design) = runtime(&build)?;
    let vcd_path = build.root().join("adder.vcd");
    {
        let mut model = design.instantiate(
            &mut runtime,
            "clk",
            &VerilatedModelConfig {
                enable_tracing: true,
            },
        )?;
        model.trace_to(&vcd_path).whatever_context("trace")?;

        let mut adder = Handshake::new(model, HandshakeConfig::default());
        adder.reset().whatever_context("reset")?;
        adder.call(&[1, 2]).whatever_context("call")?;
    }

    let contents = fs::read_to_string(&vcd_path)
        .whatever_context("Failed to read the VCD")?;
    assert!(contents.contains("$enddefinitions"));
    Ok(())
}

#[test]
#[ignore = "requires verilator on PATH"]
#[snafu::report]
fn verilated_signals_are_checked_by_name_and_width() -> Result<(), Whatever>
{
    let build = build_directory("checked-adder")?;
    let (mut runtime, design) = runtime(&build)?;
    let config = VerilatedModelConfig::default();

    let model = runtime.create_dyn_model(
        design.top(),
        design.source(),
        design.ports(),
        &config,
    )?;
    assert!(matches!(
        ClockedModel::new(model, "clock"),
        Err(SignalError::NoSuchSignal { signal }) if signal == "clock"
    ));

    let mut model = design.instantiate(&mut runtime, "clk", &config)?;
    assert!(matches!(
        model.read("carry"),
        Err(SignalError::NoSuchSignal { .. })
    ));
    assert!(matches!(
        model.write("carry", 1),
        Err(SignalError::NoSuchSignal { .. })
    ));
    assert!(matches!(
        model.write("sum", 1),
        Err(SignalError::NotWritable { .. })
    ));
    assert!(matches!(
        model.write("in_a", 1 << 32),
        Err(SignalError::ValueTooWide { width: 32, .. })
    ));

    Ok(())
}
