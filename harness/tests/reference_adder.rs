// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use std::env;

use handshake::{
    Handshake, HandshakeConfig, HandshakeError, Outcome, ReferenceAdder,
    Scenario, SignalError, Simulation,
};
use snafu::{ResultExt, Whatever};

fn reset_adder() -> Result<Handshake<ReferenceAdder>, Whatever> {
    if env::var("RUST_LOG").is_ok() {
        let _ = env_logger::try_init();
    }

    let mut adder =
        Handshake::new(ReferenceAdder::new(), HandshakeConfig::default());
    adder.reset().whatever_context("reset")?;
    Ok(adder)
}

#[test]
#[snafu::report]
fn calls_return_sums_in_order() -> Result<(), Whatever> {
    let mut adder = reset_adder()?;

    assert_eq!(adder.call(&[30, 40]).whatever_context("call")?, 70);
    assert_eq!(adder.call(&[10, 15]).whatever_context("call")?, 25);

    Ok(())
}

#[test]
#[snafu::report]
fn matching_check_passes() -> Result<(), Whatever> {
    let mut adder = reset_adder()?;

    adder
        .check(&[("in_a", 5), ("in_b", 16)], &[("sum", 21)])
        .whatever_context("check")?;

    Ok(())
}

#[test]
#[snafu::report]
fn mismatched_check_reports_actual_and_expected() -> Result<(), Whatever> {
    let mut adder = reset_adder()?;

    let error = adder
        .check(&[("in_a", 5), ("in_b", 16)], &[("sum", 5)])
        .expect_err("sum is 21, not 5");
    assert!(matches!(
        &error,
        HandshakeError::Mismatch {
            signal,
            actual: 21,
            expected: 5,
        } if signal == "sum"
    ));
    assert_eq!(error.to_string(), "Assertion failed: sum = 21, expected 5");

    // the failed exchange is not acknowledged
    let simulation = adder.simulation();
    assert_eq!(simulation.read("in_valid").whatever_context("read")?, 1);
    assert_eq!(simulation.read("out_valid").whatever_context("read")?, 1);

    Ok(())
}

#[test]
#[snafu::report]
fn response_needs_a_clock_edge() -> Result<(), Whatever> {
    let mut adder = reset_adder()?;
    let simulation = adder.simulation_mut();

    simulation.write("in_a", 1).whatever_context("write")?;
    simulation.write("in_b", 2).whatever_context("write")?;
    simulation.write("in_valid", 1).whatever_context("write")?;
    assert_eq!(simulation.read("out_valid").whatever_context("read")?, 0);

    simulation.tick().whatever_context("tick")?;
    assert_eq!(simulation.read("out_valid").whatever_context("read")?, 1);
    assert_eq!(simulation.read("sum").whatever_context("read")?, 3);

    Ok(())
}

#[test]
#[snafu::report]
fn request_valid_is_dropped_after_each_round_trip() -> Result<(), Whatever> {
    let mut adder = reset_adder()?;

    for (a, b) in [(30, 40), (10, 15), (u64::from(u32::MAX), 1)] {
        adder.call(&[a, b]).whatever_context("call")?;
        let simulation = adder.simulation();
        assert_eq!(simulation.read("in_valid").whatever_context("read")?, 0);
        assert_eq!(simulation.read("out_valid").whatever_context("read")?, 0);
    }

    Ok(())
}

#[test]
#[snafu::report]
fn each_round_trip_takes_two_cycles() -> Result<(), Whatever> {
    let mut adder = reset_adder()?;
    let before = adder.simulation().cycles();

    adder.call(&[1, 1]).whatever_context("call")?;
    assert_eq!(adder.simulation().cycles() - before, 2);

    Ok(())
}

#[test]
#[snafu::report]
fn wrong_operand_count_is_rejected() -> Result<(), Whatever> {
    let mut adder = reset_adder()?;

    assert!(matches!(
        adder.call(&[1]),
        Err(HandshakeError::OperandCount {
            expected: 2,
            actual: 1
        })
    ));

    Ok(())
}

#[test]
#[snafu::report]
fn operands_wider_than_their_port_are_rejected() -> Result<(), Whatever> {
    let mut adder = reset_adder()?;

    assert!(matches!(
        adder.call(&[1 << 32, 0]),
        Err(HandshakeError::Signal {
            source: SignalError::ValueTooWide { width: 32, .. }
        })
    ));

    Ok(())
}

/// Accepts every write and never raises anything.
#[derive(Default)]
struct Unresponsive {
    cycles: u64,
}

impl Simulation for Unresponsive {
    fn read(&self, _signal: &str) -> Result<u64, SignalError> {
        Ok(0)
    }

    fn write(&mut self, _signal: &str, _value: u64) -> Result<(), SignalError> {
        Ok(())
    }

    fn tick(&mut self) -> Result<(), SignalError> {
        self.cycles += 1;
        Ok(())
    }

    fn cycles(&self) -> u64 {
        self.cycles
    }
}

#[test]
#[snafu::report]
fn silent_design_times_out_after_max_ticks() -> Result<(), Whatever> {
    let config = HandshakeConfig {
        max_ticks: 16,
        ..Default::default()
    };
    let mut design = Handshake::new(Unresponsive::default(), config);
    design.reset().whatever_context("reset")?;
    let before = design.simulation().cycles();

    let error = design.call(&[1, 2]).expect_err("nothing ever responds");
    assert!(matches!(
        &error,
        HandshakeError::ResponseTimeout { port, ticks: 16 }
            if port == "out_valid"
    ));
    assert_eq!(design.simulation().cycles() - before, 16);

    Ok(())
}

#[test]
#[snafu::report]
fn builtin_scenario_stops_at_the_deliberate_failure() -> Result<(), Whatever> {
    let scenario = Scenario::builtin()?;
    let mut adder =
        Handshake::new(ReferenceAdder::new(), scenario.handshake.clone());

    let mut outcomes = vec![];
    let error = scenario
        .run(&mut adder, |outcome| outcomes.push(outcome.to_string()))
        .expect_err("the last check expects the wrong sum");

    assert_eq!(
        outcomes,
        ["reset", "70", "25", "in_a = 5, in_b = 16 => sum = 21"]
    );
    assert_eq!(error.to_string(), "Assertion failed: sum = 21, expected 5");

    Ok(())
}

#[test]
#[snafu::report]
fn scenario_results_are_observed_in_order() -> Result<(), Whatever> {
    let scenario = Scenario::from_toml(
        r#"
        [[step]]
        call = [2, 3]

        [[step]]
        reset = true

        [[step]]
        call = [4, 5]
        "#,
    )?;
    let mut adder =
        Handshake::new(ReferenceAdder::new(), scenario.handshake.clone());

    let mut outcomes = vec![];
    scenario
        .run(&mut adder, |outcome| outcomes.push(outcome.clone()))
        .whatever_context("run")?;

    assert_eq!(
        outcomes,
        [
            Outcome::Reset,
            Outcome::Called {
                operands: vec![2, 3],
                result: 5
            },
            Outcome::Reset,
            Outcome::Called {
                operands: vec![4, 5],
                result: 9
            },
        ]
    );

    Ok(())
}

#[test]
#[snafu::report]
fn first_written_expectation_fails_first() -> Result<(), Whatever> {
    let scenario = Scenario::from_toml(
        r#"
        [[step]]
        inputs = { in_a = 5, in_b = 16 }
        expect = { sum = 5, in_ready = 1 }
        "#,
    )?;
    let mut adder =
        Handshake::new(ReferenceAdder::new(), scenario.handshake.clone());

    let error = scenario
        .run(&mut adder, |_| {})
        .expect_err("both expectations are wrong");
    assert_eq!(error.to_string(), "Assertion failed: sum = 21, expected 5");

    Ok(())
}
