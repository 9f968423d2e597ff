// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Scripted sequences of round trips, optionally read from TOML.
//!
//! ```toml
//! [scenario]
//! top = "latencyInsensitiveAdder"   # default: first module in the source
//! clock = "clk"
//! max_ticks = 1000
//! source = "other.sv"               # default: the built-in adder
//!
//! [scenario.reset]
//! port = "rst_n"
//! active_low = true
//!
//! [scenario.handshake]
//! request_valid = "in_valid"
//! response_valid = "out_valid"
//! response_ready = "out_ready"
//! operands = ["in_a", "in_b"]
//! result = "sum"
//!
//! [[step]]
//! call = [30, 40]
//!
//! [[step]]
//! inputs = { in_a = 5, in_b = 16 }
//! expect = { sum = 21 }
//!
//! [[step]]
//! reset = true
//! ```

use std::fmt;

use camino::Utf8PathBuf;
use snafu::{OptionExt, ResultExt, Whatever, whatever};

use crate::{
    handshake::{Handshake, HandshakeConfig, HandshakeError},
    simulation::Simulation,
};

/// The adder walkthrough: two calls and two checks. It finishes with a check
/// that is expected to fail.
pub const BUILTIN_SCENARIO: &str = include_str!("../resources/adder.toml");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Reset,
    Call {
        operands: Vec<u64>,
    },
    Check {
        inputs: Vec<(String, u64)>,
        expected: Vec<(String, u64)>,
    },
}

/// What a completed step observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reset,
    Called {
        operands: Vec<u64>,
        result: u64,
    },
    Checked {
        inputs: Vec<(String, u64)>,
        expected: Vec<(String, u64)>,
    },
}

fn write_assignments(
    f: &mut fmt::Formatter<'_>,
    assignments: &[(String, u64)],
) -> fmt::Result {
    for (index, (name, value)) in assignments.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{name} = {value}")?;
    }
    Ok(())
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Reset => write!(f, "reset"),
            Outcome::Called { result, .. } => write!(f, "{result}"),
            Outcome::Checked { inputs, expected } => {
                write_assignments(f, inputs)?;
                write!(f, " => ")?;
                write_assignments(f, expected)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Top module; `None` means the first module in the source.
    pub top: Option<String>,
    pub clock: String,
    /// Source to simulate instead of the built-in adder, as written in the
    /// scenario file.
    pub source: Option<Utf8PathBuf>,
    pub handshake: HandshakeConfig,
    pub steps: Vec<Step>,
}

fn string(value: &toml::Value, key: &str) -> Result<String, Whatever> {
    value
        .as_str()
        .map(str::to_string)
        .with_whatever_context(|| format!("`{key}` must be a string"))
}

fn unsigned(value: &toml::Value, key: &str) -> Result<u64, Whatever> {
    let integer = value
        .as_integer()
        .with_whatever_context(|| format!("`{key}` must be an integer"))?;
    u64::try_from(integer)
        .with_whatever_context(|_| format!("`{key}` must not be negative"))
}

/// `name = value` pairs in the order they are written.
fn assignments(
    value: &toml::Value,
    key: &str,
) -> Result<Vec<(String, u64)>, Whatever> {
    let table = value
        .as_table()
        .with_whatever_context(|| format!("`{key}` must be a table"))?;
    table
        .iter()
        .map(|(name, value)| {
            Ok((name.clone(), unsigned(value, &format!("{key}.{name}"))?))
        })
        .collect()
}

fn parse_step(index: usize, step: &toml::Value) -> Result<Step, Whatever> {
    let Some(table) = step.as_table() else {
        whatever!("Step {} is not a table", index);
    };

    if let Some(operands) = table.get("call") {
        let Some(operands) = operands.as_array() else {
            whatever!("`call` in step {} must be an array", index);
        };
        let operands = operands
            .iter()
            .map(|operand| unsigned(operand, "call"))
            .collect::<Result<_, _>>()?;
        return Ok(Step::Call { operands });
    }

    if let Some(expected) = table.get("expect") {
        let inputs = match table.get("inputs") {
            Some(inputs) => assignments(inputs, "inputs")?,
            None => vec![],
        };
        return Ok(Step::Check {
            inputs,
            expected: assignments(expected, "expect")?,
        });
    }

    if let Some(reset) = table.get("reset") {
        if reset.as_bool() == Some(true) {
            return Ok(Step::Reset);
        }
        whatever!("`reset` in step {} must be `true`", index);
    }

    whatever!(
        "Step {} has none of `call`, `expect`, or `reset`: {}",
        index,
        table.keys().cloned().collect::<Vec<_>>().join(", ")
    )
}

impl Scenario {
    /// [`BUILTIN_SCENARIO`], parsed.
    pub fn builtin() -> Result<Self, Whatever> {
        Self::from_toml(BUILTIN_SCENARIO)
            .whatever_context("Built-in scenario is malformed")
    }

    /// Reads a scenario. Every key under `[scenario]` is optional and
    /// defaults to the adder's interface.
    pub fn from_toml(text: &str) -> Result<Self, Whatever> {
        let document: toml::Table = text
            .parse()
            .whatever_context("Scenario is not valid TOML")?;

        let mut scenario = Scenario {
            top: None,
            clock: "clk".into(),
            source: None,
            handshake: HandshakeConfig::default(),
            steps: vec![],
        };

        if let Some(header) = document.get("scenario") {
            let Some(header) = header.as_table() else {
                whatever!("`scenario` must be a table");
            };

            if let Some(top) = header.get("top") {
                scenario.top = Some(string(top, "scenario.top")?);
            }
            if let Some(clock) = header.get("clock") {
                scenario.clock = string(clock, "scenario.clock")?;
            }
            if let Some(source) = header.get("source") {
                scenario.source =
                    Some(string(source, "scenario.source")?.into());
            }
            if let Some(max_ticks) = header.get("max_ticks") {
                scenario.handshake.max_ticks =
                    unsigned(max_ticks, "scenario.max_ticks")?;
            }

            if let Some(reset) = header.get("reset") {
                if let Some(port) = reset.get("port") {
                    scenario.handshake.reset =
                        string(port, "scenario.reset.port")?;
                }
                if let Some(active_low) = reset.get("active_low") {
                    scenario.handshake.reset_active_low = active_low
                        .as_bool()
                        .whatever_context(
                            "`scenario.reset.active_low` must be a boolean",
                        )?;
                }
            }

            if let Some(handshake) = header.get("handshake") {
                let config = &mut scenario.handshake;
                for (key, field) in [
                    ("request_valid", &mut config.request_valid),
                    ("response_valid", &mut config.response_valid),
                    ("response_ready", &mut config.response_ready),
                    ("result", &mut config.result),
                ] {
                    if let Some(value) = handshake.get(key) {
                        *field = string(
                            value,
                            &format!("scenario.handshake.{key}"),
                        )?;
                    }
                }
                if let Some(operands) = handshake.get("operands") {
                    let Some(operands) = operands.as_array() else {
                        whatever!(
                            "`scenario.handshake.operands` must be an array"
                        );
                    };
                    config.operands = operands
                        .iter()
                        .map(|operand| {
                            string(operand, "scenario.handshake.operands")
                        })
                        .collect::<Result<_, _>>()?;
                }
            }
        }

        if let Some(steps) = document.get("step") {
            let Some(steps) = steps.as_array() else {
                whatever!("`step` must be an array of tables");
            };
            scenario.steps = steps
                .iter()
                .enumerate()
                .map(|(index, step)| parse_step(index, step))
                .collect::<Result<_, _>>()?;
        }

        Ok(scenario)
    }

    /// Resets the design, then runs every step in order, handing each
    /// [`Outcome`] to `observe` as soon as the step completes. Stops at the
    /// first failing step.
    pub fn run<S: Simulation>(
        &self,
        handshake: &mut Handshake<S>,
        mut observe: impl FnMut(&Outcome),
    ) -> Result<(), HandshakeError> {
        handshake.reset()?;
        observe(&Outcome::Reset);

        for step in &self.steps {
            let outcome = match step {
                Step::Reset => {
                    handshake.reset()?;
                    Outcome::Reset
                }
                Step::Call { operands } => Outcome::Called {
                    operands: operands.clone(),
                    result: handshake.call(operands)?,
                },
                Step::Check { inputs, expected } => {
                    handshake.check(inputs, expected)?;
                    Outcome::Checked {
                        inputs: inputs.clone(),
                        expected: expected.clone(),
                    }
                }
            };
            observe(&outcome);
        }

        Ok(())
    }
}
