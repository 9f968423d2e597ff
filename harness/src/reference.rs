// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! A cycle model of `latencyInsensitiveAdder` in plain Rust.
//!
//! It follows `resources/adder.sv` register for register, so scenarios can be
//! checked without a Verilator installation and the Verilated model can be
//! compared against it.

use handshake_verilator::{Port, PortDirection};
use snafu::{OptionExt, Whatever, ensure, whatever};

use crate::{
    ADDER_TOP,
    scenario::Scenario,
    simulation::{
        NoSuchSignalSnafu, NotWritableSnafu, Simulation, SignalError,
        ValueTooWideSnafu,
    },
};

/// The port [`Simulation::tick`] drives.
const CLOCK: &str = "clk";

/// `(name, width, direction)` in declaration order.
const PORTS: [(&str, usize, PortDirection); 9] = [
    ("clk", 1, PortDirection::Input),
    ("rst_n", 1, PortDirection::Input),
    ("in_a", 32, PortDirection::Input),
    ("in_b", 32, PortDirection::Input),
    ("in_valid", 1, PortDirection::Input),
    ("in_ready", 1, PortDirection::Output),
    ("sum", 32, PortDirection::Output),
    ("out_valid", 1, PortDirection::Output),
    ("out_ready", 1, PortDirection::Input),
];

#[derive(Debug, Default, Clone)]
pub struct ReferenceAdder {
    clk: bool,
    rst_n: bool,
    in_a: u32,
    in_b: u32,
    in_valid: bool,
    out_ready: bool,

    sum_reg: u32,
    compute_done_state: bool,

    cycles: u64,
}

impl ReferenceAdder {
    /// All inputs and registers start at zero, like a fresh Verilated model.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh model for `scenario`, which must target the built-in adder and
    /// clock it through `clk`.
    pub fn for_scenario(scenario: &Scenario) -> Result<Self, Whatever> {
        if let Some(source) = &scenario.source {
            whatever!(
                "The reference model only simulates the built-in adder, not {}",
                source
            );
        }
        if let Some(top) = &scenario.top {
            if top != ADDER_TOP {
                whatever!(
                    "The reference model simulates `{}`, not `{}`",
                    ADDER_TOP,
                    top
                );
            }
        }
        if scenario.clock != CLOCK {
            whatever!(
                "The reference model is clocked by `{}`, not `{}`",
                CLOCK,
                scenario.clock
            );
        }
        Ok(Self::new())
    }

    /// The interface of the modeled module.
    pub fn ports() -> Vec<Port> {
        PORTS
            .iter()
            .map(|&(name, width, direction)| {
                Port::new(name, width - 1, 0, direction)
            })
            .collect()
    }

    fn in_ready(&self) -> bool {
        !self.compute_done_state
    }

    fn out_valid(&self) -> bool {
        self.compute_done_state
    }

    fn rising_edge(&mut self) {
        if !self.rst_n {
            self.sum_reg = 0;
            self.compute_done_state = false;
        } else if self.in_valid && self.in_ready() {
            self.sum_reg = self.in_a.wrapping_add(self.in_b);
            self.compute_done_state = true;
        } else if self.out_valid() && self.out_ready {
            self.sum_reg = 0;
            self.compute_done_state = false;
        }
    }
}

impl Simulation for ReferenceAdder {
    fn read(&self, signal: &str) -> Result<u64, SignalError> {
        Ok(match signal {
            "clk" => self.clk.into(),
            "rst_n" => self.rst_n.into(),
            "in_a" => self.in_a.into(),
            "in_b" => self.in_b.into(),
            "in_valid" => self.in_valid.into(),
            "in_ready" => self.in_ready().into(),
            "sum" => self.sum_reg.into(),
            "out_valid" => self.out_valid().into(),
            "out_ready" => self.out_ready.into(),
            _ => return NoSuchSignalSnafu { signal }.fail(),
        })
    }

    fn write(&mut self, signal: &str, value: u64) -> Result<(), SignalError> {
        let &(_, width, direction) = PORTS
            .iter()
            .find(|(name, _, _)| *name == signal)
            .context(NoSuchSignalSnafu { signal })?;
        ensure!(
            direction == PortDirection::Input,
            NotWritableSnafu { signal, direction }
        );
        ensure!(
            value >> width == 0,
            ValueTooWideSnafu {
                signal,
                value,
                width
            }
        );

        let bit = value != 0;
        match signal {
            "clk" => {
                let was_low = !self.clk;
                self.clk = bit;
                if was_low && bit {
                    self.rising_edge();
                }
            }
            "rst_n" => self.rst_n = bit,
            "in_a" => self.in_a = value as u32,
            "in_b" => self.in_b = value as u32,
            "in_valid" => self.in_valid = bit,
            "out_ready" => self.out_ready = bit,
            _ => unreachable!("every input in PORTS is handled"),
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<(), SignalError> {
        self.write(CLOCK, 1)?;
        self.write(CLOCK, 0)?;
        self.cycles += 1;
        Ok(())
    }

    fn cycles(&self) -> u64 {
        self.cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_a_pending_result() {
        let mut adder = ReferenceAdder::new();
        adder.rst_n = true;
        adder.compute_done_state = true;
        adder.sum_reg = 9;

        adder.write("rst_n", 0).unwrap();
        adder.tick().unwrap();

        assert_eq!(adder.read("sum").unwrap(), 0);
        assert_eq!(adder.read("out_valid").unwrap(), 0);
        assert_eq!(adder.read("in_ready").unwrap(), 1);
    }

    #[test]
    fn sum_wraps_at_32_bits() {
        let mut adder = ReferenceAdder::new();
        adder.write("rst_n", 1).unwrap();
        adder.write("in_a", u32::MAX.into()).unwrap();
        adder.write("in_b", 2).unwrap();
        adder.write("in_valid", 1).unwrap();
        adder.tick().unwrap();
        assert_eq!(adder.read("sum").unwrap(), 1);
    }

    #[test]
    fn outputs_cannot_be_driven() {
        let mut adder = ReferenceAdder::new();
        assert!(matches!(
            adder.write("sum", 1),
            Err(SignalError::NotWritable { .. })
        ));
    }

    #[test]
    fn oversized_values_are_rejected() {
        let mut adder = ReferenceAdder::new();
        assert!(matches!(
            adder.write("in_valid", 2),
            Err(SignalError::ValueTooWide { width: 1, .. })
        ));
        assert!(matches!(
            adder.write("in_a", 1 << 32),
            Err(SignalError::ValueTooWide { width: 32, .. })
        ));
    }

    #[test]
    fn builtin_scenario_runs_on_the_reference_model() {
        let scenario = Scenario::builtin().unwrap();
        assert!(ReferenceAdder::for_scenario(&scenario).is_ok());
    }

    #[test]
    fn scenarios_for_other_designs_are_refused() {
        let builtin = Scenario::builtin().unwrap();

        let other_clock = Scenario {
            clock: "clk_fast".into(),
            ..builtin.clone()
        };
        assert!(ReferenceAdder::for_scenario(&other_clock).is_err());

        let other_top = Scenario {
            top: Some("multiplier".into()),
            ..builtin.clone()
        };
        assert!(ReferenceAdder::for_scenario(&other_top).is_err());

        let other_source = Scenario {
            source: Some("mul.sv".into()),
            ..builtin
        };
        assert!(ReferenceAdder::for_scenario(&other_source).is_err());
    }

    #[test]
    fn unnamed_top_is_assumed_to_be_the_adder() {
        let scenario = Scenario {
            top: None,
            ..Scenario::builtin().unwrap()
        };
        assert!(ReferenceAdder::for_scenario(&scenario).is_ok());
    }

    #[test]
    fn unknown_signals_are_reported() {
        let adder = ReferenceAdder::new();
        assert!(matches!(
            adder.read("carry"),
            Err(SignalError::NoSuchSignal { .. })
        ));
    }
}
