// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use handshake_verilator::{DynamicVerilatedModelError, PortDirection};
use snafu::Snafu;

/// A running simulation whose signals are addressed by name.
///
/// Writes take effect immediately: combinational outputs reflect them on the
/// next read. Registered state only changes on [`Simulation::tick`].
pub trait Simulation {
    /// The current value of `signal`, zero-extended to 64 bits.
    fn read(&self, signal: &str) -> Result<u64, SignalError>;

    /// Drives the input `signal` to `value`. Fails if `value` does not fit in
    /// the signal's declared width.
    fn write(&mut self, signal: &str, value: u64) -> Result<(), SignalError>;

    /// Advances one full clock cycle (a rising then a falling edge).
    fn tick(&mut self) -> Result<(), SignalError>;

    /// The number of completed clock cycles.
    fn cycles(&self) -> u64;
}

impl<S: Simulation + ?Sized> Simulation for &mut S {
    fn read(&self, signal: &str) -> Result<u64, SignalError> {
        (**self).read(signal)
    }

    fn write(&mut self, signal: &str, value: u64) -> Result<(), SignalError> {
        (**self).write(signal, value)
    }

    fn tick(&mut self) -> Result<(), SignalError> {
        (**self).tick()
    }

    fn cycles(&self) -> u64 {
        (**self).cycles()
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SignalError {
    #[snafu(display("No signal named `{signal}`"))]
    NoSuchSignal { signal: String },
    #[snafu(display("Signal `{signal}` is an {direction} and cannot be driven"))]
    NotWritable {
        signal: String,
        direction: PortDirection,
    },
    #[snafu(display(
        "Value {value} does not fit in the {width} bits of signal `{signal}`"
    ))]
    ValueTooWide {
        signal: String,
        value: u64,
        width: usize,
    },
    #[snafu(display("Verilated model rejected access to `{signal}`"))]
    Backend {
        signal: String,
        source: DynamicVerilatedModelError,
    },
}
