// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Request/response round trips over a valid/ready interface.
//!
//! The driver raises the request-valid signal with its inputs applied, clocks
//! the design until the response-valid signal rises, samples the outputs, and
//! then completes the exchange by dropping request-valid and raising
//! response-ready for one more cycle.

use snafu::{ResultExt, Snafu, ensure};

use crate::simulation::{SignalError, Simulation};

/// Names the signals of the interface and bounds how long a response may
/// take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// The reset port.
    pub reset: String,
    /// Whether `reset` is asserted by driving it low.
    pub reset_active_low: bool,
    /// Raised by the driver while its inputs are valid.
    pub request_valid: String,
    /// Raised by the design once its outputs are valid.
    pub response_valid: String,
    /// Raised by the driver to accept the outputs.
    pub response_ready: String,
    /// Ports written, in order, by [`Handshake::call`].
    pub operands: Vec<String>,
    /// Port read back by [`Handshake::call`].
    pub result: String,
    /// The most clock cycles to wait for `response_valid`.
    pub max_ticks: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            reset: "rst_n".into(),
            reset_active_low: true,
            request_valid: "in_valid".into(),
            response_valid: "out_valid".into(),
            response_ready: "out_ready".into(),
            operands: vec!["in_a".into(), "in_b".into()],
            result: "sum".into(),
            max_ticks: 1000,
        }
    }
}

#[derive(Debug, Snafu)]
pub enum HandshakeError {
    #[snafu(display("Signal access failed"))]
    Signal { source: SignalError },
    #[snafu(display(
        "`{port}` did not rise within {ticks} clock cycles of the request"
    ))]
    ResponseTimeout { port: String, ticks: u64 },
    #[snafu(display(
        "Assertion failed: {signal} = {actual}, expected {expected}"
    ))]
    Mismatch {
        signal: String,
        actual: u64,
        expected: u64,
    },
    #[snafu(display("Expected {expected} operands but got {actual}"))]
    OperandCount { expected: usize, actual: usize },
}

/// Drives a [`Simulation`] through valid/ready round trips.
pub struct Handshake<S> {
    simulation: S,
    config: HandshakeConfig,
}

impl<S: Simulation> Handshake<S> {
    pub fn new(simulation: S, config: HandshakeConfig) -> Self {
        Self { simulation, config }
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    pub fn simulation(&self) -> &S {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut S {
        &mut self.simulation
    }

    pub fn into_inner(self) -> S {
        self.simulation
    }

    /// Asserts reset for one clock cycle, then releases it.
    pub fn reset(&mut self) -> Result<(), HandshakeError> {
        let (asserted, released) = if self.config.reset_active_low {
            (0, 1)
        } else {
            (1, 0)
        };
        log::debug!("Resetting through `{}`", self.config.reset);
        self.simulation
            .write(&self.config.reset, asserted)
            .context(SignalSnafu)?;
        self.simulation.tick().context(SignalSnafu)?;
        self.simulation
            .write(&self.config.reset, released)
            .context(SignalSnafu)?;
        Ok(())
    }

    /// Writes `operands` to the configured operand ports in order, waits for
    /// the response, and returns the value of the result port.
    pub fn call(&mut self, operands: &[u64]) -> Result<u64, HandshakeError> {
        ensure!(
            operands.len() == self.config.operands.len(),
            OperandCountSnafu {
                expected: self.config.operands.len(),
                actual: operands.len(),
            }
        );

        for (port, &value) in self.config.operands.iter().zip(operands) {
            self.simulation.write(port, value).context(SignalSnafu)?;
        }
        self.request()?;

        let result = self
            .simulation
            .read(&self.config.result)
            .context(SignalSnafu)?;
        log::info!("{:?} -> {} = {}", operands, self.config.result, result);

        self.acknowledge()?;
        Ok(result)
    }

    /// Writes each named input, waits for the response, and compares each
    /// named output against its expected value in order.
    ///
    /// The first mismatch is returned as [`HandshakeError::Mismatch`] and the
    /// exchange is left open: request-valid stays high and the response is
    /// not acknowledged.
    pub fn check(
        &mut self,
        inputs: &[(impl AsRef<str>, u64)],
        expected: &[(impl AsRef<str>, u64)],
    ) -> Result<(), HandshakeError> {
        for (port, value) in inputs {
            self.simulation
                .write(port.as_ref(), *value)
                .context(SignalSnafu)?;
        }
        self.request()?;

        for (signal, wanted) in expected {
            let signal = signal.as_ref();
            let actual = self.simulation.read(signal).context(SignalSnafu)?;
            ensure!(
                actual == *wanted,
                MismatchSnafu {
                    signal,
                    actual,
                    expected: *wanted,
                }
            );
            log::info!("{} = {} as expected", signal, actual);
        }

        self.acknowledge()
    }

    /// Raises request-valid and clocks until response-valid is high.
    /// Returns the number of cycles waited.
    fn request(&mut self) -> Result<u64, HandshakeError> {
        self.simulation
            .write(&self.config.request_valid, 1)
            .context(SignalSnafu)?;

        let mut ticks = 0;
        while self
            .simulation
            .read(&self.config.response_valid)
            .context(SignalSnafu)?
            == 0
        {
            ensure!(
                ticks < self.config.max_ticks,
                ResponseTimeoutSnafu {
                    port: &self.config.response_valid,
                    ticks,
                }
            );
            self.simulation.tick().context(SignalSnafu)?;
            ticks += 1;
        }

        log::debug!(
            "`{}` rose after {} cycle(s)",
            self.config.response_valid,
            ticks
        );
        Ok(ticks)
    }

    /// Drops request-valid, raises response-ready, and clocks once so the
    /// design can retire the response.
    fn acknowledge(&mut self) -> Result<(), HandshakeError> {
        self.simulation
            .write(&self.config.request_valid, 0)
            .context(SignalSnafu)?;
        self.simulation
            .write(&self.config.response_ready, 1)
            .context(SignalSnafu)?;
        self.simulation.tick().context(SignalSnafu)
    }
}
