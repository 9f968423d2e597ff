// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use camino::Utf8Path;
use handshake_verilator::{
    AsDynamicVerilatedModel, DynamicVerilatedModel, PortDirection,
    VerilatorValue, vcd::Vcd,
};
use snafu::{OptionExt, ResultExt, ensure};

use crate::simulation::{
    BackendSnafu, NoSuchSignalSnafu, NotWritableSnafu, Simulation, SignalError,
    ValueTooWideSnafu,
};

/// VCD time units per clock cycle. Inputs are sampled at the start of the
/// cycle, the rising edge is half way through.
const CYCLE_TIMESTEPS: u64 = 10;

/// A [`DynamicVerilatedModel`] driven by one of its input ports as the clock.
pub struct ClockedModel<'ctx> {
    // declared before `model` so it is closed before the model is deleted
    vcd: Option<Vcd<'ctx>>,
    model: DynamicVerilatedModel<'ctx>,
    clock: String,
    cycles: u64,
}

impl<'ctx> ClockedModel<'ctx> {
    /// Wraps `model`, holding `clock` low. `clock` must be an input port.
    pub fn new(
        mut model: DynamicVerilatedModel<'ctx>,
        clock: impl Into<String>,
    ) -> Result<Self, SignalError> {
        let clock = clock.into();
        let (_, direction) = model
            .port(&clock)
            .context(NoSuchSignalSnafu { signal: &clock })?;
        ensure!(
            matches!(direction, PortDirection::Input | PortDirection::Inout),
            NotWritableSnafu {
                signal: &clock,
                direction
            }
        );

        model.eval();
        let mut this = Self {
            vcd: None,
            model,
            clock,
            cycles: 0,
        };
        this.set_clock(false)?;
        Ok(this)
    }

    /// Starts dumping every clock edge to a VCD file at `path`. The model
    /// must have been built with tracing enabled.
    pub fn trace_to(
        &mut self,
        path: impl AsRef<Utf8Path>,
    ) -> Result<(), SignalError> {
        let path = path.as_ref();
        let mut vcd = self.model.open_vcd(path).context(BackendSnafu {
            signal: path.as_str(),
        })?;
        vcd.dump(self.cycles * CYCLE_TIMESTEPS);
        log::info!("Tracing {} to {}", self.model.name(), path);
        self.vcd = Some(vcd);
        Ok(())
    }

    /// The underlying model.
    pub fn model(&self) -> &DynamicVerilatedModel<'ctx> {
        &self.model
    }

    fn set_clock(&mut self, high: bool) -> Result<(), SignalError> {
        self.write(&self.clock.clone(), high.into())
    }

    fn dump(&mut self, offset: u64) {
        if let Some(vcd) = &mut self.vcd {
            vcd.dump(self.cycles * CYCLE_TIMESTEPS + offset);
        }
    }
}

impl Simulation for ClockedModel<'_> {
    fn read(&self, signal: &str) -> Result<u64, SignalError> {
        self.model
            .port(signal)
            .context(NoSuchSignalSnafu { signal })?;
        let value = self
            .model
            .read(signal)
            .context(BackendSnafu { signal })?;
        Ok(value.as_u64())
    }

    fn write(&mut self, signal: &str, value: u64) -> Result<(), SignalError> {
        let (width, direction) = self
            .model
            .port(signal)
            .context(NoSuchSignalSnafu { signal })?;
        ensure!(
            matches!(direction, PortDirection::Input | PortDirection::Inout),
            NotWritableSnafu { signal, direction }
        );
        let packed = VerilatorValue::for_width(width, value).context(
            ValueTooWideSnafu {
                signal,
                value,
                width,
            },
        )?;

        self.model
            .pin(signal, packed)
            .context(BackendSnafu { signal })?;
        self.model.eval();
        Ok(())
    }

    fn tick(&mut self) -> Result<(), SignalError> {
        self.dump(0);
        self.set_clock(true)?;
        self.dump(CYCLE_TIMESTEPS / 2);
        self.set_clock(false)?;
        self.cycles += 1;
        Ok(())
    }

    fn cycles(&self) -> u64 {
        self.cycles
    }
}

impl Drop for ClockedModel<'_> {
    fn drop(&mut self) {
        if let Some(vcd) = &mut self.vcd {
            vcd.dump(self.cycles * CYCLE_TIMESTEPS);
            vcd.flush();
        }
    }
}
