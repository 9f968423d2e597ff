// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use camino::{Utf8Path, Utf8PathBuf};
use handshake_verilator::{Port, VerilatedModelConfig, VerilatorRuntime};
use snafu::{OptionExt, ResultExt, Whatever};

use crate::clocked::ClockedModel;

/// A top module and the interface discovered from its source.
#[derive(Debug, Clone)]
pub struct Design {
    source: Utf8PathBuf,
    top: String,
    ports: Vec<Port>,
}

impl Design {
    /// Parses `source` and reads the ports of `top`, or of the first module
    /// declared in the file when `top` is `None`.
    pub fn load(
        source: impl AsRef<Utf8Path>,
        top: Option<&str>,
    ) -> Result<Self, Whatever> {
        let source = source.as_ref();
        let top = match top {
            Some(top) => top.to_string(),
            None => handshake_verilog::module_names(source)
                .whatever_context(format!("Failed to parse {source}"))?
                .into_iter()
                .next()
                .whatever_context(format!("{source} declares no modules"))?,
        };
        let ports = handshake_verilog::parse_module_ports(source, &top)
            .whatever_context(format!(
                "Failed to read the interface of `{top}`"
            ))?;
        log::info!("Found {} port(s) on `{}`", ports.len(), top);

        Ok(Self {
            source: source.to_path_buf(),
            top,
            ports,
        })
    }

    pub fn source(&self) -> &Utf8Path {
        &self.source
    }

    pub fn top(&self) -> &str {
        &self.top
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Builds (or reuses) the Verilated library for this design and wraps a
    /// fresh instance of it, clocked by `clock`.
    pub fn instantiate<'ctx>(
        &self,
        runtime: &'ctx mut VerilatorRuntime,
        clock: &str,
        config: &VerilatedModelConfig,
    ) -> Result<ClockedModel<'ctx>, Whatever> {
        let model = runtime.create_dyn_model(
            &self.top,
            &self.source,
            &self.ports,
            config,
        )?;
        ClockedModel::new(model, clock)
            .whatever_context(format!("Cannot clock `{}`", self.top))
    }
}
