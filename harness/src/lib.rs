// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Drive latency-insensitive (valid/ready) hardware from Rust.
//!
//! A [`Handshake`] performs request/response round trips against anything
//! implementing [`Simulation`]: either a Verilated model wrapped in a
//! [`ClockedModel`] or the pure-Rust [`ReferenceAdder`]. A [`Scenario`]
//! scripts a sequence of such round trips.
//!
//! ```no_run
//! use handshake::{BuildDirectory, Design, Handshake, HandshakeConfig};
//! use handshake_verilator::{
//!     VerilatedModelConfig, VerilatorRuntime, VerilatorRuntimeOptions,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let build = BuildDirectory::prepare("build/adder")?;
//!     let source = build.emit_source("adder.sv", handshake::ADDER_SOURCE)?;
//!     let design = Design::load(&source, Some(handshake::ADDER_TOP))?;
//!
//!     let mut runtime = VerilatorRuntime::new(
//!         &build.artifacts(),
//!         &[source.as_path()],
//!         &[],
//!         VerilatorRuntimeOptions::default_logging(),
//!     )?;
//!     let model = design.instantiate(
//!         &mut runtime,
//!         "clk",
//!         &VerilatedModelConfig::default(),
//!     )?;
//!
//!     let mut adder = Handshake::new(model, HandshakeConfig::default());
//!     adder.reset()?;
//!     assert_eq!(adder.call(&[30, 40])?, 70);
//!     Ok(())
//! }
//! ```

mod clocked;
mod design;
mod handshake;
mod reference;
mod scenario;
mod simulation;
mod workspace;

pub use clocked::ClockedModel;
pub use design::Design;
pub use handshake::{Handshake, HandshakeConfig, HandshakeError};
pub use reference::ReferenceAdder;
pub use scenario::{BUILTIN_SCENARIO, Outcome, Scenario, Step};
pub use simulation::{SignalError, Simulation};
pub use workspace::BuildDirectory;

/// The latency-insensitive adder: a 32-bit sum that becomes valid one cycle
/// after the request and is held until it is accepted.
pub const ADDER_SOURCE: &str = include_str!("../resources/adder.sv");

/// The module declared in [`ADDER_SOURCE`].
pub const ADDER_TOP: &str = "latencyInsensitiveAdder";
