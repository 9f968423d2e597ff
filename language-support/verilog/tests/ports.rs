// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use camino::Utf8PathBuf;
use handshake_verilog::{
    Port, PortDirection, PortParseError, module_names, parse_module_ports,
};
use snafu::{ResultExt, Whatever};

fn fixture() -> Utf8PathBuf {
    Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/ports.sv")
}

#[test]
#[snafu::report]
fn lists_modules_in_source_order() -> Result<(), Whatever> {
    let names = module_names(&fixture()).whatever_context("parse")?;
    assert_eq!(names, ["plain", "second", "too_wide"]);
    Ok(())
}

#[test]
#[snafu::report]
fn reads_widths_and_directions() -> Result<(), Whatever> {
    let ports =
        parse_module_ports(&fixture(), "plain").whatever_context("parse")?;
    assert_eq!(
        ports,
        vec![
            Port::new("clk", 0, 0, PortDirection::Input),
            Port::new("a", 7, 0, PortDirection::Input),
            Port::new("b", 7, 0, PortDirection::Input),
            Port::new("wide", 15, 0, PortDirection::Output),
            Port::new("bus", 0, 0, PortDirection::Inout),
        ]
    );
    Ok(())
}

#[test]
#[snafu::report]
fn finds_modules_after_the_first() -> Result<(), Whatever> {
    let ports =
        parse_module_ports(&fixture(), "second").whatever_context("parse")?;
    assert_eq!(ports.len(), 2);
    assert_eq!(ports[1].width(), 64);
    Ok(())
}

#[test]
fn missing_module_is_reported() {
    let error = parse_module_ports(&fixture(), "nope").unwrap_err();
    assert!(matches!(error, PortParseError::NoSuchModule { .. }));
}

#[test]
fn ports_over_64_bits_are_rejected() {
    let error = parse_module_ports(&fixture(), "too_wide").unwrap_err();
    assert!(
        matches!(error, PortParseError::UnsupportedPort { ref port, .. } if port == "huge")
    );
}
