// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use camino::Utf8PathBuf;
use handshake::{ADDER_TOP, Design, ReferenceAdder};
use snafu::Whatever;

fn adder_source() -> Utf8PathBuf {
    Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("resources/adder.sv")
}

#[test]
#[snafu::report]
fn discovered_ports_match_the_reference_model() -> Result<(), Whatever> {
    let design = Design::load(adder_source(), Some(ADDER_TOP))?;
    assert_eq!(design.top(), ADDER_TOP);
    assert_eq!(design.ports(), ReferenceAdder::ports());
    Ok(())
}

#[test]
#[snafu::report]
fn top_defaults_to_the_first_module() -> Result<(), Whatever> {
    let design = Design::load(adder_source(), None)?;
    assert_eq!(design.top(), ADDER_TOP);
    Ok(())
}

#[test]
fn unknown_top_is_reported() {
    assert!(Design::load(adder_source(), Some("multiplier")).is_err());
}
