// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Recovers module interfaces from (System)Verilog source so that a
//! [`handshake_verilator::VerilatorRuntime`] can be asked for a model without
//! the caller spelling out every port.

use std::collections::HashMap;

use camino::Utf8Path;
use snafu::Snafu;
use sv_parser::{self as sv, Locate, RefNode, unwrap_node};

pub use handshake_verilator::{Port, PortDirection};

mod util;

#[derive(Debug, Snafu)]
pub enum PortParseError {
    #[snafu(display("Failed to parse {source_path}: {message}"))]
    Parse {
        source_path: String,
        message: String,
    },
    #[snafu(display(
        "Could not find module declaration for `{module}` in {source_path}"
    ))]
    NoSuchModule { module: String, source_path: String },
    #[snafu(display("Port `{port}` on module `{module}`: {reason}"))]
    UnsupportedPort {
        module: String,
        port: String,
        reason: String,
    },
    #[snafu(display(
        "Escaped identifiers are not supported (found in module `{module}`)"
    ))]
    EscapedIdentifier { module: String },
}

fn parse(source_path: &Utf8Path) -> Result<sv::SyntaxTree, PortParseError> {
    let defines = HashMap::new();
    let include_directory =
        source_path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let (ast, _) = sv::parse_sv(
        source_path,
        &defines,
        &[include_directory],
        false,
        false,
    )
    .map_err(|error| PortParseError::Parse {
        source_path: source_path.to_string(),
        message: error.to_string(),
    })?;
    Ok(ast)
}

// taken from https://github.com/dalance/sv-parser/blob/master/README.md
fn get_identifier(node: RefNode) -> Option<Locate> {
    match unwrap_node!(node, SimpleIdentifier, EscapedIdentifier) {
        Some(RefNode::SimpleIdentifier(x)) => Some(x.nodes.0),
        Some(RefNode::EscapedIdentifier(x)) => Some(x.nodes.0),
        _ => None,
    }
}

fn module_name<'a>(
    ast: &'a sv::SyntaxTree,
    module: &sv::ModuleDeclarationAnsi,
) -> Option<&'a str> {
    let id = unwrap_node!(module, ModuleIdentifier)?;
    let id = get_identifier(id)?;
    ast.get_str_trim(&id)
}

/// The names of the ANSI-style module declarations in `source_path`, in
/// source order.
pub fn module_names(
    source_path: &Utf8Path,
) -> Result<Vec<String>, PortParseError> {
    let ast = parse(source_path)?;
    Ok((&ast)
        .into_iter()
        .filter_map(|node| match node {
            RefNode::ModuleDeclarationAnsi(module) => {
                module_name(&ast, module).map(str::to_string)
            }
            _ => None,
        })
        .collect())
}

/// The type of a port as written, before inheritance from the previous port
/// is applied.
struct PortHeader<'a> {
    direction: Option<&'a sv::PortDirection>,
    dimensions: &'a [sv::PackedDimension],
}

fn net_port_header<'a>(
    module: &str,
    port: &str,
    header: &'a sv::NetPortHeaderOrInterfacePortHeader,
) -> Result<PortHeader<'a>, PortParseError> {
    let unsupported = |reason: &str| PortParseError::UnsupportedPort {
        module: module.to_string(),
        port: port.to_string(),
        reason: reason.to_string(),
    };

    let sv::NetPortHeaderOrInterfacePortHeader::NetPortHeader(net_port_header) =
        header
    else {
        return Err(unsupported("interface ports are not supported"));
    };

    let dimensions = match &net_port_header.nodes.1 {
        sv::NetPortType::DataType(net_port_type_data_type) => {
            match &net_port_type_data_type.nodes.1 {
                sv::DataTypeOrImplicit::DataType(data_type) => {
                    match &**data_type {
                        sv::DataType::Vector(data_type_vector) => {
                            &data_type_vector.nodes.2[..]
                        }
                        _ => {
                            return Err(unsupported(
                                "only vector data types are supported",
                            ));
                        }
                    }
                }
                sv::DataTypeOrImplicit::ImplicitDataType(
                    implicit_data_type,
                ) => &implicit_data_type.nodes.1[..],
            }
        }
        sv::NetPortType::NetTypeIdentifier(_) => {
            return Err(unsupported("user-defined net types are not supported"));
        }
        sv::NetPortType::Interconnect(_) => {
            return Err(unsupported("interconnect ports are not supported"));
        }
    };

    Ok(PortHeader {
        direction: net_port_header.nodes.0.as_ref(),
        dimensions,
    })
}

fn variable_port_header<'a>(
    module: &str,
    port: &str,
    header: &'a sv::VariablePortHeader,
) -> Result<PortHeader<'a>, PortParseError> {
    let sv::VarDataType::DataType(data_type) = &header.nodes.1.nodes.0 else {
        return Err(PortParseError::UnsupportedPort {
            module: module.to_string(),
            port: port.to_string(),
            reason: "`var` ports are not supported".into(),
        });
    };
    let sv::DataType::Vector(data_type_vector) = &**data_type else {
        return Err(PortParseError::UnsupportedPort {
            module: module.to_string(),
            port: port.to_string(),
            reason: "only vector data types are supported".into(),
        });
    };
    Ok(PortHeader {
        direction: header.nodes.0.as_ref(),
        dimensions: &data_type_vector.nodes.2,
    })
}

fn packed_range(
    ast: &sv::SyntaxTree,
    module: &str,
    port: &str,
    dimensions: &[sv::PackedDimension],
) -> Result<(usize, usize), PortParseError> {
    let unsupported = |reason: String| PortParseError::UnsupportedPort {
        module: module.to_string(),
        port: port.to_string(),
        reason,
    };

    match dimensions {
        [] => Ok((0, 0)),
        [sv::PackedDimension::Range(packed_dimension_range)] => {
            let range = &packed_dimension_range.nodes.0.nodes.1.nodes;
            let msb = util::evaluate_numeric_constant_expression(ast, &range.0)
                .map_err(unsupported)?;
            let lsb = util::evaluate_numeric_constant_expression(ast, &range.2)
                .map_err(unsupported)?;
            if msb < lsb {
                return Err(unsupported(format!(
                    "ascending range [{msb}:{lsb}] is not supported"
                )));
            }
            Ok((msb, lsb))
        }
        [_] => Err(unsupported("unsized packed dimension".into())),
        _ => Err(unsupported(
            "multidimensional ports are not supported".into(),
        )),
    }
}

/// Reads the ANSI port list of module `module` declared in `source_path`.
///
/// A port written without a direction or type inherits them from the port
/// before it, as in `input logic [7:0] a, b`.
pub fn parse_module_ports(
    source_path: &Utf8Path,
    module: &str,
) -> Result<Vec<Port>, PortParseError> {
    let ast = parse(source_path)?;

    let Some(declaration) = (&ast).into_iter().find_map(|node| match node {
        RefNode::ModuleDeclarationAnsi(declaration)
            if module_name(&ast, declaration) == Some(module) =>
        {
            Some(declaration)
        }
        _ => None,
    }) else {
        return Err(PortParseError::NoSuchModule {
            module: module.to_string(),
            source_path: source_path.to_string(),
        });
    };

    let port_declarations_list = declaration
        .nodes
        .0
        .nodes
        .6
        .as_ref()
        .and_then(|list| list.nodes.0.nodes.1.as_ref())
        .map(|list| list.contents())
        .unwrap_or(vec![]);

    let mut ports: Vec<Port> = vec![];
    for (_, port) in port_declarations_list {
        let (port_name, header) = match port {
            sv::AnsiPortDeclaration::Net(net) => {
                let port_name = ast.get_str_trim(&net.nodes.1.nodes.0).expect(
                    "Port identifier could not be traced back to source code",
                );
                let header = net
                    .nodes
                    .0
                    .as_ref()
                    .map(|header| net_port_header(module, port_name, header))
                    .transpose()?;
                (port_name, header)
            }
            sv::AnsiPortDeclaration::Variable(variable) => {
                let port_name = ast
                    .get_str_trim(&variable.nodes.1.nodes.0)
                    .expect(
                        "Port identifier could not be traced back to source code",
                    );
                let header = variable
                    .nodes
                    .0
                    .as_ref()
                    .map(|header| {
                        variable_port_header(module, port_name, header)
                    })
                    .transpose()?;
                (port_name, header)
            }
            sv::AnsiPortDeclaration::Paren(_) => {
                return Err(PortParseError::UnsupportedPort {
                    module: module.to_string(),
                    port: "<explicit>".into(),
                    reason: "explicit port expressions are not supported"
                        .into(),
                });
            }
        };

        if port_name.chars().any(|c| c == '\\' || c == ' ') {
            return Err(PortParseError::EscapedIdentifier {
                module: module.to_string(),
            });
        }

        let previous = ports.last();
        let explicit_direction = header
            .as_ref()
            .and_then(|header| header.direction)
            .map(|direction| match direction {
                sv::PortDirection::Input(_) => Ok(PortDirection::Input),
                sv::PortDirection::Output(_) => Ok(PortDirection::Output),
                sv::PortDirection::Inout(_) => Ok(PortDirection::Inout),
                sv::PortDirection::Ref(_) => {
                    Err(PortParseError::UnsupportedPort {
                        module: module.to_string(),
                        port: port_name.to_string(),
                        reason: "`ref` ports are not supported".into(),
                    })
                }
            })
            .transpose()?;
        let Some(direction) = explicit_direction
            .or_else(|| previous.map(|previous| previous.direction))
        else {
            return Err(PortParseError::UnsupportedPort {
                module: module.to_string(),
                port: port_name.to_string(),
                reason: "port has no direction".into(),
            });
        };

        let (msb, lsb) = match (&header, previous) {
            (Some(header), _) => {
                packed_range(&ast, module, port_name, header.dimensions)?
            }
            (None, Some(previous)) => (previous.msb, previous.lsb),
            (None, None) => (0, 0),
        };

        if msb + 1 - lsb > 64 {
            return Err(PortParseError::UnsupportedPort {
                module: module.to_string(),
                port: port_name.to_string(),
                reason: format!(
                    "{} bits is wider than the supported 64",
                    msb + 1 - lsb
                ),
            });
        }

        ports.push(Port::new(port_name, msb, lsb, direction));
    }

    log::debug!(
        "Module `{}` in {} has {} ports",
        module,
        source_path,
        ports.len()
    );

    Ok(ports)
}
