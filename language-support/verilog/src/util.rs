// Copyright (C) 2024 Ethan Uppal.
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use sv_parser as sv;

/// Evaluates a packed-range bound. Only plain unsigned decimal literals are
/// supported; anything else is reported with a short reason.
pub fn evaluate_numeric_constant_expression(
    ast: &sv::SyntaxTree,
    expression: &sv::ConstantExpression,
) -> Result<usize, String> {
    let sv::ConstantExpression::ConstantPrimary(constant_primary) = expression
    else {
        return Err("only literal range bounds are supported".into());
    };
    let sv::ConstantPrimary::PrimaryLiteral(primary_literal) =
        &**constant_primary
    else {
        return Err("range bound is not a literal".into());
    };
    let sv::PrimaryLiteral::Number(number) = &**primary_literal else {
        return Err("range bound is not a number".into());
    };
    let sv::Number::IntegralNumber(integral_number) = &**number else {
        return Err("range bound is a real number".into());
    };
    let sv::IntegralNumber::DecimalNumber(decimal_number) = &**integral_number
    else {
        return Err("only decimal range bounds are supported".into());
    };
    let sv::DecimalNumber::UnsignedNumber(unsigned_number) = &**decimal_number
    else {
        return Err("sized decimal range bounds are not supported".into());
    };

    let text = ast
        .get_str_trim(&unsigned_number.nodes.0)
        .ok_or("range bound could not be traced back to source code")?;
    // SystemVerilog allows `_` as a digit separator
    text.replace('_', "")
        .parse()
        .map_err(|_| format!("range bound `{}` is out of range", text))
}
