//! Solidity ABI encoding of constructor arguments
//!
//! Arguments arrive as JSON (an array in declaration order, or an object keyed
//! by input name). Each value is coerced against the resolved input type and
//! the tuple is encoded so it can be appended to creation bytecode.

use crate::contract::CompiledContract;
use crate::error::{DeployError, Result};
use alloy_dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier};
use alloy_json_abi::{Constructor, Param, StateMutability};
use serde_json::Value;

fn invalid(msg: String) -> DeployError {
    DeployError::InvalidParams(msg)
}

/// Coerce a JSON value into a value of type `ty`.
///
/// Arrays and tuples are walked element by element; scalars go through the
/// string coercion, so integers may be JSON numbers, decimal or `0x` strings.
pub fn coerce(ty: &DynSolType, value: &Value) -> Result<DynSolValue> {
    match (ty, value) {
        (DynSolType::Array(inner), Value::Array(items)) => items
            .iter()
            .map(|item| coerce(inner, item))
            .collect::<Result<Vec<_>>>()
            .map(DynSolValue::Array),
        (DynSolType::FixedArray(inner, size), Value::Array(items)) => {
            if items.len() != *size {
                return Err(invalid(format!(
                    "{} expects {} elements, got {}",
                    ty,
                    size,
                    items.len()
                )));
            }
            items
                .iter()
                .map(|item| coerce(inner, item))
                .collect::<Result<Vec<_>>>()
                .map(DynSolValue::FixedArray)
        }
        (DynSolType::Tuple(types), Value::Array(items)) => {
            if items.len() != types.len() {
                return Err(invalid(format!(
                    "{} expects {} fields, got {}",
                    ty,
                    types.len(),
                    items.len()
                )));
            }
            types
                .iter()
                .zip(items)
                .map(|(ty, item)| coerce(ty, item))
                .collect::<Result<Vec<_>>>()
                .map(DynSolValue::Tuple)
        }
        (_, Value::String(s)) => coerce_text(ty, s),
        (_, Value::Number(n)) => coerce_text(ty, &n.to_string()),
        (_, Value::Bool(b)) => coerce_text(ty, &b.to_string()),
        (_, other) => Err(invalid(format!("cannot use {} as {}", other, ty))),
    }
}

fn coerce_text(ty: &DynSolType, text: &str) -> Result<DynSolValue> {
    ty.coerce_str(text)
        .map_err(|e| invalid(format!("'{}' is not a valid {}: {}", text, ty, e)))
}

/// Line up JSON params with the constructor inputs.
fn arrange(inputs: &[Param], params: &str) -> Result<Vec<Value>> {
    if params.trim().is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(params)? {
        Value::Array(values) => Ok(values),
        Value::Object(mut map) => {
            let args = inputs
                .iter()
                .map(|input| {
                    map.remove(&input.name)
                        .ok_or_else(|| invalid(format!("missing constructor param '{}'", input.name)))
                })
                .collect::<Result<Vec<_>>>()?;

            if let Some(extra) = map.keys().next() {
                return Err(invalid(format!("unknown constructor param '{}'", extra)));
            }
            Ok(args)
        }
        other => Err(invalid(format!(
            "params must be a JSON array or object, got {}",
            other
        ))),
    }
}

/// Encode `params` against the constructor inputs of `artifact`.
///
/// Blank `params` means no arguments.
pub fn encode_constructor_params(artifact: &CompiledContract, params: &str) -> Result<Vec<u8>> {
    let abi = artifact.json_abi()?;
    let constructor = abi.constructor().cloned().unwrap_or_else(|| Constructor {
        inputs: Vec::new(),
        state_mutability: StateMutability::NonPayable,
    });

    let args = arrange(&constructor.inputs, params)?;
    if args.len() != constructor.inputs.len() {
        return Err(invalid(format!(
            "constructor of {} expects {} params, got {}",
            artifact.name,
            constructor.inputs.len(),
            args.len()
        )));
    }

    let values = constructor
        .inputs
        .iter()
        .zip(&args)
        .map(|(input, arg)| {
            let ty = input
                .resolve()
                .map_err(|e| invalid(format!("constructor input {}: {}", input.name, e)))?;
            coerce(&ty, arg)
        })
        .collect::<Result<Vec<_>>>()?;

    if values.is_empty() {
        return Ok(Vec::new());
    }

    constructor
        .abi_encode_input(&values)
        .map_err(|e| invalid(format!("constructor of {}: {}", artifact.name, e)))
}
