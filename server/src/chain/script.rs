//! Script helpers for the data pushes the oracle reads and writes.

use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::opcodes::OP_FALSE;
use bitcoin::script::{Builder, Instruction, PushBytes, PushBytesError, Script, ScriptBuf};

/// The data pushes of a push-only script, or `None` if it holds any other
/// opcode or a push runs past the end.
pub fn pushes(script: &Script) -> Option<Vec<&[u8]>> {
    script
        .instructions()
        .map(|instruction| match instruction.ok()? {
            Instruction::PushBytes(data) => Some(data.as_bytes()),
            Instruction::Op(_) => None,
        })
        .collect()
}

/// The pushes following `[OP_FALSE] OP_RETURN`, or `None` for any other
/// script.
pub fn op_return_pushes(script: &Script) -> Option<Vec<&[u8]>> {
    let mut instructions = script.instructions().peekable();
    let leading_false = matches!(
        instructions.peek(),
        Some(Ok(Instruction::PushBytes(data))) if data.is_empty()
    );
    if leading_false {
        instructions.next();
    }
    match instructions.next()? {
        Ok(Instruction::Op(op)) if op == OP_RETURN => {}
        _ => return None,
    }

    instructions
        .map(|instruction| match instruction.ok()? {
            Instruction::PushBytes(data) => Some(data.as_bytes()),
            Instruction::Op(_) => None,
        })
        .collect()
}

/// A script made of a minimal push of each item.
pub fn push_only(items: &[&[u8]]) -> Result<ScriptBuf, PushBytesError> {
    push_all(Builder::new(), items)
}

/// `OP_FALSE OP_RETURN` followed by a push of each item.
pub fn op_return(items: &[&[u8]]) -> Result<ScriptBuf, PushBytesError> {
    push_all(
        Builder::new().push_opcode(OP_FALSE).push_opcode(OP_RETURN),
        items,
    )
}

fn push_all(mut builder: Builder, items: &[&[u8]]) -> Result<ScriptBuf, PushBytesError> {
    for item in items {
        builder = builder.push_slice(<&PushBytes>::try_from(*item)?);
    }
    Ok(builder.into_script())
}
