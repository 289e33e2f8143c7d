//! DAP variable-reference encoding.
//!
//! DAP hands opaque non-negative integers to the editor to identify
//! expandable values; this bridge packs the full address of a watch node into
//! one:
//!
//! ```text
//! bit 31    reserved, always 0
//! bit 30    user watch
//! bit 29    global watch (exclusive with bit 30; neither set = local)
//! bits 28-22  frame index (0..=127)
//! bits 21-0   watch index + 1 (0 is DAP's "no children" sentinel)
//! ```

use thiserror::Error;

use uscript_wire::WatchKind;

pub const MAX_FRAME_INDEX: usize = 0x7F;
pub const MAX_VARIABLE_INDEX: usize = (1 << 22) - 2;

const USER_BIT: u32 = 1 << 30;
const GLOBAL_BIT: u32 = 1 << 29;
const FRAME_SHIFT: u32 = 22;
const FRAME_MASK: u32 = 0x7F;
const VARIABLE_MASK: u32 = (1 << 22) - 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VarRefError {
    #[error("frame index {0} exceeds the encodable range")]
    FrameOutOfRange(usize),

    #[error("variable index {0} exceeds the encodable range")]
    VariableOutOfRange(usize),

    #[error("invalid variables reference {0}")]
    InvalidReference(i64),
}

pub fn encode(frame: usize, variable: usize, kind: WatchKind) -> Result<u32, VarRefError> {
    if frame > MAX_FRAME_INDEX {
        return Err(VarRefError::FrameOutOfRange(frame));
    }
    if variable > MAX_VARIABLE_INDEX {
        return Err(VarRefError::VariableOutOfRange(variable));
    }

    let kind_bits = match kind {
        WatchKind::Local => 0,
        WatchKind::Global => GLOBAL_BIT,
        WatchKind::User => USER_BIT,
    };

    Ok(kind_bits | ((frame as u32) << FRAME_SHIFT) | (variable as u32 + 1))
}

pub fn decode(reference: i64) -> Result<(usize, usize, WatchKind), VarRefError> {
    let raw = u32::try_from(reference).map_err(|_| VarRefError::InvalidReference(reference))?;
    if raw & (1 << 31) != 0 {
        return Err(VarRefError::InvalidReference(reference));
    }
    let kind = match (raw & USER_BIT != 0, raw & GLOBAL_BIT != 0) {
        (true, true) => return Err(VarRefError::InvalidReference(reference)),
        (true, false) => WatchKind::User,
        (false, true) => WatchKind::Global,
        (false, false) => WatchKind::Local,
    };

    let variable_bits = raw & VARIABLE_MASK;
    if variable_bits == 0 {
        // 0 in the low bits would mean "no children"; such a reference is
        // never handed out.
        return Err(VarRefError::InvalidReference(reference));
    }

    let frame = ((raw >> FRAME_SHIFT) & FRAME_MASK) as usize;
    Ok((frame, (variable_bits - 1) as usize, kind))
}
