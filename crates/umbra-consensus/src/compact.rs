//! Compact difficulty target encoding.
//!
//! A compact target packs a 256-bit threshold into 32 bits: one exponent
//! byte (the size of the big-endian value in bytes) followed by a 3-byte
//! mantissa. The encoding is bit-exact per the Bitcoin consensus rules,
//! including the sign bit quirk: a mantissa with its high bit set is
//! shifted down one byte and the exponent bumped.

use crate::{ConsensusError, ConsensusResult};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

/// Decode a compact target into its 256-bit big-integer form.
///
/// Returns an error for negative encodings (sign bit set with a non-zero
/// mantissa) and for values that overflow 256 bits.
pub fn compact_to_target(bits: u32) -> ConsensusResult<BigUint> {
    let exponent = (bits >> 24) as usize;
    let mantissa = bits & 0x007f_ffff;

    if bits & 0x0080_0000 != 0 && mantissa != 0 {
        return Err(ConsensusError::InvalidCompact(bits));
    }

    let overflow = mantissa != 0
        && (exponent > 34
            || (mantissa > 0xff && exponent > 33)
            || (mantissa > 0xffff && exponent > 32));
    if overflow {
        return Err(ConsensusError::InvalidCompact(bits));
    }

    let target = if exponent <= 3 {
        BigUint::from(mantissa >> (8 * (3 - exponent)))
    } else {
        BigUint::from(mantissa) << (8 * (exponent - 3))
    };

    Ok(target)
}

/// Encode a 256-bit target in compact form.
///
/// Lossy for values with more than 24 significant bits: only the top three
/// bytes of the value survive. Encoding then decoding such a value yields
/// the truncated threshold the consensus rules actually compare against.
pub fn target_to_compact(target: &BigUint) -> u32 {
    if target.is_zero() {
        return 0;
    }

    let mut size = ((target.bits() + 7) / 8) as usize;
    let mut compact = if size <= 3 {
        target.to_u32().unwrap_or(0) << (8 * (3 - size))
    } else {
        (target >> (8 * (size - 3))).to_u32().unwrap_or(0)
    };

    // The mantissa sign bit must stay clear; borrow a byte from the exponent.
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | ((size as u32) << 24)
}
