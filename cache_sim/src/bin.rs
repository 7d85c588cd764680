/// mask with the lower `bits` bits set.
#[inline]
pub const fn bit_range_lower(bits: u32) -> u32 {
    if bits >= u32::BITS {
        u32::MAX
    } else {
        (1u32 << bits).wrapping_sub(1)
    }
}

/// clears the lower `bits` bits of `bin`.
#[inline]
pub const fn mask_upper(bin: u32, bits: u32) -> u32 {
    bin & !bit_range_lower(bits)
}

/// drops the lower `bits` bits of `bin`, shifting the rest down.
#[inline]
pub const fn extract_upper(bin: u32, bits: u32) -> u32 {
    if bits >= u32::BITS {
        0
    } else {
        mask_upper(bin, bits) >> bits
    }
}

/// `Some(n)` when `v == 2^n`.
#[inline]
pub const fn exact_log2(v: u32) -> Option<u32> {
    if v.is_power_of_two() {
        Some(v.trailing_zeros())
    } else {
        None
    }
}
