use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// Probabilities, occupancy ratios and rates use this type so that every
/// frame is bit-identical across platforms.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only for loading and configuration.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::saturating_from_num(v)
}

/// Convert Fixed64 to f64. Use only for display and report export.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// `numerator / denominator` as a fixed-point ratio. Zero denominators yield
/// zero rather than a panic.
#[inline]
pub fn ratio(numerator: u64, denominator: u64) -> Fixed64 {
    if denominator == 0 {
        return Fixed64::ZERO;
    }
    Fixed64::saturating_from_num(numerator) / Fixed64::saturating_from_num(denominator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f64_round_trip() {
        let a = f64_to_fixed64(0.25);
        assert_eq!(fixed64_to_f64(a), 0.25);
    }

    #[test]
    fn ratio_of_half() {
        assert_eq!(ratio(5, 10), Fixed64::from_num(0.5));
    }

    #[test]
    fn ratio_with_zero_denominator_is_zero() {
        assert_eq!(ratio(3, 0), Fixed64::ZERO);
    }

    #[test]
    fn out_of_range_float_saturates() {
        assert_eq!(f64_to_fixed64(1e30), Fixed64::MAX);
    }
}
