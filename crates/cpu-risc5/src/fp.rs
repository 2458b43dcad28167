//! Floating-point arithmetic of the RISC5 FPU.
//!
//! These routines reproduce the FPGA floating-point units (FPAdder,
//! FPMultiplier, FPDivider, Divider) bit-for-bit. The intermediate steps are
//! not negotiable: the adder works in a private 25-bit-mantissa format with
//! +1 rounding, and several outputs differ from IEEE-754 round-to-nearest in
//! the last bit. Oberon binaries depend on the exact patterns.
//!
//! See *Project Oberon*, section 16.3 "Floating-point arithmetic".

/// Floating-point addition, with the adder's two side doors.
///
/// `u` and `v` come straight from the instruction word:
/// - `u == false, v == false`: ordinary FP addition.
/// - `u == true, v == false`: FLT — `x` is treated as a sign-extended 24-bit
///   integer with fixed exponent 150, so adding a same-exponent zero mantissa
///   converts it to float.
/// - `v == true`: FLR — the aligned sum is truncated to a signed integer.
#[must_use]
pub fn add(x: u32, y: u32, u: bool, v: bool) -> u32 {
    let xs = (x & 0x8000_0000) != 0;
    let xe: u32;
    let x0: i32;
    if u {
        xe = 150;
        x0 = (((x & 0x00FF_FFFF) as i32) << 8) >> 7;
    } else {
        xe = (x >> 23) & 0xFF;
        let xm = ((x & 0x7F_FFFF) << 1) | 0x100_0000;
        x0 = if xs { -(xm as i32) } else { xm as i32 };
    }

    let ys = (y & 0x8000_0000) != 0;
    let ye = (y >> 23) & 0xFF;
    let mut ym = (y & 0x7F_FFFF) << 1;
    if !u && !v {
        ym |= 0x100_0000;
    }
    let y0: i32 = if ys { -(ym as i32) } else { ym as i32 };

    // Align the smaller exponent; the shift saturates at 31.
    let e0: u32;
    let x3: i32;
    let y3: i32;
    if ye > xe {
        let shift = ye - xe;
        e0 = ye;
        x3 = x0 >> shift.min(31);
        y3 = y0;
    } else {
        let shift = xe - ye;
        e0 = xe;
        x3 = x0;
        y3 = y0 >> shift.min(31);
    }

    let xs = u32::from(xs);
    let ys = u32::from(ys);
    let sum = ((xs << 26) | (xs << 25) | ((x3 as u32) & 0x01FF_FFFF))
        .wrapping_add((ys << 26) | (ys << 25) | ((y3 as u32) & 0x01FF_FFFF));

    let mut s = if (sum & (1 << 26)) != 0 {
        sum.wrapping_neg()
    } else {
        sum
    };
    s = s.wrapping_add(1) & 0x07FF_FFFF;

    let mut e1 = e0 + 1;
    let mut t3 = s >> 1;
    if (s & 0x3FF_FFFC) != 0 {
        while (t3 & (1 << 24)) == 0 {
            t3 <<= 1;
            e1 = e1.wrapping_sub(1);
        }
    } else {
        t3 <<= 24;
        e1 = e1.wrapping_sub(24);
    }

    let xn = (x & 0x7FFF_FFFF) == 0;
    let yn = (y & 0x7FFF_FFFF) == 0;

    if v {
        (((sum << 5) as i32) >> 6) as u32
    } else if xn {
        if u || yn {
            0
        } else {
            y
        }
    } else if yn {
        x
    } else if (t3 & 0x01FF_FFFF) == 0 || (e1 & 0x100) != 0 {
        0
    } else {
        ((sum & 0x0400_0000) << 5) | (e1 << 23) | ((t3 >> 1) & 0x7F_FFFF)
    }
}

/// Floating-point subtraction: addition with the sign of `y` flipped.
#[must_use]
pub fn sub(x: u32, y: u32, u: bool, v: bool) -> u32 {
    add(x, y ^ 0x8000_0000, u, v)
}

/// Floating-point multiplication.
#[must_use]
pub fn mul(x: u32, y: u32) -> u32 {
    let sign = (x ^ y) & 0x8000_0000;
    let xe = (x >> 23) & 0xFF;
    let ye = (y >> 23) & 0xFF;

    let xm = (x & 0x7F_FFFF) | 0x80_0000;
    let ym = (y & 0x7F_FFFF) | 0x80_0000;
    let m = u64::from(xm) * u64::from(ym);

    let mut e1 = (xe + ye).wrapping_sub(127);
    let z0: u32;
    if (m & (1 << 47)) != 0 {
        e1 = e1.wrapping_add(1);
        z0 = (((m >> 23) + 1) & 0xFF_FFFF) as u32;
    } else {
        z0 = (((m >> 22) + 1) & 0xFF_FFFF) as u32;
    }

    if xe == 0 || ye == 0 {
        0
    } else if (e1 & 0x100) == 0 {
        sign | ((e1 & 0xFF) << 23) | (z0 >> 1)
    } else if (e1 & 0x80) == 0 {
        // Exponent overflow saturates to the largest magnitude.
        sign | (0xFF << 23) | (z0 >> 1)
    } else {
        0
    }
}

/// Floating-point division.
#[must_use]
pub fn div(x: u32, y: u32) -> u32 {
    let sign = (x ^ y) & 0x8000_0000;
    let xe = (x >> 23) & 0xFF;
    let ye = (y >> 23) & 0xFF;

    let xm = (x & 0x7F_FFFF) | 0x80_0000;
    let ym = (y & 0x7F_FFFF) | 0x80_0000;
    let q1 = ((u64::from(xm) << 25) / u64::from(ym)) as u32;

    let mut e1 = xe.wrapping_sub(ye).wrapping_add(126);
    let q2: u32;
    if (q1 & (1 << 25)) != 0 {
        e1 = e1.wrapping_add(1);
        q2 = (q1 >> 1) & 0xFF_FFFF;
    } else {
        q2 = q1 & 0xFF_FFFF;
    }
    let q3 = q2 + 1;

    if xe == 0 {
        0
    } else if ye == 0 {
        sign | (0xFF << 23)
    } else if (e1 & 0x100) == 0 {
        sign | ((e1 & 0xFF) << 23) | (q3 >> 1)
    } else if (e1 & 0x80) == 0 {
        sign | (0xFF << 23) | (q2 >> 1)
    } else {
        0
    }
}

/// Quotient and remainder of [`idiv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdivResult {
    pub quot: u32,
    pub rem: u32,
}

/// Integer division as performed by the hardware's 32-step restoring divider.
///
/// For a signed negative dividend the quotient is corrected so the remainder
/// is non-negative (truncation toward minus infinity). This also defines the
/// machine's behavior for division by zero and by negative divisors, which is
/// why the CPU must not shortcut it with native division.
#[must_use]
pub fn idiv(x: u32, y: u32, signed_div: bool) -> IdivResult {
    let sign = (x as i32) < 0 && signed_div;
    let x0 = if sign { x.wrapping_neg() } else { x };

    let mut rq = u64::from(x0);
    for _ in 0..32 {
        let w0 = (rq >> 31) as u32;
        let w1 = w0.wrapping_sub(y);
        if (w1 as i32) < 0 {
            rq = (u64::from(w0) << 32) | ((rq & 0x7FFF_FFFF) << 1);
        } else {
            rq = (u64::from(w1) << 32) | ((rq & 0x7FFF_FFFF) << 1) | 1;
        }
    }

    let mut d = IdivResult {
        quot: rq as u32,
        rem: (rq >> 32) as u32,
    };
    if sign {
        d.quot = d.quot.wrapping_neg();
        if d.rem > 0 {
            d.quot = d.quot.wrapping_sub(1);
            d.rem = y.wrapping_sub(d.rem);
        }
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    // IEEE bit patterns used below:
    //   1.0 = 0x3F800000   2.0 = 0x40000000   2.5 = 0x40200000
    //   3.0 = 0x40400000   5.0 = 0x40A00000   6.0 = 0x40C00000
    // 0x4B000000 is the adder's integer-conversion partner: exponent 150,
    // zero mantissa.

    const FLT_BIAS: u32 = 0x4B00_0000;

    #[test]
    fn add_exact() {
        assert_eq!(add(0x3F80_0000, 0x3F80_0000, false, false), 0x4000_0000); // 1+1=2
        assert_eq!(add(0x4000_0000, 0x4040_0000, false, false), 0x40A0_0000); // 2+3=5
    }

    #[test]
    fn add_zero_operands() {
        assert_eq!(add(0, 0x4040_0000, false, false), 0x4040_0000);
        assert_eq!(add(0x4040_0000, 0, false, false), 0x4040_0000);
        assert_eq!(add(0, 0, false, false), 0);
        // Negative zero counts as zero too.
        assert_eq!(add(0x8000_0000, 0x3F80_0000, false, false), 0x3F80_0000);
    }

    #[test]
    fn sub_cancellation() {
        assert_eq!(sub(0x4040_0000, 0x4040_0000, false, false), 0); // 3-3=0
        assert_eq!(sub(0x40A0_0000, 0x4000_0000, false, false), 0x4040_0000); // 5-2=3
    }

    #[test]
    fn flt_converts_integers() {
        assert_eq!(add(5, FLT_BIAS, true, false), 0x40A0_0000);
        assert_eq!(add(1, FLT_BIAS, true, false), 0x3F80_0000);
        assert_eq!(add(5u32.wrapping_neg(), FLT_BIAS, true, false), 0xC0A0_0000);
    }

    #[test]
    fn flr_floors() {
        assert_eq!(add(0x40A0_0000, FLT_BIAS, false, true), 5);
        assert_eq!(add(0x4020_0000, FLT_BIAS, false, true), 2); // floor(2.5)
        // floor(-2.5) = -3
        assert_eq!(add(0xC020_0000, FLT_BIAS, false, true), 3u32.wrapping_neg());
    }

    #[test]
    fn mul_exact() {
        assert_eq!(mul(0x4000_0000, 0x4040_0000), 0x40C0_0000); // 2*3=6
        assert_eq!(mul(0x3FC0_0000, 0x3FC0_0000), 0x4010_0000); // 1.5*1.5=2.25
        assert_eq!(mul(0xC000_0000, 0x4040_0000), 0xC0C0_0000); // -2*3=-6
    }

    #[test]
    fn mul_zero_exponent_flushes() {
        assert_eq!(mul(0, 0x4040_0000), 0);
        assert_eq!(mul(0x4040_0000, 0), 0);
    }

    #[test]
    fn mul_overflow_saturates() {
        // Exponents 200+200: e1 = 273 = 0x111, bit 8 set, bit 7 clear, so the
        // result saturates to the maximum exponent instead of flushing to 0.
        let huge = 200u32 << 23;
        assert_eq!(mul(huge, huge), 0x7F80_0000);
    }

    #[test]
    fn div_exact() {
        assert_eq!(div(0x3F80_0000, 0x4000_0000), 0x3F00_0000); // 1/2=0.5
        assert_eq!(div(0x40C0_0000, 0x4000_0000), 0x4040_0000); // 6/2=3
    }

    #[test]
    fn div_by_zero_exponent_saturates() {
        assert_eq!(div(0x3F80_0000, 0), 0x7F80_0000);
        assert_eq!(div(0, 0x3F80_0000), 0);
    }

    #[test]
    fn idiv_unsigned() {
        assert_eq!(idiv(17, 5, false), IdivResult { quot: 3, rem: 2 });
        assert_eq!(idiv(0, 5, false), IdivResult { quot: 0, rem: 0 });
        assert_eq!(
            idiv(0xFFFF_FFFF, 1, false),
            IdivResult {
                quot: 0xFFFF_FFFF,
                rem: 0
            }
        );
    }

    #[test]
    fn idiv_signed_negative_dividend() {
        // -17 div 5 = -4 rem 3 (remainder stays non-negative).
        let d = idiv(17u32.wrapping_neg(), 5, true);
        assert_eq!(d.quot, 4u32.wrapping_neg());
        assert_eq!(d.rem, 3);

        // Exact division needs no correction: -15 div 5 = -3 rem 0.
        let d = idiv(15u32.wrapping_neg(), 5, true);
        assert_eq!(d.quot, 3u32.wrapping_neg());
        assert_eq!(d.rem, 0);
    }

    #[test]
    fn idiv_quotient_law() {
        // quot * y + rem == x and 0 <= rem < y for a spread of operands.
        let xs = [0u32, 1, 2, 17, 100, 0x7FFF_FFFF, 0x8000_0000, 0xFFFF_FFFF];
        let ys = [1u32, 2, 3, 5, 7, 255, 0x10000, 0x7FFF_FFFF];
        for &x in &xs {
            for &y in &ys {
                let d = idiv(x, y, false);
                assert_eq!(
                    d.quot.wrapping_mul(y).wrapping_add(d.rem),
                    x,
                    "x={x:#x} y={y:#x}"
                );
                assert!(d.rem < y, "x={x:#x} y={y:#x} rem={:#x}", d.rem);
            }
        }
    }

    #[test]
    fn idiv_signed_law() {
        // For signed division: x = quot*y + rem with 0 <= rem < y.
        let xs = [-1i32, -2, -17, -100, -0x7FFF_FFFF, 1, 17];
        let ys = [1u32, 2, 3, 5, 255];
        for &x in &xs {
            for &y in &ys {
                let d = idiv(x as u32, y, true);
                let recomposed = (d.quot as i32)
                    .wrapping_mul(y as i32)
                    .wrapping_add(d.rem as i32);
                assert_eq!(recomposed, x, "x={x} y={y}");
                assert!(d.rem < y, "x={x} y={y} rem={}", d.rem);
            }
        }
    }
}
