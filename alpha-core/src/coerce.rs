//! Implicit conversions.
//!
//! Implicit conversions never lose information: same-signedness widening,
//! unsigned into a wider signed type, integers and narrower floats into
//! floats, integer literals into any integer type whose range holds the
//! value, and `null` into anything with a zero value.

use crate::error::{CoreError, CoreResult};
use crate::span::Span;
use crate::types::{Encoding, Type};

/// Which operand of a binary operation has to be converted to the other's
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
    Neither,
}

pub fn can_coerce(src: &Type, dst: &Type) -> bool {
    use Encoding::*;

    if src == dst {
        return true;
    }
    if let Some(value) = src.literal() {
        if dst.is_integer() {
            return dst.fits(value);
        }
    }
    match (src.encoding(), dst.encoding()) {
        (SInt, SInt) | (UInt, UInt) | (Float, Float) => src.size() <= dst.size(),
        (UInt, SInt) => src.size() < dst.size(),
        (SInt | UInt, Float) => true,
        (Null, SInt | UInt | Bool | Pointer | Array | Object) => true,
        _ => false,
    }
}

/// Check that `src` converts implicitly to `dst`.
pub fn check_coerce(src: &Type, dst: &Type, span: Span) -> CoreResult<()> {
    if can_coerce(src, dst) {
        return Ok(());
    }
    if src.literal().is_some() && dst.is_integer() {
        return Err(CoreError::type_error(
            "integer literal outside range for type",
            span,
        ));
    }
    Err(CoreError::type_error(
        format!("invalid implicit cast: {} to {}", src.non_literal(), dst),
        span,
    ))
}

/// Decide which side of an arithmetic or comparison operator is converted.
///
/// Literals go first: an integer literal that fits the other operand's
/// type takes that type. Otherwise the operand of higher rank wins and the
/// other one is converted up; if that is not an implicit conversion (for
/// example `i32` against `u8`) the winner is converted down to the loser's
/// type instead when that is lossless.
pub fn arith_coerce(lhs: &Type, rhs: &Type, span: Span) -> CoreResult<Side> {
    if lhs == rhs {
        return Ok(Side::Neither);
    }
    match (lhs.literal(), rhs.literal()) {
        (Some(_), None) if can_coerce(lhs, rhs) => return Ok(Side::Left),
        (None, Some(_)) if can_coerce(rhs, lhs) => return Ok(Side::Right),
        _ => {}
    }
    let (Some(lrank), Some(rrank)) = (lhs.rank(), rhs.rank()) else {
        return Err(CoreError::type_error(
            format!(
                "invalid implicit cast: {} to {}",
                rhs.non_literal(),
                lhs.non_literal()
            ),
            span,
        ));
    };
    let (winner, loser, cast_loser, cast_winner) = if lrank > rrank {
        (lhs, rhs, Side::Right, Side::Left)
    } else {
        (rhs, lhs, Side::Left, Side::Right)
    };
    if can_coerce(loser, winner) {
        Ok(cast_loser)
    } else if can_coerce(winner, loser) {
        Ok(cast_winner)
    } else {
        check_coerce(loser, winner, span).map(|()| cast_loser)
    }
}

/// Type of a binary operation after [`arith_coerce`] picked `side`.
pub fn coerce_result_type(lhs: &Type, rhs: &Type, side: Side) -> Type {
    match side {
        Side::Left => rhs.normalised(),
        Side::Right | Side::Neither => lhs.normalised(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::span::FileId;
    use num_bigint::BigInt;

    fn span() -> Span {
        Span::new(FileId(0), 0, 0)
    }

    fn lit(v: i64) -> Type {
        Type::int_literal(BigInt::from(v)).unwrap()
    }

    #[test]
    fn widening_only() {
        assert!(can_coerce(&Type::sint(1), &Type::sint(8)));
        assert!(!can_coerce(&Type::sint(8), &Type::sint(1)));
        assert!(can_coerce(&Type::uint(1), &Type::sint(4)));
        assert!(!can_coerce(&Type::uint(4), &Type::sint(4)));
        assert!(!can_coerce(&Type::sint(1), &Type::uint(8)));
        assert!(can_coerce(&Type::float(4), &Type::float(8)));
        assert!(!can_coerce(&Type::float(8), &Type::float(4)));
    }

    #[test]
    fn literals_fit_or_fail() {
        let u8 = Type::uint(1);
        assert!(check_coerce(&lit(200), &u8, span()).is_ok());
        assert!(check_coerce(&lit(255), &u8, span()).is_ok());
        for bad in [256, -1] {
            let err = check_coerce(&lit(bad), &u8, span()).unwrap_err();
            assert_eq!(err.message(), "integer literal outside range for type");
        }
    }

    #[test]
    fn null_goes_anywhere_with_a_zero() {
        let cfg = Config::default();
        assert!(can_coerce(&Type::null(), &Type::int().pointer(&cfg)));
        assert!(can_coerce(&Type::null(), &Type::bool()));
        assert!(!can_coerce(&Type::null(), &Type::float(8)));
        let err = check_coerce(&Type::float(8), &Type::int(), span()).unwrap_err();
        assert_eq!(err.message(), "invalid implicit cast: double to i32");
    }

    #[test]
    fn rank_promotion() {
        let (i32_, u8_) = (Type::int(), Type::uint(1));
        let side = arith_coerce(&i32_, &u8_, span()).unwrap();
        assert_eq!(side, Side::Right);
        assert_eq!(coerce_result_type(&i32_, &u8_, side), Type::int());

        let (f32_, f64_) = (Type::float(4), Type::float(8));
        let side = arith_coerce(&f32_, &f64_, span()).unwrap();
        assert_eq!(side, Side::Left);
        assert_eq!(coerce_result_type(&f32_, &f64_, side), Type::float(8));

        let side = arith_coerce(&Type::sint(8), &Type::uint(8), span());
        assert!(side.is_err());
    }

    #[test]
    fn literal_side_takes_the_other_type() {
        let u8_ = Type::uint(1);
        let side = arith_coerce(&u8_, &lit(1), span()).unwrap();
        assert_eq!(side, Side::Right);
        assert_eq!(coerce_result_type(&u8_, &lit(1), side), u8_);

        let side = arith_coerce(&u8_, &lit(1000), span()).unwrap();
        assert_eq!(side, Side::Left);
        assert_eq!(coerce_result_type(&u8_, &lit(1000), side), Type::int());
    }
}
