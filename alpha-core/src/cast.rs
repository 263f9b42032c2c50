//! Cast legality and cast plans.
//!
//! [`CastPlan::check`] decides whether an explicit `x as T` is allowed and
//! how it is carried out. [`CastPlan::implicit`] builds the plan for a
//! coercion that [`crate::coerce`] has already approved. Lowering a plan is
//! infallible.

use num_bigint::BigInt;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::span::Span;
use crate::types::{Encoding, Type};

/// LLVM conversion instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvOp {
    Sext,
    Zext,
    Trunc,
    SiToFp,
    UiToFp,
    FpToSi,
    FpToUi,
    FpExt,
    FpTrunc,
    Bitcast,
    PtrToInt,
    IntToPtr,
}

impl ConvOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ConvOp::Sext => "sext",
            ConvOp::Zext => "zext",
            ConvOp::Trunc => "trunc",
            ConvOp::SiToFp => "sitofp",
            ConvOp::UiToFp => "uitofp",
            ConvOp::FpToSi => "fptosi",
            ConvOp::FpToUi => "fptoui",
            ConvOp::FpExt => "fpext",
            ConvOp::FpTrunc => "fptrunc",
            ConvOp::Bitcast => "bitcast",
            ConvOp::PtrToInt => "ptrtoint",
            ConvOp::IntToPtr => "inttoptr",
        }
    }
}

/// How a value of one type becomes a value of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastPlan {
    /// Same type; the value is reused.
    Identity,
    /// Same bits, different signedness.
    Reinterpret,
    /// An integer literal given a new integer type; the constant is reused.
    Literal,
    Convert(ConvOp),
    /// `x == 0 ? 0 : -1` on the bool byte.
    IntToBool,
    /// Sign-extend the bool byte when the destination is wider.
    BoolToInt { extend: bool },
    /// `ptrtoint`, compare with zero, select `0`/`-1`.
    PtrToBool,
    /// The destination type's zero or null value.
    NullToZero,
}

impl CastPlan {
    /// Check an explicit cast from `src` to `dst`.
    ///
    /// `literal` is the value of `src` when it is an unresolved integer
    /// literal; such casts are validated against the destination range
    /// instead of the usual matrix.
    pub fn check(src: &Type, dst: &Type, cfg: &Config, span: Span) -> CoreResult<CastPlan> {
        use Encoding::*;

        let (se, de) = (src.encoding(), dst.encoding());
        let ptr_bytes = cfg.pointer_bytes();

        if let Some(value) = src.literal() {
            if dst.is_integer() {
                return literal_into(value, dst, span).map(|()| CastPlan::Literal);
            }
        }

        let plan = match (se, de) {
            _ if src == dst => CastPlan::Identity,
            (SInt, UInt) | (UInt, SInt) if src.size() != dst.size() => {
                return Err(CoreError::type_error(
                    "cannot cast integer in both sign and width;\n\
                     sign and width casts are not commutative",
                    span,
                ));
            }
            (SInt, UInt) | (UInt, SInt) => CastPlan::Reinterpret,
            (SInt, SInt) if src.size() < dst.size() => CastPlan::Convert(ConvOp::Sext),
            (UInt, UInt) if src.size() < dst.size() => CastPlan::Convert(ConvOp::Zext),
            (SInt, SInt) | (UInt, UInt) => CastPlan::Convert(ConvOp::Trunc),
            (SInt | UInt, Bool) => CastPlan::IntToBool,
            (Bool, SInt | UInt) => CastPlan::BoolToInt {
                extend: dst.size() > src.size(),
            },
            (SInt, Float) => CastPlan::Convert(ConvOp::SiToFp),
            (UInt, Float) => CastPlan::Convert(ConvOp::UiToFp),
            (Float, SInt) => CastPlan::Convert(ConvOp::FpToSi),
            (Float, UInt) => CastPlan::Convert(ConvOp::FpToUi),
            (Float, Float) if src.size() < dst.size() => CastPlan::Convert(ConvOp::FpExt),
            (Float, Float) => CastPlan::Convert(ConvOp::FpTrunc),
            (Pointer, Pointer) => CastPlan::Convert(ConvOp::Bitcast),
            (Pointer, Bool) => CastPlan::PtrToBool,
            (Pointer, UInt) if dst.size() >= ptr_bytes => CastPlan::Convert(ConvOp::PtrToInt),
            (UInt, Pointer) if src.size() >= ptr_bytes => CastPlan::Convert(ConvOp::IntToPtr),
            (UInt, Pointer) => return Err(invalid("invalid cast: narrow integer to pointer", span)),
            (SInt, Pointer) => return Err(invalid("invalid cast: signed integer to pointer", span)),
            (Pointer, UInt) => return Err(invalid("invalid cast: pointer to narrow integer", span)),
            (Pointer, SInt) => return Err(invalid("invalid cast: pointer to signed integer", span)),
            (Array, Pointer | Bool) => {
                return Err(CoreError::type_error(
                    format!("unimplemented: cast from {src} to {dst}"),
                    span,
                ));
            }
            (Null, SInt | UInt | Bool | Pointer | Array | Object) => CastPlan::NullToZero,
            _ => {
                return Err(CoreError::type_error(
                    format!("invalid cast: {src} to {dst}"),
                    span,
                ));
            }
        };
        Ok(plan)
    }

    /// Plan for an implicit coercion already accepted by
    /// [`crate::coerce::can_coerce`].
    ///
    /// # Panics
    ///
    /// Panics when the pair is not a legal coercion.
    pub fn implicit(src: &Type, dst: &Type) -> CastPlan {
        use Encoding::*;

        if src.literal().is_some() && dst.is_integer() {
            return CastPlan::Literal;
        }
        match (src.encoding(), dst.encoding()) {
            _ if src == dst => CastPlan::Identity,
            (SInt, SInt) => CastPlan::Convert(ConvOp::Sext),
            (UInt, UInt) | (UInt, SInt) => CastPlan::Convert(ConvOp::Zext),
            (SInt, Float) => CastPlan::Convert(ConvOp::SiToFp),
            (UInt, Float) => CastPlan::Convert(ConvOp::UiToFp),
            (Float, Float) => CastPlan::Convert(ConvOp::FpExt),
            (Null, _) => CastPlan::NullToZero,
            _ => panic!("no implicit conversion from {src} to {dst}"),
        }
    }

    pub fn is_identity(self) -> bool {
        matches!(self, CastPlan::Identity | CastPlan::Literal)
    }
}

fn invalid(message: &str, span: Span) -> CoreError {
    CoreError::type_error(message, span)
}

/// Range check for an integer literal landing in an integer type.
pub fn literal_into(value: &BigInt, dst: &Type, span: Span) -> CoreResult<()> {
    if dst.fits(value) {
        Ok(())
    } else {
        Err(CoreError::type_error(
            "integer literal outside range for type",
            span,
        ))
    }
}

/// Re-encode a raw double constant (`0x` + 16 hex digits) as the nearest
/// `float`, still written as double bits the way LLVM expects float
/// constants. Returns `None` if `text` is not such a constant.
pub fn fold_double_to_float(text: &str) -> Option<String> {
    let hex = text.strip_prefix("0x")?;
    if hex.len() != 16 {
        return None;
    }
    let bits = u64::from_str_radix(hex, 16).ok()?;
    let narrowed = f64::from_bits(bits) as f32;
    Some(format!("0x{:016X}", f64::from(narrowed).to_bits()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    fn span() -> Span {
        Span::new(FileId(0), 0, 0)
    }

    fn check(src: &Type, dst: &Type) -> CoreResult<CastPlan> {
        CastPlan::check(src, dst, &Config::default(), span())
    }

    #[test]
    fn sign_and_width_in_one_step_is_rejected() {
        let err = check(&Type::sint(1), &Type::uint(8)).unwrap_err();
        assert!(err.message().contains("not commutative"), "{err}");

        let widen = check(&Type::sint(1), &Type::sint(8)).expect("widen");
        assert_eq!(widen, CastPlan::Convert(ConvOp::Sext));
        let sign = check(&Type::sint(8), &Type::uint(8)).expect("sign");
        assert_eq!(sign, CastPlan::Reinterpret);
    }

    #[test]
    fn integer_widths() {
        assert_eq!(
            check(&Type::uint(1), &Type::uint(4)).unwrap(),
            CastPlan::Convert(ConvOp::Zext)
        );
        assert_eq!(
            check(&Type::sint(8), &Type::sint(2)).unwrap(),
            CastPlan::Convert(ConvOp::Trunc)
        );
        assert_eq!(check(&Type::int(), &Type::int().const_()).unwrap(), CastPlan::Identity);
    }

    #[test]
    fn literals_are_range_checked() {
        let u8 = Type::uint(1);
        for ok in [0, 200, 255] {
            let lit = Type::int_literal(BigInt::from(ok)).unwrap();
            assert_eq!(check(&lit, &u8).unwrap(), CastPlan::Literal);
        }
        for bad in [256, -1] {
            let lit = Type::int_literal(BigInt::from(bad)).unwrap();
            let err = check(&lit, &u8).unwrap_err();
            assert_eq!(err.message(), "integer literal outside range for type");
        }
    }

    #[test]
    fn pointer_integer_casts_need_wide_unsigned() {
        let cfg = Config::default();
        let ptr = Type::int().pointer(&cfg);
        assert_eq!(
            check(&ptr, &Type::uint(8)).unwrap(),
            CastPlan::Convert(ConvOp::PtrToInt)
        );
        assert_eq!(
            check(&ptr, &Type::uint(4)).unwrap_err().message(),
            "invalid cast: pointer to narrow integer"
        );
        assert_eq!(
            check(&ptr, &Type::sint(8)).unwrap_err().message(),
            "invalid cast: pointer to signed integer"
        );
        assert_eq!(
            check(&Type::uint(2), &ptr).unwrap_err().message(),
            "invalid cast: narrow integer to pointer"
        );
        assert_eq!(
            check(&Type::sint(8), &ptr).unwrap_err().message(),
            "invalid cast: signed integer to pointer"
        );

        let narrow = CastPlan::check(&ptr, &Type::uint(4), &cfg.with_pointer_bits(32), span());
        assert_eq!(narrow.unwrap(), CastPlan::Convert(ConvOp::PtrToInt));
    }

    #[test]
    fn bool_and_null() {
        let cfg = Config::default();
        assert_eq!(check(&Type::int(), &Type::bool()).unwrap(), CastPlan::IntToBool);
        assert_eq!(
            check(&Type::bool(), &Type::int()).unwrap(),
            CastPlan::BoolToInt { extend: true }
        );
        assert_eq!(
            check(&Type::int().pointer(&cfg), &Type::bool()).unwrap(),
            CastPlan::PtrToBool
        );
        assert_eq!(
            check(&Type::null(), &Type::uint(1).array(&cfg)).unwrap(),
            CastPlan::NullToZero
        );
        assert!(check(&Type::float(8), &Type::bool()).is_err());
        assert!(check(&Type::int().array(&cfg), &Type::int().pointer(&cfg)).is_err());
    }

    #[test]
    fn double_constants_fold_to_float_precision() {
        let exact = fold_double_to_float(&format!("0x{:016X}", 1.5f64.to_bits()));
        assert_eq!(exact, Some(format!("0x{:016X}", 1.5f64.to_bits())));

        let tenth = fold_double_to_float(&format!("0x{:016X}", 0.1f64.to_bits())).unwrap();
        assert_eq!(tenth, format!("0x{:016X}", f64::from(0.1f32).to_bits()));
        assert_eq!(fold_double_to_float("%3"), None);
    }
}
