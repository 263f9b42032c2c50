//! Core type model for the Alpha language.
//!
//! A [`Type`] is a small immutable value: an [`Encoding`] that drives
//! coercion and cast legality, a width in bytes, an optional subtype for
//! pointers and arrays, the `const`/`volatile` qualifiers and, for integer
//! literals that have not been pinned to a type yet, the literal value.
//!
//! Nothing here mutates a type in place. The builder-style derivations
//! (`const_`, `pointer`, `array`, `normalised`, ...) all return a new value.

use std::fmt;

use num_bigint::BigInt;
use num_traits::One;

use crate::config::Config;

/// Storage size of objects: a type word and a value word.
pub const OBJECT_SIZE: u32 = 16;

/// Coarse category of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    SInt,
    UInt,
    Float,
    Bool,
    Pointer,
    Array,
    Object,
    Null,
}

/// A type value.
///
/// Equality (`==`) ignores qualifiers, the literal value and the spelling
/// used in source (`int == i32`). Assignability checks look at
/// [`Type::is_const`] separately.
#[derive(Debug, Clone)]
pub struct Type {
    encoding: Encoding,
    size: u32,
    subtype: Option<Box<Type>>,
    /// Object name; `None` for every other encoding.
    object: Option<String>,
    args: Vec<Type>,
    is_const: bool,
    is_volatile: bool,
    literal: Option<BigInt>,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.encoding == other.encoding
            && self.size == other.size
            && self.subtype == other.subtype
            && self.object == other.object
            && self.args == other.args
    }
}

impl Eq for Type {}

impl Type {
    fn primitive(encoding: Encoding, size: u32) -> Self {
        Type {
            encoding,
            size,
            subtype: None,
            object: None,
            args: Vec::new(),
            is_const: false,
            is_volatile: false,
            literal: None,
        }
    }

    /// Signed integer of `bytes` bytes.
    pub fn sint(bytes: u32) -> Self {
        Type::primitive(Encoding::SInt, bytes)
    }

    /// Unsigned integer of `bytes` bytes.
    pub fn uint(bytes: u32) -> Self {
        Type::primitive(Encoding::UInt, bytes)
    }

    pub fn float(bytes: u32) -> Self {
        Type::primitive(Encoding::Float, bytes)
    }

    pub fn bool() -> Self {
        Type::primitive(Encoding::Bool, 1)
    }

    /// The type of `null` (and of `void` returns).
    pub fn null() -> Self {
        Type::primitive(Encoding::Null, 0)
    }

    /// `int`, the default type of small integer literals.
    pub fn int() -> Self {
        Type::sint(4)
    }

    /// `size`: unsigned, pointer-width.
    pub fn size_type(cfg: &Config) -> Self {
        Type::uint(cfg.pointer_bytes())
    }

    /// `ssize`: signed, pointer-width.
    pub fn ssize_type(cfg: &Config) -> Self {
        Type::sint(cfg.pointer_bytes())
    }

    pub fn object(name: impl Into<String>, args: Vec<Type>) -> Self {
        Type {
            object: Some(name.into()),
            args,
            ..Type::primitive(Encoding::Object, OBJECT_SIZE)
        }
    }

    /// Resolve a type name as written in source.
    ///
    /// Unknown names are taken to be objects; whether such an object exists
    /// is not this module's concern.
    pub fn named(name: &str, args: Vec<Type>, cfg: &Config) -> Self {
        match name {
            "i8" => Type::sint(1),
            "i16" => Type::sint(2),
            "i32" | "int" => Type::sint(4),
            "i64" => Type::sint(8),
            "ssize" => Type::ssize_type(cfg),
            "u8" => Type::uint(1),
            "u16" => Type::uint(2),
            "u32" | "unsigned" => Type::uint(4),
            "u64" => Type::uint(8),
            "size" => Type::size_type(cfg),
            "float" => Type::float(4),
            "double" => Type::float(8),
            "bool" => Type::bool(),
            _ => Type::object(name, args),
        }
    }

    /// Type of an integer literal: the first of `int`, `i64`, `u64` that
    /// can hold the value, carrying the value itself. `None` when even `u64`
    /// is too small.
    pub fn int_literal(value: BigInt) -> Option<Self> {
        [Type::int(), Type::sint(8), Type::uint(8)]
            .into_iter()
            .find(|ty| ty.fits(&value))
            .map(|ty| ty.with_literal(value))
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Size in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn subtype(&self) -> Option<&Type> {
        self.subtype.as_deref()
    }

    pub fn object_name(&self) -> Option<&str> {
        self.object.as_deref()
    }

    pub fn args(&self) -> &[Type] {
        &self.args
    }

    pub fn is_const(&self) -> bool {
        self.is_const
    }

    pub fn is_volatile(&self) -> bool {
        self.is_volatile
    }

    /// Value of an unresolved integer literal.
    pub fn literal(&self) -> Option<&BigInt> {
        self.literal.as_ref()
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.encoding, Encoding::SInt | Encoding::UInt)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.encoding, Encoding::SInt | Encoding::UInt | Encoding::Float)
    }

    pub fn is_null(&self) -> bool {
        self.encoding == Encoding::Null
    }

    /// Equality that also takes qualifiers into account.
    pub fn equals_exact(&self, other: &Type) -> bool {
        self == other && self.is_const == other.is_const && self.is_volatile == other.is_volatile
    }

    // -----------------------------------------------------------------
    // Derivations
    // -----------------------------------------------------------------

    pub fn const_(&self) -> Type {
        Type {
            is_const: true,
            ..self.clone()
        }
    }

    pub fn not_const(&self) -> Type {
        Type {
            is_const: false,
            ..self.clone()
        }
    }

    pub fn volatile(&self) -> Type {
        Type {
            is_volatile: true,
            ..self.clone()
        }
    }

    /// Pointer to this type.
    pub fn pointer(&self, cfg: &Config) -> Type {
        Type {
            subtype: Some(Box::new(self.clone())),
            ..Type::primitive(Encoding::Pointer, cfg.pointer_bytes())
        }
    }

    /// Array of this type. Arrays are handles, so they are pointer-sized.
    pub fn array(&self, cfg: &Config) -> Type {
        Type {
            subtype: Some(Box::new(self.clone())),
            ..Type::primitive(Encoding::Array, cfg.pointer_bytes())
        }
    }

    /// Strip the literal value and the `const` qualifier.
    pub fn normalised(&self) -> Type {
        Type {
            is_const: false,
            literal: None,
            ..self.clone()
        }
    }

    /// Strip only the literal value.
    pub fn non_literal(&self) -> Type {
        Type {
            literal: None,
            ..self.clone()
        }
    }

    pub fn with_literal(&self, value: BigInt) -> Type {
        Type {
            literal: Some(value),
            ..self.clone()
        }
    }

    // -----------------------------------------------------------------
    // Numeric properties
    // -----------------------------------------------------------------

    /// Inclusive `[min, max]` of an integer type.
    pub fn int_range(&self) -> Option<(BigInt, BigInt)> {
        let bits = self.size * 8;
        match self.encoding {
            Encoding::SInt => {
                let half = BigInt::one() << (bits - 1);
                Some((-half.clone(), half - 1))
            }
            Encoding::UInt => Some((BigInt::from(0), (BigInt::one() << bits) - 1)),
            _ => None,
        }
    }

    /// Whether `value` lies inside [`Type::int_range`].
    pub fn fits(&self, value: &BigInt) -> bool {
        match self.int_range() {
            Some((min, max)) => *value >= min && *value <= max,
            None => false,
        }
    }

    /// Arithmetic rank; the operand with the higher rank decides the type of
    /// a mixed arithmetic expression.
    ///
    /// `f64 > f32 > u64 > u32 > u16 > u8 > i64 > i32 > i16 > i8`
    pub fn rank(&self) -> Option<u8> {
        let rank = match (self.encoding, self.size) {
            (Encoding::Float, 8) => 10,
            (Encoding::Float, 4) => 9,
            (Encoding::UInt, 8) => 8,
            (Encoding::UInt, 4) => 7,
            (Encoding::UInt, 2) => 6,
            (Encoding::UInt, 1) => 5,
            (Encoding::SInt, 8) => 4,
            (Encoding::SInt, 4) => 3,
            (Encoding::SInt, 2) => 2,
            (Encoding::SInt, 1) => 1,
            _ => return None,
        };
        Some(rank)
    }

    // -----------------------------------------------------------------
    // Backend spellings
    // -----------------------------------------------------------------

    /// LLVM spelling of the type.
    pub fn llvm_name(&self) -> String {
        match self.encoding {
            Encoding::SInt | Encoding::UInt => format!("i{}", self.size * 8),
            Encoding::Float if self.size == 4 => "float".to_string(),
            Encoding::Float => "double".to_string(),
            Encoding::Bool => "i8".to_string(),
            Encoding::Pointer => match self.subtype() {
                Some(sub) => format!("{}*", sub.llvm_name()),
                None => "i8*".to_string(),
            },
            Encoding::Array => "i8*".to_string(),
            Encoding::Object | Encoding::Null => "%.nonprim".to_string(),
        }
    }

    /// Encoding used in mangled symbol names.
    ///
    /// ```text
    ///          1  2  4  8
    /// SINT     A  B  C  D
    /// UINT     a  b  c  d
    /// FLOAT          F  f
    /// BOOL     t
    /// POINTER  p<subtype>
    /// ARRAY    q<subtype>
    /// OBJECT   O<name>$<args>Z
    /// ```
    pub fn encoded_name(&self) -> String {
        let by_size = |table: [char; 4]| -> String {
            let index = match self.size {
                1 => 0,
                2 => 1,
                4 => 2,
                _ => 3,
            };
            table[index].to_string()
        };
        match self.encoding {
            Encoding::SInt => by_size(['A', 'B', 'C', 'D']),
            Encoding::UInt => by_size(['a', 'b', 'c', 'd']),
            Encoding::Float if self.size == 4 => "F".to_string(),
            Encoding::Float => "f".to_string(),
            Encoding::Bool => "t".to_string(),
            Encoding::Pointer | Encoding::Array => {
                let prefix = if self.encoding == Encoding::Pointer { 'p' } else { 'q' };
                let sub = self.subtype().map(Type::encoded_name).unwrap_or_default();
                format!("{prefix}{sub}")
            }
            Encoding::Object => {
                let mut out = format!("O{}$", self.object.as_deref().unwrap_or_default());
                for arg in &self.args {
                    out.push_str(&arg.encoded_name());
                }
                out.push('Z');
                out
            }
            Encoding::Null => "N".to_string(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encoding {
            Encoding::SInt => write!(f, "i{}", self.size * 8)?,
            Encoding::UInt => write!(f, "u{}", self.size * 8)?,
            Encoding::Float if self.size == 4 => f.write_str("float")?,
            Encoding::Float => f.write_str("double")?,
            Encoding::Bool => f.write_str("bool")?,
            Encoding::Null => f.write_str("null")?,
            Encoding::Pointer | Encoding::Array => {
                if let Some(sub) = self.subtype() {
                    write!(f, "{sub}")?;
                }
                f.write_str(if self.encoding == Encoding::Pointer { "*" } else { "[]" })?;
            }
            Encoding::Object => {
                f.write_str(self.object.as_deref().unwrap_or_default())?;
                if !self.args.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in self.args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
            }
        }
        if self.is_const {
            f.write_str(" const")?;
        }
        if self.is_volatile {
            f.write_str(" volatile")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn spelling_does_not_affect_equality() {
        let cfg = cfg();
        assert_eq!(Type::named("int", vec![], &cfg), Type::named("i32", vec![], &cfg));
        assert_eq!(Type::named("size", vec![], &cfg), Type::uint(8));
        assert_ne!(Type::sint(4), Type::uint(4));
    }

    #[test]
    fn const_round_trip_only_touches_the_qualifier() {
        let cfg = cfg();
        let ty = Type::uint(2).pointer(&cfg).volatile();
        let back = ty.const_().not_const();
        assert!(ty.const_().is_const());
        assert!(!back.is_const());
        assert_eq!(back.encoding(), ty.encoding());
        assert_eq!(back.size(), ty.size());
        assert_eq!(back.subtype(), ty.subtype());
        assert!(back.is_volatile());
        assert!(back.equals_exact(&ty));
    }

    #[test]
    fn qualifiers_are_ignored_by_eq_but_not_by_equals_exact() {
        let ty = Type::int();
        assert_eq!(ty, ty.const_());
        assert!(!ty.equals_exact(&ty.const_()));
    }

    #[test]
    fn integer_ranges() {
        let (min, max) = Type::uint(1).int_range().unwrap();
        assert_eq!(min, BigInt::from(0));
        assert_eq!(max, BigInt::from(255));
        let (min, max) = Type::sint(2).int_range().unwrap();
        assert_eq!(min, BigInt::from(-32768));
        assert_eq!(max, BigInt::from(32767));
        assert!(Type::float(8).int_range().is_none());
    }

    #[test]
    fn literal_types_pick_the_smallest_default() {
        assert_eq!(Type::int_literal(BigInt::from(5)).unwrap(), Type::int());
        assert_eq!(
            Type::int_literal(BigInt::from(1u64 << 40)).unwrap(),
            Type::sint(8)
        );
        assert_eq!(Type::int_literal(BigInt::from(u64::MAX)).unwrap(), Type::uint(8));
        assert!(Type::int_literal(BigInt::from(u64::MAX) + 1).is_none());
    }

    #[test]
    fn rank_order() {
        let order = [
            Type::float(8),
            Type::float(4),
            Type::uint(8),
            Type::uint(4),
            Type::uint(2),
            Type::uint(1),
            Type::sint(8),
            Type::sint(4),
            Type::sint(2),
            Type::sint(1),
        ];
        for pair in order.windows(2) {
            assert!(pair[0].rank() > pair[1].rank(), "{} vs {}", pair[0], pair[1]);
        }
        assert_eq!(Type::bool().rank(), None);
    }

    #[test]
    fn encoded_names() {
        let cfg = cfg();
        assert_eq!(Type::int().pointer(&cfg).array(&cfg).encoded_name(), "qpC");
        assert_eq!(Type::uint(1).encoded_name(), "a");
        assert_eq!(Type::float(4).encoded_name(), "F");
        let map = Type::object("map", vec![Type::object("string", vec![]), Type::int()]);
        assert_eq!(map.encoded_name(), "Omap$Ostring$ZCZ");
    }

    #[test]
    fn display_and_llvm_names() {
        let cfg = cfg();
        let ty = Type::uint(1).array(&cfg).const_();
        assert_eq!(ty.to_string(), "u8[] const");
        assert_eq!(ty.llvm_name(), "i8*");
        assert_eq!(Type::int().pointer(&cfg).llvm_name(), "i32*");
        assert_eq!(Type::bool().llvm_name(), "i8");
    }
}
