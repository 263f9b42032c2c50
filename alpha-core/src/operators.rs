//! Operator and keyword tables.
//!
//! Everything here is a `const` table or a `match`; there is no runtime
//! initialisation.

/// Binding strength of operators. Higher binds tighter.
pub mod precedence {
    pub const INDEX: u8 = 140;
    pub const CALL: u8 = 140;
    pub const MEMBER: u8 = 140;
    pub const UNARY: u8 = 130;
    pub const CAST: u8 = 125;
    pub const MUL: u8 = 120;
    pub const ADD: u8 = 110;
    pub const SHIFT: u8 = 100;
    pub const BIT_AND: u8 = 96;
    pub const BIT_XOR: u8 = 95;
    pub const BIT_OR: u8 = 94;
    pub const REL_INEQ: u8 = 90;
    pub const REL_EQ: u8 = 80;
    pub const LOG_AND: u8 = 40;
    pub const LOG_OR: u8 = 30;
    pub const TERNARY: u8 = 25;
    pub const COMMA: u8 = 22;
    pub const ASSIGNMENT: u8 = 20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Assign,
    /// `=`: reserved so that it can point users at `:=` or `==`.
    EqError,
    Comma,
    As,
    Member,
    Add,
    Sub,
    Mul,
    Div,
    /// `%`: modulus with the sign of the divisor.
    Mod,
    /// `%%`: remainder with the sign of the dividend.
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogAnd,
    LogOr,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    RemAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShlAssign,
    ShrAssign,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    /// `===`: by-reference equality.
    RefEq,
    RefNe,
    Question,
    Colon,
}

const BINOPS: &[(&str, BinOp)] = &[
    (":=", BinOp::Assign),
    ("=", BinOp::EqError),
    (",", BinOp::Comma),
    ("as", BinOp::As),
    (".", BinOp::Member),
    ("+", BinOp::Add),
    ("-", BinOp::Sub),
    ("*", BinOp::Mul),
    ("/", BinOp::Div),
    ("%", BinOp::Mod),
    ("%%", BinOp::Rem),
    ("<<", BinOp::Shl),
    (">>", BinOp::Shr),
    ("&", BinOp::BitAnd),
    ("|", BinOp::BitOr),
    ("^", BinOp::BitXor),
    ("&&", BinOp::LogAnd),
    ("||", BinOp::LogOr),
    ("+=", BinOp::AddAssign),
    ("-=", BinOp::SubAssign),
    ("*=", BinOp::MulAssign),
    ("/=", BinOp::DivAssign),
    ("%=", BinOp::ModAssign),
    ("%%=", BinOp::RemAssign),
    ("&=", BinOp::AndAssign),
    ("|=", BinOp::OrAssign),
    ("^=", BinOp::XorAssign),
    ("<<=", BinOp::ShlAssign),
    (">>=", BinOp::ShrAssign),
    ("<", BinOp::Lt),
    (">", BinOp::Gt),
    ("<=", BinOp::Le),
    (">=", BinOp::Ge),
    ("==", BinOp::Eq),
    ("!=", BinOp::Ne),
    ("===", BinOp::RefEq),
    ("!==", BinOp::RefNe),
    ("?", BinOp::Question),
    (":", BinOp::Colon),
];

impl BinOp {
    pub fn from_symbol(symbol: &str) -> Option<BinOp> {
        BINOPS.iter().find(|(s, _)| *s == symbol).map(|(_, op)| *op)
    }

    pub fn symbol(self) -> &'static str {
        BINOPS
            .iter()
            .find(|(_, op)| *op == self)
            .map(|(s, _)| *s)
            .unwrap_or("?")
    }

    pub fn precedence(self) -> u8 {
        use BinOp::*;
        match self {
            Member => precedence::MEMBER,
            As => precedence::CAST,
            Mul | Div | Mod | Rem => precedence::MUL,
            Add | Sub => precedence::ADD,
            Shl | Shr => precedence::SHIFT,
            BitAnd => precedence::BIT_AND,
            BitXor => precedence::BIT_XOR,
            BitOr => precedence::BIT_OR,
            Lt | Gt | Le | Ge => precedence::REL_INEQ,
            Eq | Ne | RefEq | RefNe => precedence::REL_EQ,
            LogAnd => precedence::LOG_AND,
            LogOr => precedence::LOG_OR,
            Question | Colon => precedence::TERNARY,
            Comma => precedence::COMMA,
            Assign | EqError | AddAssign | SubAssign | MulAssign | DivAssign | ModAssign
            | RemAssign | AndAssign | OrAssign | XorAssign | ShlAssign | ShrAssign => {
                precedence::ASSIGNMENT
            }
        }
    }

    pub fn assoc(self) -> Assoc {
        if self.precedence() == precedence::ASSIGNMENT || self.precedence() == precedence::TERNARY
        {
            Assoc::Right
        } else {
            Assoc::Left
        }
    }

    /// The arithmetic operator behind a compound assignment (`+=` -> `+`).
    pub fn compound_base(self) -> Option<BinOp> {
        use BinOp::*;
        let base = match self {
            AddAssign => Add,
            SubAssign => Sub,
            MulAssign => Mul,
            DivAssign => Div,
            ModAssign => Mod,
            RemAssign => Rem,
            AndAssign => BitAnd,
            OrAssign => BitOr,
            XorAssign => BitXor,
            ShlAssign => Shl,
            ShrAssign => Shr,
            _ => return None,
        };
        Some(base)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Deref,
    Address,
    Neg,
    Not,
    Compl,
    Incr,
    Decr,
}

const UNOPS: &[(&str, UnOp)] = &[
    ("*", UnOp::Deref),
    ("&", UnOp::Address),
    ("-", UnOp::Neg),
    ("!", UnOp::Not),
    ("~", UnOp::Compl),
    ("++", UnOp::Incr),
    ("--", UnOp::Decr),
];

impl UnOp {
    pub fn from_symbol(symbol: &str) -> Option<UnOp> {
        UNOPS.iter().find(|(s, _)| *s == symbol).map(|(_, op)| *op)
    }

    pub fn symbol(self) -> &'static str {
        UNOPS
            .iter()
            .find(|(_, op)| *op == self)
            .map(|(s, _)| *s)
            .unwrap_or("?")
    }

    pub fn precedence(self) -> u8 {
        precedence::UNARY
    }

    pub fn assoc(self) -> Assoc {
        Assoc::Right
    }
}

/// Operators that may be overloaded, with the id used in `$O` symbols.
const OVERLOAD_IDS: &[(&str, char)] = &[
    ("~", 'A'),
    ("*", 'C'),
    ("/", 'D'),
    ("%", 'E'),
    ("%%", 'F'),
    ("+", 'G'),
    ("-", 'H'),
    ("<<", 'I'),
    (">>", 'J'),
    ("&", 'K'),
    ("^", 'L'),
    ("|", 'M'),
    ("<", 'N'),
    ("<=", 'O'),
    (">", 'P'),
    (">=", 'Q'),
    ("==", 'R'),
    ("!=", 'S'),
    ("-=", 'h'),
    ("*=", 'c'),
    ("/=", 'd'),
    ("%=", 'e'),
    ("%%=", 'f'),
    ("+=", 'g'),
    ("<<=", 'i'),
    (">>=", 'j'),
    ("&=", 'k'),
    ("^=", 'l'),
    ("|=", 'm'),
];

pub fn overload_id(symbol: &str) -> Option<char> {
    OVERLOAD_IDS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, id)| *id)
}

pub fn operator_for_id(id: char) -> Option<&'static str> {
    OVERLOAD_IDS
        .iter()
        .find(|(_, i)| *i == id)
        .map(|(s, _)| *s)
}

pub fn is_overloadable(symbol: &str) -> bool {
    overload_id(symbol).is_some()
}

const KEYWORDS: &[&str] = &[
    "class", "method", "extern", "let", "const", "static", "threadlocal", "nomangle",
    "allowconflict", "global", "null", "record", "switch", "case", "default", "if", "else", "for",
    "foreach", "do", "while", "return", "as", "break", "continue", "new", "delete", "true",
    "false", "volatile",
];

const TYPE_NAMES: &[&str] = &[
    "i8", "i16", "i32", "i64", "ssize", "int", "u8", "u16", "u32", "u64", "size", "unsigned",
    "float", "double", "bool", "var", "void",
];

/// Whether `word` is reserved. With `include_types`, built-in type names
/// count as reserved too (declaration names may not shadow them).
pub fn is_keyword(word: &str, include_types: bool) -> bool {
    KEYWORDS.contains(&word) || (include_types && TYPE_NAMES.contains(&word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_sits_between_ternary_and_assignment() {
        assert!(BinOp::Question.precedence() > BinOp::Comma.precedence());
        assert!(BinOp::Comma.precedence() > BinOp::Assign.precedence());
        assert_eq!(BinOp::Comma.assoc(), Assoc::Left);
        assert_eq!(BinOp::AddAssign.assoc(), Assoc::Right);
        assert_eq!(BinOp::Question.assoc(), Assoc::Right);
    }

    #[test]
    fn overload_ids_round_trip() {
        for (symbol, id) in OVERLOAD_IDS {
            assert_eq!(overload_id(symbol), Some(*id));
            assert_eq!(operator_for_id(*id), Some(*symbol));
        }
        assert!(!is_overloadable("&&"));
        assert!(!is_overloadable(":="));
    }

    #[test]
    fn symbols_map_back() {
        assert_eq!(BinOp::from_symbol("%%="), Some(BinOp::RemAssign));
        assert_eq!(BinOp::RemAssign.symbol(), "%%=");
        assert_eq!(BinOp::RemAssign.compound_base(), Some(BinOp::Rem));
        assert_eq!(UnOp::from_symbol("~"), Some(UnOp::Compl));
        assert_eq!(UnOp::from_symbol("+"), None);
    }

    #[test]
    fn type_names_are_only_reserved_on_request() {
        assert!(is_keyword("while", false));
        assert!(!is_keyword("int", false));
        assert!(is_keyword("int", true));
    }
}
