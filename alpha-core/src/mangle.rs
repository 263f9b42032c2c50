//! Symbol mangling and demangling.
//!
//! ```text
//! $F<len><package><len><name><returns>$<args>   free function
//! $G<len><name><returns>$<args>                 `global` function
//! $O<id><returns>$<args>                        operator overload
//! ```
//!
//! Types are written with [`Type::encoded_name`]. `nomangle` functions keep
//! their source name. Reserved handler names (`@oom`, `@bounds`) become
//! `$$oom` / `$$bounds`.

use std::fmt;

use crate::config::Config;
use crate::operators::{operator_for_id, overload_id};
use crate::types::Type;

/// What a mangled symbol names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Free { package: String, name: String },
    Global { name: String },
    Operator { symbol: String },
}

/// A decoded symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Demangled {
    pub kind: SymbolKind,
    pub returns: Vec<Type>,
    pub params: Vec<Type>,
}

fn encode_types(types: &[Type]) -> String {
    types.iter().map(Type::encoded_name).collect()
}

pub fn mangle_free(package: &str, name: &str, returns: &[Type], params: &[Type]) -> String {
    format!(
        "$F{}{}{}{}{}${}",
        package.len(),
        package,
        name.len(),
        name,
        encode_types(returns),
        encode_types(params)
    )
}

pub fn mangle_global(name: &str, returns: &[Type], params: &[Type]) -> String {
    format!(
        "$G{}{}{}${}",
        name.len(),
        name,
        encode_types(returns),
        encode_types(params)
    )
}

/// `None` when `symbol` cannot be overloaded.
pub fn mangle_operator(symbol: &str, returns: &[Type], params: &[Type]) -> Option<String> {
    let id = overload_id(symbol)?;
    Some(format!(
        "$O{}{}${}",
        id,
        encode_types(returns),
        encode_types(params)
    ))
}

/// Symbol of a reserved `@name` handler.
pub fn handler_symbol(name: &str) -> String {
    format!("$${}", name.trim_start_matches('@'))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn number(&mut self) -> Option<usize> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }

    fn string(&mut self, len: usize) -> Option<String> {
        let end = self.pos.checked_add(len)?;
        let text = std::str::from_utf8(self.bytes.get(self.pos..end)?).ok()?;
        self.pos = end;
        Some(text.to_string())
    }

    fn until(&mut self, stop: u8) -> Option<String> {
        let start = self.pos;
        while self.peek()? != stop {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).ok()?;
        self.pos += 1;
        Some(text.to_string())
    }

    fn ty(&mut self, cfg: &Config) -> Option<Type> {
        let ty = match self.next()? {
            b'A' => Type::sint(1),
            b'B' => Type::sint(2),
            b'C' => Type::sint(4),
            b'D' => Type::sint(8),
            b'a' => Type::uint(1),
            b'b' => Type::uint(2),
            b'c' => Type::uint(4),
            b'd' => Type::uint(8),
            b'F' => Type::float(4),
            b'f' => Type::float(8),
            b't' => Type::bool(),
            b'N' => Type::null(),
            b'p' => self.ty(cfg)?.pointer(cfg),
            b'q' => self.ty(cfg)?.array(cfg),
            b'O' => {
                let name = self.until(b'$')?;
                let mut args = Vec::new();
                while self.peek()? != b'Z' {
                    args.push(self.ty(cfg)?);
                }
                self.pos += 1;
                Type::object(name, args)
            }
            _ => return None,
        };
        Some(ty)
    }

    fn types_until_dollar(&mut self, cfg: &Config) -> Option<Vec<Type>> {
        let mut types = Vec::new();
        while self.peek()? != b'$' {
            types.push(self.ty(cfg)?);
        }
        self.pos += 1;
        Some(types)
    }

    fn types_to_end(&mut self, cfg: &Config) -> Option<Vec<Type>> {
        let mut types = Vec::new();
        while self.peek().is_some() {
            types.push(self.ty(cfg)?);
        }
        Some(types)
    }
}

/// Decode a single encoded type such as `qpC`.
pub fn decode_type(text: &str, cfg: &Config) -> Option<Type> {
    let mut reader = Reader {
        bytes: text.as_bytes(),
        pos: 0,
    };
    let ty = reader.ty(cfg)?;
    (reader.pos == text.len()).then_some(ty)
}

/// Decode a mangled symbol. Returns `None` for anything that is not a
/// well-formed `$F`, `$G` or `$O` symbol.
pub fn demangle(symbol: &str, cfg: &Config) -> Option<Demangled> {
    let mut reader = Reader {
        bytes: symbol.as_bytes(),
        pos: 0,
    };
    if reader.next()? != b'$' {
        return None;
    }
    let kind = match reader.next()? {
        b'F' => {
            let len = reader.number()?;
            let package = reader.string(len)?;
            let len = reader.number()?;
            let name = reader.string(len)?;
            SymbolKind::Free { package, name }
        }
        b'G' => {
            let len = reader.number()?;
            SymbolKind::Global {
                name: reader.string(len)?,
            }
        }
        b'O' => {
            let id = reader.next()? as char;
            SymbolKind::Operator {
                symbol: operator_for_id(id)?.to_string(),
            }
        }
        _ => return None,
    };
    let returns = reader.types_until_dollar(cfg)?;
    let params = reader.types_to_end(cfg)?;
    Some(Demangled {
        kind,
        returns,
        params,
    })
}

impl fmt::Display for Demangled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.returns.as_slice() {
            [] => f.write_str("void")?,
            [single] => write!(f, "{single}")?,
            many => {
                let list: Vec<String> = many.iter().map(ToString::to_string).collect();
                write!(f, "({})", list.join(", "))?;
            }
        }
        match &self.kind {
            SymbolKind::Free { package, name } => write!(f, " {package}.{name}")?,
            SymbolKind::Global { name } => write!(f, " {name}")?,
            SymbolKind::Operator { symbol } => write!(f, " operator {symbol}")?,
        }
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        write!(f, " ({})", params.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn free_functions() {
        let cfg = Config::default();
        let symbol = mangle_free("main", "add", &[Type::int()], &[Type::int(), Type::uint(1)]);
        assert_eq!(symbol, "$F4main3addC$Ca");
        let back = demangle(&symbol, &cfg).expect("demangle");
        assert_eq!(back.to_string(), "i32 main.add (i32, u8)");
    }

    #[test]
    fn operators_and_globals() {
        let cfg = Config::default();
        let point = Type::object("point", vec![]);
        let symbol = mangle_operator("+", &[point.clone()], &[point.clone(), point.clone()])
            .expect("overloadable");
        assert_eq!(symbol, "$OGOpoint$Z$Opoint$ZOpoint$Z");
        let back = demangle(&symbol, &cfg).unwrap();
        assert_eq!(back.params, vec![point.clone(), point]);
        assert_eq!(back.to_string(), "point operator + (point, point)");

        assert_eq!(mangle_operator("&&", &[], &[]), None);

        let symbol = mangle_global("start", &[], &[Type::uint(1).pointer(&cfg)]);
        assert_eq!(symbol, "$G5start$pa");
        assert_eq!(demangle(&symbol, &cfg).unwrap().to_string(), "void start (u8*)");
    }

    #[test]
    fn rejects_garbage() {
        let cfg = Config::default();
        assert_eq!(demangle("main", &cfg), None);
        assert_eq!(demangle("$F4ma", &cfg), None);
        assert_eq!(demangle("$F4main1fX$", &cfg), None);
        assert_eq!(decode_type("qpC", &cfg), Some(Type::int().pointer(&cfg).array(&cfg)));
        assert_eq!(decode_type("CC", &cfg), None);
    }

    #[test]
    fn handler_names() {
        assert_eq!(handler_symbol("@oom"), "$$oom");
    }
}
