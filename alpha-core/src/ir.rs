//! Textual LLVM IR builder.
//!
//! A [`FunctionBuilder`] owns an instruction arena and a list of basic
//! blocks. Instructions are referred to by [`Value::Inst`] and only receive
//! their `%N` names when the function is rendered, so numbering always
//! follows textual order. A block accepts no instruction once it ends in a
//! terminator; the builder then starts a fresh unlabelled block for any
//! code that follows (such code is unreachable).

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use crate::cast::ConvOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

/// An operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Result of an instruction in the same function.
    Inst(InstId),
    /// A constant written out verbatim (`5`, `null`, `0x3FF0000000000000`).
    Const(String),
    /// A named local or global (`%x`, `%.0`, `@main`).
    Named(String),
}

impl Value {
    pub fn constant(text: impl Into<String>) -> Self {
        Value::Const(text.into())
    }

    pub fn named(text: impl Into<String>) -> Self {
        Value::Named(text.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// `alloca`; a named slot renders as `%name = alloca T`.
    Alloca { ty: String, name: Option<String> },
    Load { ty: String, ptr: Value, volatile: bool },
    Store { ty: String, value: Value, ptr: Value, volatile: bool },
    /// Any two-operand instruction, including `icmp`/`fcmp` predicates
    /// (`op` is e.g. `"add"` or `"icmp slt"`).
    Binary { op: String, ty: String, lhs: Value, rhs: Value },
    Convert { op: ConvOp, from: String, value: Value, to: String },
    /// `cond` is an `i1`.
    Select { cond: Value, ty: String, on_true: Value, on_false: Value },
    /// `getelementptr`; `elem` is the pointee type of `ptr`.
    Gep { elem: String, ptr: Value, indices: Vec<(String, Value)> },
    Call { ret: String, callee: String, args: Vec<(String, Value)> },
    Phi { ty: String, incoming: Vec<(Value, BlockId)> },
    Br(BlockId),
    CondBr { cond: Value, then: BlockId, otherwise: BlockId },
    Switch { ty: String, value: Value, default: BlockId, cases: Vec<(String, BlockId)> },
    Ret(Option<(String, Value)>),
    Unreachable,
}

impl Inst {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Inst::Br(_) | Inst::CondBr { .. } | Inst::Switch { .. } | Inst::Ret(_) | Inst::Unreachable
        )
    }

    /// Whether the instruction produces a value that needs a `%N` name.
    pub fn needs_id(&self) -> bool {
        match self {
            Inst::Alloca { name, .. } => name.is_none(),
            Inst::Load { .. }
            | Inst::Binary { .. }
            | Inst::Convert { .. }
            | Inst::Select { .. }
            | Inst::Gep { .. }
            | Inst::Phi { .. } => true,
            Inst::Call { ret, .. } => ret != "void",
            _ => false,
        }
    }
}

/// A basic block: instruction ids in order, sealed by a terminator.
#[derive(Debug, Clone)]
pub struct Block {
    label: Option<String>,
    insts: Vec<InstId>,
    terminated: bool,
}

impl Block {
    fn new(label: Option<String>) -> Self {
        Block {
            label,
            insts: Vec::new(),
            terminated: false,
        }
    }

    /// Append an instruction. Returns `false` and leaves the block alone if
    /// it is already terminated.
    pub fn push(&mut self, id: InstId, terminator: bool) -> bool {
        if self.terminated {
            return false;
        }
        self.insts.push(id);
        self.terminated = terminator;
        true
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }
}

/// Per-prefix monotonically increasing counter (`.L` labels, `@` globals).
#[derive(Debug, Default)]
pub struct Counter {
    counts: HashMap<String, u32>,
}

impl Counter {
    pub fn next(&mut self, prefix: &str) -> u32 {
        let slot = self.counts.entry(prefix.to_string()).or_insert(0);
        let value = *slot;
        *slot += 1;
        value
    }
}

#[derive(Debug)]
pub struct FunctionBuilder {
    name: String,
    ret: String,
    params: Vec<(String, String)>,
    insts: Vec<Inst>,
    blocks: Vec<Block>,
    /// Blocks in the order they were first entered.
    order: Vec<BlockId>,
    current: BlockId,
    /// Number of allocas hoisted to the top of the entry block.
    entry_allocas: usize,
}

impl FunctionBuilder {
    /// `params` are `(llvm type, name)` pairs; names include the `%`.
    pub fn new(name: impl Into<String>, ret: impl Into<String>, params: Vec<(String, String)>) -> Self {
        FunctionBuilder {
            name: name.into(),
            ret: ret.into(),
            params,
            insts: Vec::new(),
            blocks: vec![Block::new(None)],
            order: vec![BlockId(0)],
            current: BlockId(0),
            entry_allocas: 0,
        }
    }

    pub fn ret_type(&self) -> &str {
        &self.ret
    }

    /// Create a labelled block without entering it.
    pub fn new_block(&mut self, counter: &mut Counter) -> BlockId {
        let label = format!(".L{}", counter.next(".L"));
        self.blocks.push(Block::new(Some(label)));
        BlockId(self.blocks.len() - 1)
    }

    /// Continue emitting into `block`.
    pub fn position_at(&mut self, block: BlockId) {
        if !self.order.contains(&block) {
            self.order.push(block);
        }
        self.current = block;
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn is_terminated(&self) -> bool {
        self.blocks[self.current.0].is_terminated()
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    /// Append to the current block and return the instruction's value.
    pub fn push(&mut self, inst: Inst) -> Value {
        let terminator = inst.is_terminator();
        let id = InstId(self.insts.len());
        self.insts.push(inst);
        if !self.blocks[self.current.0].push(id, terminator) {
            self.blocks.push(Block::new(None));
            let fresh = BlockId(self.blocks.len() - 1);
            self.position_at(fresh);
            self.blocks[fresh.0].push(id, terminator);
        }
        Value::Inst(id)
    }

    /// `alloca` at the top of the entry block, wherever the builder
    /// currently is.
    pub fn entry_alloca(&mut self, ty: impl Into<String>, name: Option<String>) -> Value {
        let id = InstId(self.insts.len());
        self.insts.push(Inst::Alloca { ty: ty.into(), name });
        self.blocks[0].insts.insert(self.entry_allocas, id);
        self.entry_allocas += 1;
        Value::Inst(id)
    }

    pub fn br(&mut self, target: BlockId) {
        self.push(Inst::Br(target));
    }

    /// Branch to `target` unless the current block already ended.
    pub fn br_if_open(&mut self, target: BlockId) {
        if !self.is_terminated() {
            self.br(target);
        }
    }

    /// Terminate the last block with the zero value of the return type if
    /// control can fall off the end, then render the definition.
    ///
    /// # Panics
    ///
    /// Panics if any block other than the last one was left without a
    /// terminator.
    pub fn finish(mut self) -> String {
        if !self.is_terminated() {
            let value = match self.ret.as_str() {
                "void" => None,
                "float" | "double" => Some("0.0"),
                "%.nonprim" => Some("zeroinitializer"),
                ty if ty.ends_with('*') => Some("null"),
                _ => Some("0"),
            };
            let ret = value.map(|v| (self.ret.clone(), Value::constant(v)));
            self.push(Inst::Ret(ret));
        }
        for (index, block) in self.blocks.iter().enumerate() {
            assert!(
                block.is_terminated() || !self.order.contains(&BlockId(index)),
                "block {index} of {} left open",
                self.name
            );
        }
        self.render()
    }

    fn render(&self) -> String {
        let mut names: HashMap<InstId, String> = HashMap::new();
        let mut block_names: HashMap<BlockId, String> = HashMap::new();
        let mut next = 0u32;
        for &bid in &self.order {
            let block = &self.blocks[bid.0];
            match &block.label {
                Some(label) => {
                    block_names.insert(bid, format!("%{label}"));
                }
                None => {
                    block_names.insert(bid, format!("%{next}"));
                    next += 1;
                }
            }
            for &iid in &block.insts {
                match &self.insts[iid.0] {
                    Inst::Alloca { name: Some(name), .. } => {
                        names.insert(iid, name.clone());
                    }
                    inst if inst.needs_id() => {
                        names.insert(iid, format!("%{next}"));
                        next += 1;
                    }
                    _ => {}
                }
            }
        }

        let value = |v: &Value| -> String {
            match v {
                Value::Inst(id) => names
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| panic!("instruction {id:?} used before it was placed")),
                Value::Const(text) | Value::Named(text) => text.clone(),
            }
        };
        let label = |b: &BlockId| -> String {
            block_names
                .get(b)
                .cloned()
                .unwrap_or_else(|| panic!("branch to block {b:?} that was never entered"))
        };

        let mut out = String::new();
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(ty, name)| format!("{ty} {name}"))
            .collect();
        let _ = writeln!(out, "define {} @{}({}) {{", self.ret, self.name, params.join(", "));
        for (position, &bid) in self.order.iter().enumerate() {
            let block = &self.blocks[bid.0];
            match &block.label {
                Some(text) => {
                    let _ = writeln!(out, "{text}:");
                }
                None if position > 0 => {
                    let _ = writeln!(out, "; <label>:{}", &label(&bid)[1..]);
                }
                None => {}
            }
            for &iid in &block.insts {
                let body = render_inst(&self.insts[iid.0], &value, &label);
                match names.get(&iid) {
                    Some(id) => {
                        let _ = writeln!(out, "  {id} = {body}");
                    }
                    None => {
                        let _ = writeln!(out, "  {body}");
                    }
                }
            }
        }
        out.push_str("}\n");
        out
    }
}

fn render_inst(
    inst: &Inst,
    value: &dyn Fn(&Value) -> String,
    label: &dyn Fn(&BlockId) -> String,
) -> String {
    let typed = |args: &[(String, Value)]| -> String {
        args.iter()
            .map(|(ty, v)| format!("{ty} {}", value(v)))
            .collect::<Vec<_>>()
            .join(", ")
    };
    match inst {
        Inst::Alloca { ty, .. } => format!("alloca {ty}"),
        Inst::Load { ty, ptr, volatile } => {
            let vol = if *volatile { "volatile " } else { "" };
            format!("load {vol}{ty}, {ty}* {}", value(ptr))
        }
        Inst::Store { ty, value: v, ptr, volatile } => {
            let vol = if *volatile { "volatile " } else { "" };
            format!("store {vol}{ty} {}, {ty}* {}", value(v), value(ptr))
        }
        Inst::Binary { op, ty, lhs, rhs } => {
            format!("{op} {ty} {}, {}", value(lhs), value(rhs))
        }
        Inst::Convert { op, from, value: v, to } => {
            format!("{} {from} {} to {to}", op.mnemonic(), value(v))
        }
        Inst::Select { cond, ty, on_true, on_false } => format!(
            "select i1 {}, {ty} {}, {ty} {}",
            value(cond),
            value(on_true),
            value(on_false)
        ),
        Inst::Gep { elem, ptr, indices } => {
            let mut text = format!("getelementptr {elem}, {elem}* {}", value(ptr));
            if !indices.is_empty() {
                text.push_str(", ");
                text.push_str(&typed(indices));
            }
            text
        }
        Inst::Call { ret, callee, args } => format!("call {ret} {callee}({})", typed(args)),
        Inst::Phi { ty, incoming } => {
            let pairs: Vec<String> = incoming
                .iter()
                .map(|(v, b)| format!("[ {}, {} ]", value(v), label(b)))
                .collect();
            format!("phi {ty} {}", pairs.join(", "))
        }
        Inst::Br(target) => format!("br label {}", label(target)),
        Inst::CondBr { cond, then, otherwise } => format!(
            "br i1 {}, label {}, label {}",
            value(cond),
            label(then),
            label(otherwise)
        ),
        Inst::Switch { ty, value: v, default, cases } => {
            let cases: Vec<String> = cases
                .iter()
                .map(|(c, b)| format!("{ty} {c}, label {}", label(b)))
                .collect();
            format!(
                "switch {ty} {}, label {} [ {} ]",
                value(v),
                label(default),
                cases.join(" ")
            )
        }
        Inst::Ret(None) => "ret void".to_string(),
        Inst::Ret(Some((ty, v))) => format!("ret {ty} {}", value(v)),
        Inst::Unreachable => "unreachable".to_string(),
    }
}

/// Module-level state shared by every function of one output unit.
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    pub counter: Counter,
    globals: Vec<String>,
    declarations: BTreeMap<String, String>,
    functions: Vec<String>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        ModuleBuilder::default()
    }

    /// Register an external declaration once per symbol.
    pub fn declare(&mut self, symbol: &str, line: impl Into<String>) {
        self.declarations
            .entry(symbol.to_string())
            .or_insert_with(|| line.into());
    }

    pub fn add_global(&mut self, line: impl Into<String>) {
        self.globals.push(line.into());
    }

    /// Add a private NUL-terminated byte string; returns its name and the
    /// array length including the terminator.
    pub fn string_constant(&mut self, bytes: &[u8]) -> (String, usize) {
        let name = format!("@.str{}", self.counter.next("@.str"));
        let mut text = String::new();
        for &b in bytes {
            if (b.is_ascii_graphic() && b != b'"' && b != b'\\') || b == b' ' {
                text.push(b as char);
            } else {
                let _ = write!(text, "\\{b:02X}");
            }
        }
        let len = bytes.len() + 1;
        self.globals.push(format!(
            "{name} = private unnamed_addr constant [{len} x i8] c\"{text}\\00\""
        ));
        (name, len)
    }

    pub fn add_function(&mut self, text: String) {
        self.functions.push(text);
    }

    pub fn render(&self, module_id: &str) -> String {
        let mut out = format!("; ModuleID = '{module_id}'\n\n%.nonprim = type {{ i8*, i8* }}\n");
        if !self.declarations.is_empty() {
            out.push('\n');
            for line in self.declarations.values() {
                out.push_str(line);
                out.push('\n');
            }
        }
        if !self.globals.is_empty() {
            out.push('\n');
            for line in &self.globals {
                out.push_str(line);
                out.push('\n');
            }
        }
        for function in &self.functions {
            out.push('\n');
            out.push_str(function);
        }
        out
    }
}
