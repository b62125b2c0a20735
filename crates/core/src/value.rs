//! Tagged value cells
//!
//! A `Value` is one fixed-shape cell: a kind tag plus a payload interpreted
//! per kind. Blocks are sequences of these cells; the evaluator reduces them
//! one expression at a time. The kind set is closed — every tag the
//! evaluator can meet is enumerated in [`Kind`], and dispatch tables are
//! indexed by it.
//!
//! Cells are cheap to clone: scalar payloads are inline, everything else is
//! a shared handle (`Rc`). The evaluator is single-tasked, so `Rc` is the
//! ownership vehicle throughout; only the symbol table is process-wide.

use crate::context::CtxRef;
use crate::error::ErrorData;
use crate::series::SeriesRef;
use crate::symbol::{self, Sym};
use bitflags::bitflags;
use std::fmt;
use std::rc::Rc;

/// Kind tag for a value cell.
///
/// The discriminants are stable: dispatch tables are arrays indexed by
/// `kind as usize`, and parameter type sets are bit sets over them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    End = 0,
    Unset,
    None,
    Logic,
    Integer,
    Decimal,
    Str,
    Word,
    SetWord,
    GetWord,
    LitWord,
    Refinement,
    Path,
    SetPath,
    GetPath,
    LitPath,
    Paren,
    Block,
    Object,
    Frame,
    Error,
    Native,
    Action,
    Command,
    Routine,
    Closure,
    Function,
}

impl Kind {
    /// Number of kinds (dispatch tables are this long).
    pub const COUNT: usize = 27;

    /// The datatype word for this kind.
    pub fn name(self) -> &'static str {
        match self {
            Kind::End => "end!",
            Kind::Unset => "unset!",
            Kind::None => "none!",
            Kind::Logic => "logic!",
            Kind::Integer => "integer!",
            Kind::Decimal => "decimal!",
            Kind::Str => "string!",
            Kind::Word => "word!",
            Kind::SetWord => "set-word!",
            Kind::GetWord => "get-word!",
            Kind::LitWord => "lit-word!",
            Kind::Refinement => "refinement!",
            Kind::Path => "path!",
            Kind::SetPath => "set-path!",
            Kind::GetPath => "get-path!",
            Kind::LitPath => "lit-path!",
            Kind::Paren => "paren!",
            Kind::Block => "block!",
            Kind::Object => "object!",
            Kind::Frame => "frame!",
            Kind::Error => "error!",
            Kind::Native => "native!",
            Kind::Action => "action!",
            Kind::Command => "command!",
            Kind::Routine => "routine!",
            Kind::Closure => "closure!",
            Kind::Function => "function!",
        }
    }

    /// True for every callable kind.
    pub fn is_function(self) -> bool {
        matches!(
            self,
            Kind::Native
                | Kind::Action
                | Kind::Command
                | Kind::Routine
                | Kind::Closure
                | Kind::Function
        )
    }

    /// True for the block-shaped kinds that share series storage.
    pub fn is_any_block(self) -> bool {
        matches!(
            self,
            Kind::Block
                | Kind::Paren
                | Kind::Path
                | Kind::SetPath
                | Kind::GetPath
                | Kind::LitPath
        )
    }
}

/// A set of kinds, used for parameter type checks.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TypeSet(u64);

impl TypeSet {
    pub const fn empty() -> Self {
        TypeSet(0)
    }

    const fn bit(kind: Kind) -> u64 {
        1u64 << (kind as u8)
    }

    /// Every kind except the END sentinel.
    pub const fn any_type() -> Self {
        TypeSet(((1u64 << Kind::COUNT) - 1) & !Self::bit(Kind::End))
    }

    /// The default set for an untyped parameter: any value except UNSET.
    /// Quoting parameters that rely on the end-of-series UNSET trick must
    /// opt into `unset!` explicitly.
    pub const fn default_param() -> Self {
        TypeSet(Self::any_type().0 & !Self::bit(Kind::Unset))
    }

    pub const fn with(self, kind: Kind) -> Self {
        TypeSet(self.0 | Self::bit(kind))
    }

    pub fn of(kinds: &[Kind]) -> Self {
        kinds.iter().fold(TypeSet::empty(), |s, &k| s.with(k))
    }

    pub const fn union(self, other: Self) -> Self {
        TypeSet(self.0 | other.0)
    }

    pub fn contains(self, kind: Kind) -> bool {
        self.0 & Self::bit(kind) != 0
    }

    /// Translate a datatype or typeset word from a function spec.
    pub fn from_type_word(name: &str) -> Option<TypeSet> {
        let set = match name {
            "unset!" => TypeSet::of(&[Kind::Unset]),
            "none!" => TypeSet::of(&[Kind::None]),
            "logic!" => TypeSet::of(&[Kind::Logic]),
            "integer!" => TypeSet::of(&[Kind::Integer]),
            "decimal!" => TypeSet::of(&[Kind::Decimal]),
            "string!" => TypeSet::of(&[Kind::Str]),
            "word!" => TypeSet::of(&[Kind::Word]),
            "set-word!" => TypeSet::of(&[Kind::SetWord]),
            "get-word!" => TypeSet::of(&[Kind::GetWord]),
            "lit-word!" => TypeSet::of(&[Kind::LitWord]),
            "refinement!" => TypeSet::of(&[Kind::Refinement]),
            "path!" => TypeSet::of(&[Kind::Path]),
            "block!" => TypeSet::of(&[Kind::Block]),
            "paren!" => TypeSet::of(&[Kind::Paren]),
            "object!" => TypeSet::of(&[Kind::Object]),
            "error!" => TypeSet::of(&[Kind::Error]),
            "number!" => TypeSet::of(&[Kind::Integer, Kind::Decimal]),
            "any-word!" => TypeSet::of(&[
                Kind::Word,
                Kind::SetWord,
                Kind::GetWord,
                Kind::LitWord,
                Kind::Refinement,
            ]),
            "any-block!" => TypeSet::of(&[
                Kind::Block,
                Kind::Paren,
                Kind::Path,
                Kind::SetPath,
                Kind::GetPath,
                Kind::LitPath,
            ]),
            "any-function!" => TypeSet::of(&[
                Kind::Native,
                Kind::Action,
                Kind::Command,
                Kind::Routine,
                Kind::Closure,
                Kind::Function,
            ]),
            "any-type!" => TypeSet::any_type(),
            _ => return None,
        };
        Some(set)
    }
}

impl fmt::Debug for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeSet({:#x})", self.0)
    }
}

/// Where a word resolves.
#[derive(Clone)]
pub enum Binding {
    /// Resolved against the task's lib context by spelling.
    Unbound,
    /// Bound to a function's parameter list; resolved against the most
    /// recent running call frame of that function.
    Relative { params: Rc<[Param]>, index: usize },
    /// Bound to a context slot by index.
    Bound { ctx: CtxRef, index: usize },
}

/// A word cell's payload: symbol plus binding.
#[derive(Clone)]
pub struct WordRef {
    pub sym: Sym,
    pub binding: Binding,
}

impl WordRef {
    pub fn unbound(sym: Sym) -> Self {
        WordRef {
            sym,
            binding: Binding::Unbound,
        }
    }

    pub fn named(name: &str) -> Self {
        WordRef::unbound(symbol::intern(name))
    }

    pub fn spelling(&self) -> &'static str {
        symbol::spelling(self.sym)
    }
}

// Bindings are invisible to value equality.
impl PartialEq for WordRef {
    fn eq(&self, other: &Self) -> bool {
        self.sym == other.sym
    }
}

impl fmt::Debug for WordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WordRef({})", self.spelling())
    }
}

bitflags! {
    /// Extension flags on function values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FuncFlags: u8 {
        /// Invoked via one-token lookahead with the prior value as arg 1.
        const INFIX = 1 << 0;
        /// A returned function flagged REDO is re-invoked as the new callee.
        const REDO = 1 << 1;
    }
}

/// Evaluation discipline of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    /// Normally evaluated argument.
    Normal,
    /// The literal next token, unevaluated (GET-WORD in the spec).
    Quoted,
    /// Literal unless the next token is a paren/get-word/get-path
    /// (LIT-WORD in the spec).
    Soft,
    /// Introduces an optional named group.
    Refinement,
    /// Reserved spec form (SET-WORD); raises at the call site.
    Reserved,
}

/// One parameter from a function spec.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Sym,
    pub class: ParamClass,
    pub types: TypeSet,
}

impl Param {
    pub fn normal(name: &str) -> Self {
        Param {
            name: symbol::intern(name),
            class: ParamClass::Normal,
            types: TypeSet::default_param(),
        }
    }

    pub fn with_class(name: &str, class: ParamClass) -> Self {
        Param {
            name: symbol::intern(name),
            class,
            types: TypeSet::default_param(),
        }
    }

    pub fn typed(name: &str, class: ParamClass, types: TypeSet) -> Self {
        Param {
            name: symbol::intern(name),
            class,
            types,
        }
    }
}

/// Callable class, one per dispatcher slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FuncClass {
    Native = 0,
    Action,
    Command,
    Routine,
    Closure,
    Function,
}

impl FuncClass {
    pub const COUNT: usize = 6;

    pub fn kind(self) -> Kind {
        match self {
            FuncClass::Native => Kind::Native,
            FuncClass::Action => Kind::Action,
            FuncClass::Command => Kind::Command,
            FuncClass::Routine => Kind::Routine,
            FuncClass::Closure => Kind::Closure,
            FuncClass::Function => Kind::Function,
        }
    }
}

/// A function value: class, flags, spec, and an implementation.
///
/// Natives and actions carry an index into the machine's registered
/// implementation table; user functions and closures carry a body block
/// whose words were bound at creation time.
pub struct FuncData {
    pub class: FuncClass,
    pub flags: FuncFlags,
    pub params: Rc<[Param]>,
    pub body: Option<SeriesRef>,
    pub native: Option<u32>,
}

impl FuncData {
    pub fn is_infix(&self) -> bool {
        self.flags.contains(FuncFlags::INFIX)
    }
}

impl fmt::Debug for FuncData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FuncData({:?}, {} params, flags {:?})",
            self.class,
            self.params.len(),
            self.flags
        )
    }
}

/// One value cell.
#[derive(Debug, Clone)]
pub enum Value {
    /// Sentinel past the last token of a block; never an evaluation result.
    End,
    Unset,
    None,
    Logic(bool),
    Integer(i64),
    Decimal(f64),
    Str(Rc<str>),
    Word(WordRef),
    SetWord(WordRef),
    GetWord(WordRef),
    LitWord(WordRef),
    Refinement(WordRef),
    Path(SeriesRef),
    SetPath(SeriesRef),
    GetPath(SeriesRef),
    LitPath(SeriesRef),
    Paren(SeriesRef),
    Block(SeriesRef),
    Object(CtxRef),
    Frame(CtxRef),
    Error(Rc<ErrorData>),
    Func(Rc<FuncData>),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::End => Kind::End,
            Value::Unset => Kind::Unset,
            Value::None => Kind::None,
            Value::Logic(_) => Kind::Logic,
            Value::Integer(_) => Kind::Integer,
            Value::Decimal(_) => Kind::Decimal,
            Value::Str(_) => Kind::Str,
            Value::Word(_) => Kind::Word,
            Value::SetWord(_) => Kind::SetWord,
            Value::GetWord(_) => Kind::GetWord,
            Value::LitWord(_) => Kind::LitWord,
            Value::Refinement(_) => Kind::Refinement,
            Value::Path(_) => Kind::Path,
            Value::SetPath(_) => Kind::SetPath,
            Value::GetPath(_) => Kind::GetPath,
            Value::LitPath(_) => Kind::LitPath,
            Value::Paren(_) => Kind::Paren,
            Value::Block(_) => Kind::Block,
            Value::Object(_) => Kind::Object,
            Value::Frame(_) => Kind::Frame,
            Value::Error(_) => Kind::Error,
            Value::Func(f) => f.class.kind(),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Value::Unset)
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Value::End)
    }

    /// Conditional truth: NONE and false are false, everything else true.
    /// (UNSET is treated as false by the apply refinement protocol.)
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::None | Value::Logic(false) | Value::Unset)
    }

    pub fn as_func(&self) -> Option<&Rc<FuncData>> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&SeriesRef> {
        match self {
            Value::Path(s)
            | Value::SetPath(s)
            | Value::GetPath(s)
            | Value::LitPath(s)
            | Value::Paren(s)
            | Value::Block(s) => Some(s),
            _ => None,
        }
    }

    /// Deep copy: block-shaped values copy their storage recursively,
    /// everything else clones the handle.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Path(s) => Value::Path(s.deep_copy()),
            Value::SetPath(s) => Value::SetPath(s.deep_copy()),
            Value::GetPath(s) => Value::GetPath(s.deep_copy()),
            Value::LitPath(s) => Value::LitPath(s.deep_copy()),
            Value::Paren(s) => Value::Paren(s.deep_copy()),
            Value::Block(s) => Value::Block(s.deep_copy()),
            other => other.clone(),
        }
    }

    // Constructors, mostly for natives and tests. The reader that would
    // normally produce these cells is a separate layer.

    pub fn int(n: i64) -> Value {
        Value::Integer(n)
    }

    pub fn decimal(n: f64) -> Value {
        Value::Decimal(n)
    }

    pub fn string(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn word(name: &str) -> Value {
        Value::Word(WordRef::named(name))
    }

    pub fn set_word(name: &str) -> Value {
        Value::SetWord(WordRef::named(name))
    }

    pub fn get_word(name: &str) -> Value {
        Value::GetWord(WordRef::named(name))
    }

    pub fn lit_word(name: &str) -> Value {
        Value::LitWord(WordRef::named(name))
    }

    pub fn refinement(name: &str) -> Value {
        Value::Refinement(WordRef::named(name))
    }

    pub fn block(cells: Vec<Value>) -> Value {
        Value::Block(SeriesRef::new(cells))
    }

    pub fn paren(cells: Vec<Value>) -> Value {
        Value::Paren(SeriesRef::new(cells))
    }

    pub fn path(cells: Vec<Value>) -> Value {
        Value::Path(SeriesRef::new(cells))
    }

    pub fn set_path(cells: Vec<Value>) -> Value {
        Value::SetPath(SeriesRef::new(cells))
    }

    pub fn get_path(cells: Vec<Value>) -> Value {
        Value::GetPath(SeriesRef::new(cells))
    }

    pub fn lit_path(cells: Vec<Value>) -> Value {
        Value::LitPath(SeriesRef::new(cells))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::End, Value::End) => true,
            (Value::Unset, Value::Unset) => true,
            (Value::None, Value::None) => true,
            (Value::Logic(a), Value::Logic(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Word(a), Value::Word(b)) => a == b,
            (Value::SetWord(a), Value::SetWord(b)) => a == b,
            (Value::GetWord(a), Value::GetWord(b)) => a == b,
            (Value::LitWord(a), Value::LitWord(b)) => a == b,
            (Value::Refinement(a), Value::Refinement(b)) => a == b,
            (Value::Path(a), Value::Path(b)) => a == b,
            (Value::SetPath(a), Value::SetPath(b)) => a == b,
            (Value::GetPath(a), Value::GetPath(b)) => a == b,
            (Value::LitPath(a), Value::LitPath(b)) => a == b,
            (Value::Paren(a), Value::Paren(b)) => a == b,
            (Value::Block(a), Value::Block(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Frame(a), Value::Frame(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => a.kind == b.kind,
            (Value::Func(a), Value::Func(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn fmt_series(f: &mut fmt::Formatter<'_>, s: &SeriesRef, sep: &str) -> fmt::Result {
    for (n, i) in (s.index..s.len()).enumerate() {
        if n > 0 {
            write!(f, "{}", sep)?;
        }
        if let Some(v) = s.get(i) {
            write!(f, "{}", v)?;
        }
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::End => write!(f, "#[end]"),
            Value::Unset => write!(f, "#[unset!]"),
            Value::None => write!(f, "none"),
            Value::Logic(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Decimal(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Word(w) => write!(f, "{}", w.spelling()),
            Value::SetWord(w) => write!(f, "{}:", w.spelling()),
            Value::GetWord(w) => write!(f, ":{}", w.spelling()),
            Value::LitWord(w) => write!(f, "'{}", w.spelling()),
            Value::Refinement(w) => write!(f, "/{}", w.spelling()),
            Value::Path(s) => fmt_series(f, s, "/"),
            Value::SetPath(s) => {
                fmt_series(f, s, "/")?;
                write!(f, ":")
            }
            Value::GetPath(s) => {
                write!(f, ":")?;
                fmt_series(f, s, "/")
            }
            Value::LitPath(s) => {
                write!(f, "'")?;
                fmt_series(f, s, "/")
            }
            Value::Paren(s) => {
                write!(f, "(")?;
                fmt_series(f, s, " ")?;
                write!(f, ")")
            }
            Value::Block(s) => {
                write!(f, "[")?;
                fmt_series(f, s, " ")?;
                write!(f, "]")
            }
            Value::Object(ctx) => write!(f, "make object! [{} words]", ctx.borrow().len()),
            Value::Frame(ctx) => write!(f, "make frame! [{} words]", ctx.borrow().len()),
            Value::Error(e) => write!(f, "make error! [{}]", e),
            Value::Func(d) => write!(f, "make {} [{} args]", d.class.kind().name(), d.params.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_of_scalars() {
        assert_eq!(Value::int(1).kind(), Kind::Integer);
        assert_eq!(Value::decimal(1.5).kind(), Kind::Decimal);
        assert_eq!(Value::Logic(true).kind(), Kind::Logic);
        assert_eq!(Value::None.kind(), Kind::None);
        assert_eq!(Value::Unset.kind(), Kind::Unset);
    }

    #[test]
    fn test_typeset_default_excludes_unset() {
        let set = TypeSet::default_param();
        assert!(set.contains(Kind::Integer));
        assert!(set.contains(Kind::Block));
        assert!(!set.contains(Kind::Unset));
        assert!(!set.contains(Kind::End));
    }

    #[test]
    fn test_typeset_from_type_word() {
        let num = TypeSet::from_type_word("number!").unwrap();
        assert!(num.contains(Kind::Integer));
        assert!(num.contains(Kind::Decimal));
        assert!(!num.contains(Kind::Str));
        assert!(TypeSet::from_type_word("any-type!").unwrap().contains(Kind::Unset));
        assert!(TypeSet::from_type_word("no-such-type!").is_none());
    }

    #[test]
    fn test_word_equality_ignores_case_and_binding() {
        assert_eq!(Value::word("Foo"), Value::word("foo"));
        assert_ne!(Value::word("foo"), Value::lit_word("foo"));
    }

    #[test]
    fn test_block_equality_is_deep() {
        let a = Value::block(vec![Value::int(1), Value::word("x")]);
        let b = Value::block(vec![Value::int(1), Value::word("x")]);
        let c = Value::block(vec![Value::int(2), Value::word("x")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display_forms() {
        let blk = Value::block(vec![
            Value::set_word("x"),
            Value::int(10),
            Value::lit_word("y"),
        ]);
        assert_eq!(format!("{}", blk), "[x: 10 'y]");
        let p = Value::path(vec![Value::word("obj"), Value::word("field")]);
        assert_eq!(format!("{}", p), "obj/field");
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::int(0).is_truthy());
        assert!(Value::string("").is_truthy());
        assert!(!Value::None.is_truthy());
        assert!(!Value::Logic(false).is_truthy());
    }
}
