//! Bootstrap natives
//!
//! The small native set installed at boot: enough arithmetic, series, and
//! control words to exercise the evaluator, plus `func`/`closure` which
//! turn spec and body blocks into callable values. Natives are ordinary
//! registered implementations behind the dispatcher ABI — the evaluator
//! knows nothing about any of them.

use crate::machine::Machine;
use quill_core::{
    ErrorKind, FuncClass, FuncData, FuncFlags, Kind, Param, ParamClass, SeriesRef, Thrown,
    TypeSet, Value,
};
use std::rc::Rc;

pub(crate) fn install(m: &mut Machine) {
    // Lib constants.
    m.set_lib("none", Value::None);
    m.set_lib("true", Value::Logic(true));
    m.set_lib("false", Value::Logic(false));
    m.set_lib("on", Value::Logic(true));
    m.set_lib("off", Value::Logic(false));
    m.set_lib("yes", Value::Logic(true));
    m.set_lib("no", Value::Logic(false));

    let number = TypeSet::from_type_word("number!").expect("known typeset");
    let block = TypeSet::from_type_word("block!").expect("known typeset");
    let any_block = TypeSet::from_type_word("any-block!").expect("known typeset");

    let pair = |m: &mut Machine, prefix: &str, infix: &str, f: crate::machine::NativeFn| {
        let params = || {
            vec![
                Param::typed("value1", ParamClass::Normal, number),
                Param::typed("value2", ParamClass::Normal, number),
            ]
        };
        register(m, prefix, params(), FuncFlags::empty(), f);
        register(m, infix, params(), FuncFlags::INFIX, f);
    };
    pair(m, "add", "+", add_native);
    pair(m, "subtract", "-", subtract_native);
    pair(m, "multiply", "*", multiply_native);

    register(
        m,
        "negate",
        vec![Param::typed("value", ParamClass::Normal, number)],
        FuncFlags::empty(),
        negate_native,
    );
    register(
        m,
        "first",
        vec![Param::typed("series", ParamClass::Normal, any_block)],
        FuncFlags::empty(),
        first_native,
    );
    register(
        m,
        "reverse",
        vec![Param::typed("series", ParamClass::Normal, block)],
        FuncFlags::empty(),
        reverse_native,
    );
    register(
        m,
        "append",
        vec![
            Param::typed("series", ParamClass::Normal, block),
            Param::normal("value"),
            Param::with_class("only", ParamClass::Refinement),
        ],
        FuncFlags::empty(),
        append_native,
    );
    register(
        m,
        "do",
        vec![Param::normal("value")],
        FuncFlags::empty(),
        do_native,
    );
    register(
        m,
        "reduce",
        vec![
            Param::normal("value"),
            Param::with_class("only", ParamClass::Refinement),
            Param::typed("words", ParamClass::Normal, TypeSet::of(&[Kind::Block, Kind::None])),
            Param::with_class("no-set", ParamClass::Refinement),
        ],
        FuncFlags::empty(),
        reduce_native,
    );
    register(
        m,
        "compose",
        vec![
            Param::typed("value", ParamClass::Normal, block),
            Param::with_class("deep", ParamClass::Refinement),
            Param::with_class("only", ParamClass::Refinement),
        ],
        FuncFlags::empty(),
        compose_native,
    );
    register(
        m,
        "throw",
        vec![Param::normal("value")],
        FuncFlags::empty(),
        throw_native,
    );
    register(
        m,
        "catch",
        vec![Param::typed("block", ParamClass::Normal, block)],
        FuncFlags::empty(),
        catch_native,
    );
    register(
        m,
        "try",
        vec![Param::typed("block", ParamClass::Normal, block)],
        FuncFlags::empty(),
        try_native,
    );
    register(
        m,
        "func",
        vec![
            Param::typed("spec", ParamClass::Normal, block),
            Param::typed("body", ParamClass::Normal, block),
        ],
        FuncFlags::empty(),
        func_native,
    );
    register(
        m,
        "closure",
        vec![
            Param::typed("spec", ParamClass::Normal, block),
            Param::typed("body", ParamClass::Normal, block),
        ],
        FuncFlags::empty(),
        closure_native,
    );
    register(
        m,
        "trace",
        vec![Param::typed(
            "mode",
            ParamClass::Normal,
            TypeSet::of(&[Kind::Integer, Kind::Logic]),
        )],
        FuncFlags::empty(),
        trace_native,
    );
}

fn register(
    m: &mut Machine,
    name: &str,
    params: Vec<Param>,
    flags: FuncFlags,
    f: crate::machine::NativeFn,
) {
    let index = m.register_native(f);
    let data = Rc::new(FuncData {
        class: FuncClass::Native,
        flags,
        params: params.into(),
        body: None,
        native: Some(index),
    });
    m.set_lib(name, Value::Func(data));
}

fn expect_block(m: &Machine, call: usize, i: usize) -> Result<SeriesRef, Thrown> {
    match m.frame_arg(call, i) {
        Value::Block(block) => Ok(block),
        other => Err(m.raise(ErrorKind::ArgType, vec![other])),
    }
}

// ---- arithmetic ----

fn arith(
    m: &Machine,
    a: Value,
    b: Value,
    int_op: fn(i64, i64) -> Option<i64>,
    dec_op: fn(f64, f64) -> f64,
) -> Result<Value, Thrown> {
    match (a, b) {
        (Value::Integer(a), Value::Integer(b)) => match int_op(a, b) {
            Some(n) => Ok(Value::Integer(n)),
            None => Err(m.raise(ErrorKind::Misc, vec![Value::string("integer overflow")])),
        },
        (Value::Integer(a), Value::Decimal(b)) => Ok(Value::Decimal(dec_op(a as f64, b))),
        (Value::Decimal(a), Value::Integer(b)) => Ok(Value::Decimal(dec_op(a, b as f64))),
        (Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(dec_op(a, b))),
        // Reachable through apply with absent arguments.
        (a, _) => Err(m.raise(ErrorKind::ArgType, vec![a])),
    }
}

fn add_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    arith(
        m,
        m.frame_arg(call, 0),
        m.frame_arg(call, 1),
        i64::checked_add,
        |a, b| a + b,
    )
}

fn subtract_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    arith(
        m,
        m.frame_arg(call, 0),
        m.frame_arg(call, 1),
        i64::checked_sub,
        |a, b| a - b,
    )
}

fn multiply_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    arith(
        m,
        m.frame_arg(call, 0),
        m.frame_arg(call, 1),
        i64::checked_mul,
        |a, b| a * b,
    )
}

fn negate_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    match m.frame_arg(call, 0) {
        Value::Integer(n) => match n.checked_neg() {
            Some(n) => Ok(Value::Integer(n)),
            None => Err(m.raise(ErrorKind::Misc, vec![Value::string("integer overflow")])),
        },
        Value::Decimal(n) => Ok(Value::Decimal(-n)),
        other => Err(m.raise(ErrorKind::ArgType, vec![other])),
    }
}

// ---- series ----

fn first_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    let value = m.frame_arg(call, 0);
    let Some(series) = value.as_series() else {
        return Err(m.raise(ErrorKind::ArgType, vec![value.clone()]));
    };
    match series.get(series.index) {
        Some(cell) => Ok(cell),
        None => Err(m.raise(ErrorKind::OutOfRange, vec![Value::int(1)])),
    }
}

fn reverse_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    let value = m.frame_arg(call, 0);
    if let Value::Block(series) = &value {
        series.reverse_tail();
    }
    Ok(value)
}

fn append_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    let target = m.frame_arg(call, 0);
    let value = m.frame_arg(call, 1);
    let only = m.frame_ref(call, 2);
    let Value::Block(series) = &target else {
        return Err(m.raise(ErrorKind::ArgType, vec![target.clone()]));
    };
    match &value {
        Value::Block(src) if !only => {
            for i in src.index..src.len() {
                if let Some(cell) = src.get(i) {
                    series.push(cell);
                }
            }
        }
        _ => series.push(value),
    }
    Ok(target)
}

// ---- control ----

fn do_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    match m.frame_arg(call, 0) {
        Value::Block(block) => m.do_block(&block),
        Value::Paren(paren) => m.do_block(&paren),
        other => Ok(other),
    }
}

fn reduce_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    let value = m.frame_arg(call, 0);
    let Value::Block(block) = &value else {
        // Non-blocks reduce to themselves.
        return Ok(value);
    };
    if m.frame_ref(call, 1) {
        let words = match m.frame_arg(call, 2) {
            Value::Block(words) => Some(words),
            _ => None,
        };
        m.reduce_only(block, words.as_ref(), None)
    } else if m.frame_ref(call, 3) {
        m.reduce_no_set(block, None)
    } else {
        m.reduce(block, None)
    }
}

fn compose_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    let block = expect_block(m, call, 0)?;
    let deep = m.frame_ref(call, 1);
    let only = m.frame_ref(call, 2);
    m.compose(&block, deep, only, None)
}

fn throw_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    Err(Thrown::value(m.frame_arg(call, 0)))
}

fn catch_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    let block = expect_block(m, call, 0)?;
    match m.rescue(|m| m.do_block(&block)) {
        Ok(value) => Ok(value),
        // Errors keep unwinding; only thrown values are caught.
        Err(Value::Error(e)) => Err(Thrown(Value::Error(e))),
        Err(thrown) => Ok(thrown),
    }
}

fn try_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    let block = expect_block(m, call, 0)?;
    match m.rescue(|m| m.do_block(&block)) {
        Ok(value) => Ok(value),
        Err(Value::Error(e)) if e.kind == ErrorKind::Halt => Err(Thrown(Value::Error(e))),
        // Errors become values; thrown non-errors keep unwinding.
        Err(Value::Error(e)) => Ok(Value::Error(e)),
        Err(thrown) => Err(Thrown::value(thrown)),
    }
}

fn trace_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    let flags = m.trace.flags;
    match m.frame_arg(call, 0) {
        Value::Integer(n) => m.set_trace(n as i32, flags),
        Value::Logic(true) => m.set_trace(100_000, flags),
        Value::Logic(false) => m.set_trace(0, flags),
        other => return Err(m.raise(ErrorKind::ArgType, vec![other])),
    }
    Ok(Value::Unset)
}

// ---- function creation ----

fn func_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    make_function(m, call, FuncClass::Function)
}

fn closure_native(m: &mut Machine, call: usize) -> Result<Value, Thrown> {
    make_function(m, call, FuncClass::Closure)
}

fn make_function(m: &mut Machine, call: usize, class: FuncClass) -> Result<Value, Thrown> {
    let spec = expect_block(m, call, 0)?;
    let body = expect_block(m, call, 1)?;
    let params: Rc<[Param]> = parse_spec(m, &spec)?.into();
    let body = body.deep_copy();
    match class {
        // Function bodies bind to the parameter list; closure bodies bind
        // per call, to the frame context built at dispatch.
        FuncClass::Function => crate::bind::bind_relative(&body, &params),
        FuncClass::Closure => {}
        _ => unreachable!(),
    }
    Ok(Value::Func(Rc::new(FuncData {
        class,
        flags: FuncFlags::empty(),
        params,
        body: Some(body),
        native: None,
    })))
}

/// Parse a spec block into parameters. Word forms choose the evaluation
/// discipline; a block following a parameter narrows its type set; strings
/// are documentation.
fn parse_spec(m: &Machine, spec: &SeriesRef) -> Result<Vec<Param>, Thrown> {
    let mut params: Vec<Param> = Vec::new();
    for i in spec.index..spec.len() {
        let cell = match spec.get(i) {
            Some(cell) => cell,
            None => break,
        };
        match &cell {
            Value::Word(w) => params.push(Param {
                name: w.sym,
                class: ParamClass::Normal,
                types: TypeSet::default_param(),
            }),
            Value::GetWord(w) => params.push(Param {
                name: w.sym,
                class: ParamClass::Quoted,
                types: TypeSet::default_param(),
            }),
            Value::LitWord(w) => params.push(Param {
                name: w.sym,
                class: ParamClass::Soft,
                types: TypeSet::default_param(),
            }),
            Value::Refinement(w) => params.push(Param {
                name: w.sym,
                class: ParamClass::Refinement,
                types: TypeSet::of(&[Kind::Logic, Kind::None]),
            }),
            // Reserved; the call site reports it when fulfillment reaches
            // the slot.
            Value::SetWord(w) => params.push(Param {
                name: w.sym,
                class: ParamClass::Reserved,
                types: TypeSet::default_param(),
            }),
            Value::Block(types) => {
                let Some(last) = params.last_mut() else {
                    return Err(m.raise(ErrorKind::InvalidArg, vec![cell.clone()]));
                };
                let mut set = TypeSet::empty();
                for j in types.index..types.len() {
                    let type_word = types.get(j);
                    let named = type_word.as_ref().and_then(|t| match t {
                        Value::Word(w) => TypeSet::from_type_word(w.spelling()),
                        _ => None,
                    });
                    match named {
                        Some(s) => set = set.union(s),
                        None => {
                            return Err(m.raise(
                                ErrorKind::InvalidArg,
                                vec![type_word.unwrap_or(Value::None)],
                            ))
                        }
                    }
                }
                last.types = set;
            }
            Value::Str(_) => {}
            _ => return Err(m.raise(ErrorKind::InvalidArg, vec![cell.clone()])),
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_lib_has_constants_and_natives() {
        let m = Machine::new();
        assert_eq!(m.get_lib("none"), Some(Value::None));
        assert_eq!(m.get_lib("true"), Some(Value::Logic(true)));
        assert!(matches!(m.get_lib("+"), Some(Value::Func(_))));
        let plus = m.get_lib("+").unwrap();
        assert!(plus.as_func().unwrap().is_infix());
        let add = m.get_lib("add").unwrap();
        assert!(!add.as_func().unwrap().is_infix());
    }

    #[test]
    fn test_arith_promotes_to_decimal() {
        let m = Machine::new();
        assert_eq!(
            arith(&m, Value::int(1), Value::int(2), i64::checked_add, |a, b| a + b).unwrap(),
            Value::int(3)
        );
        assert_eq!(
            arith(&m, Value::int(1), Value::decimal(0.5), i64::checked_add, |a, b| a + b)
                .unwrap(),
            Value::decimal(1.5)
        );
    }

    #[test]
    fn test_arith_overflow_is_an_error() {
        let m = Machine::new();
        let err = arith(
            &m,
            Value::int(i64::MAX),
            Value::int(1),
            i64::checked_add,
            |a, b| a + b,
        )
        .unwrap_err();
        assert_eq!(err.error_kind(), Some(ErrorKind::Misc));
    }

    #[test]
    fn test_parse_spec_classes() {
        let m = Machine::new();
        let spec = SeriesRef::new(vec![
            Value::string("docs"),
            Value::word("a"),
            Value::block(vec![Value::word("integer!")]),
            Value::get_word("b"),
            Value::lit_word("c"),
            Value::refinement("only"),
            Value::word("extra"),
        ]);
        let params = parse_spec(&m, &spec).unwrap();
        assert_eq!(params.len(), 5);
        assert_eq!(params[0].class, ParamClass::Normal);
        assert!(params[0].types.contains(Kind::Integer));
        assert!(!params[0].types.contains(Kind::Str));
        assert_eq!(params[1].class, ParamClass::Quoted);
        assert_eq!(params[2].class, ParamClass::Soft);
        assert_eq!(params[3].class, ParamClass::Refinement);
        assert_eq!(params[4].class, ParamClass::Normal);
    }

    #[test]
    fn test_parse_spec_rejects_leading_type_block() {
        let m = Machine::new();
        let spec = SeriesRef::new(vec![Value::block(vec![Value::word("integer!")])]);
        let err = parse_spec(&m, &spec).unwrap_err();
        assert_eq!(err.error_kind(), Some(ErrorKind::InvalidArg));
    }
}
