//! Integer expression evaluator.
//!
//! Classic shunting-yard: the infix text is converted to postfix using
//! an operator table held in data, then evaluated left to right with a
//! value stack (bounding depth to the operand count rather than
//! recursing). Grouping uses `{` and `}` — parentheses are taken by the
//! tokenizer for addressing-mode indirection and never reach this
//! module.
//!
//! All arithmetic is two's-complement signed 64-bit. An undefined label
//! evaluates to 0 on non-final passes; on the final pass it is an error.

use crate::codepage::Codepage;
use crate::label::{LabelKind, LabelStore};

/// Everything an expression can see: the label store, the current PC
/// (for `$`), whether undefined labels are fatal yet, and the code page
/// for character literals.
pub struct ExprCtx<'a> {
    pub labels: &'a LabelStore,
    pub pc: i64,
    pub final_pass: bool,
    pub codepage: Codepage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    LParen,
    RParen,
    Not,
    UnaryPlus,
    UnaryNeg,
    ShiftLeft,
    ShiftRight,
    Multiply,
    Divide,
    Add,
    Subtract,
    Equal,
    NotEqual,
    LessEq,
    GreaterEq,
    Less,
    Greater,
    BoolAnd,
    And,
    BoolOr,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Binary,
    /// Grouping open: must follow an operator like a unary does, but is
    /// never applied to a value.
    PretendUnary,
    Unary,
}

struct OpInfo {
    symbol: &'static str,
    priority: i32,
    op: Op,
    kind: OpKind,
    /// Whether the next token may be a unary operator.
    allow_unary: bool,
}

/// Walked in order; multi-character operators sit before their
/// single-character prefixes so `<<` wins over `<`.
static OP_INFO: &[OpInfo] = &[
    // Unary operators must come first. `{` is "pretend unary": it is
    // only legal where an operand would be.
    OpInfo { symbol: "~", priority: 9, op: Op::Not, kind: OpKind::Unary, allow_unary: true },
    OpInfo { symbol: "+", priority: 9, op: Op::UnaryPlus, kind: OpKind::Unary, allow_unary: true },
    OpInfo { symbol: "-", priority: 9, op: Op::UnaryNeg, kind: OpKind::Unary, allow_unary: true },
    OpInfo { symbol: "{", priority: 99, op: Op::LParen, kind: OpKind::PretendUnary, allow_unary: true },
    OpInfo { symbol: "}", priority: 99, op: Op::RParen, kind: OpKind::Binary, allow_unary: false },
    OpInfo { symbol: "<<", priority: 6, op: Op::ShiftLeft, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: ">>", priority: 6, op: Op::ShiftRight, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: "*", priority: 5, op: Op::Multiply, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: "/", priority: 5, op: Op::Divide, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: "+", priority: 4, op: Op::Add, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: "-", priority: 4, op: Op::Subtract, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: "==", priority: 1, op: Op::Equal, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: "!=", priority: 1, op: Op::NotEqual, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: "<=", priority: 1, op: Op::LessEq, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: ">=", priority: 1, op: Op::GreaterEq, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: "<", priority: 1, op: Op::Less, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: ">", priority: 1, op: Op::Greater, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: "&&", priority: 0, op: Op::BoolAnd, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: "&", priority: 0, op: Op::And, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: "||", priority: 0, op: Op::BoolOr, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: "|", priority: 0, op: Op::Or, kind: OpKind::Binary, allow_unary: true },
    OpInfo { symbol: "^", priority: 0, op: Op::Xor, kind: OpKind::Binary, allow_unary: true },
];

const OPERATOR_CHARS: &str = "{}/*+-~&|^<>=!";

fn is_operator_char(c: char) -> bool {
    OPERATOR_CHARS.contains(c)
}

fn symbol_of(op: Op) -> &'static str {
    OP_INFO
        .iter()
        .find(|i| i.op == op)
        .map(|i| i.symbol)
        .unwrap_or("?")
}

#[derive(Debug, Clone)]
enum PostfixItem {
    Operand(String),
    Operator(Op, OpKind),
}

struct StackedOp {
    op: Op,
    priority: i32,
    unary: bool,
}

fn find_op(rest: &str, prev_was_op: bool) -> Result<&'static OpInfo, String> {
    let mut prefix_hit = false;

    for info in OP_INFO {
        if rest.starts_with(info.symbol) {
            prefix_hit = true;

            let fits = if prev_was_op {
                info.kind != OpKind::Binary
            } else {
                info.kind == OpKind::Binary
            };

            if fits {
                return Ok(info);
            }
        }
    }

    let c = rest.chars().next().unwrap_or('?');
    if prefix_hit {
        Err(format!("Syntax error with operator {c}"))
    } else {
        Err(format!("Unknown operator {c}"))
    }
}

fn to_postfix(expr: &str) -> Result<Vec<PostfixItem>, String> {
    let mut stack: Vec<StackedOp> = Vec::new();
    let mut output: Vec<PostfixItem> = Vec::new();
    let mut rest = expr;
    let mut prev_was_op = true;

    while !rest.is_empty() {
        let c = rest.chars().next().unwrap();

        if is_operator_char(c) {
            let info = find_op(rest, prev_was_op)?;

            if info.op == Op::RParen {
                loop {
                    match stack.pop() {
                        None => return Err("Missing {".to_string()),
                        Some(top) if top.op == Op::LParen => break,
                        Some(top) => output.push(PostfixItem::Operator(
                            top.op,
                            if top.unary { OpKind::Unary } else { OpKind::Binary },
                        )),
                    }
                }
            } else {
                // Pop operators of equal or higher precedence; a unary
                // operator never pops another unary (it binds tighter to
                // the right), and nothing pops across a group.
                while let Some(top) = stack.last() {
                    if top.op == Op::LParen || top.priority < info.priority {
                        break;
                    }
                    if info.kind == OpKind::Unary && top.unary {
                        break;
                    }
                    let top = stack.pop().unwrap();
                    output.push(PostfixItem::Operator(
                        top.op,
                        if top.unary { OpKind::Unary } else { OpKind::Binary },
                    ));
                }

                stack.push(StackedOp {
                    op: info.op,
                    priority: info.priority,
                    unary: info.kind == OpKind::Unary,
                });
            }

            rest = &rest[info.symbol.len()..];
            prev_was_op = info.allow_unary;
        } else {
            let end = rest
                .find(|c: char| c == ' ' || c == '\t' || is_operator_char(c))
                .unwrap_or(rest.len());
            output.push(PostfixItem::Operand(rest[..end].to_string()));
            rest = &rest[end..];
            prev_was_op = false;
        }

        rest = rest.trim_start();
    }

    while let Some(top) = stack.pop() {
        if top.op == Op::LParen {
            return Err("Missing }".to_string());
        }
        output.push(PostfixItem::Operator(
            top.op,
            if top.unary { OpKind::Unary } else { OpKind::Binary },
        ));
    }

    Ok(output)
}

fn parse_radix(digits: &str, radix: u32) -> Option<i64> {
    if digits.is_empty() {
        return None;
    }
    i64::from_str_radix(digits, radix).ok()
}

/// Resolve a single operand: `$` (the PC), a label in the current
/// scope, or an integer literal in any of the accepted notations.
fn resolve_operand(ctx: &ExprCtx, text: &str) -> Result<i64, String> {
    if text == "$" {
        return Ok(ctx.pc);
    }

    if let Some(label) = ctx.labels.find(text, LabelKind::Any) {
        return Ok(label.value);
    }

    let value = if let Some(hex) = text.strip_prefix('$') {
        parse_radix(hex, 16)
    } else if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        parse_radix(hex, 16)
    } else if text.len() > 1 && (text.ends_with('h') || text.ends_with('H')) {
        parse_radix(&text[..text.len() - 1], 16)
    } else if let Some(bin) = text.strip_prefix('%') {
        parse_radix(bin, 2)
    } else if text.len() > 1
        && (text.ends_with('b') || text.ends_with('B'))
        && text[..text.len() - 1].bytes().all(|c| c == b'0' || c == b'1')
    {
        parse_radix(&text[..text.len() - 1], 2)
    } else if text.len() == 3 && text.starts_with('\'') && text.ends_with('\'') {
        Some(i64::from(ctx.codepage.convert(text.chars().nth(1).unwrap())))
    } else {
        parse_radix(text, 10)
    };

    match value {
        Some(v) => Ok(v),
        None if ctx.final_pass => Err(format!("Invalid value '{text}'")),
        // Forward reference still being discovered; another pass fixes
        // it up.
        None => Ok(0),
    }
}

fn apply_unary(op: Op, v: i64) -> Result<i64, String> {
    match op {
        Op::Not => Ok(!v),
        Op::UnaryPlus => Ok(v),
        Op::UnaryNeg => Ok(v.wrapping_neg()),
        _ => Err(format!("Unexpected unary operator '{}'", symbol_of(op))),
    }
}

fn apply_binary(op: Op, left: i64, right: i64) -> Result<i64, String> {
    match op {
        Op::Divide => {
            if right == 0 {
                return Err("Division by zero".to_string());
            }
            Ok(left.wrapping_div(right))
        }
        Op::Multiply => Ok(left.wrapping_mul(right)),
        Op::Add => Ok(left.wrapping_add(right)),
        Op::Subtract => Ok(left.wrapping_sub(right)),
        Op::And => Ok(left & right),
        Op::Or => Ok(left | right),
        Op::Xor => Ok(left ^ right),
        Op::BoolAnd => Ok(i64::from(left != 0 && right != 0)),
        Op::BoolOr => Ok(i64::from(left != 0 || right != 0)),
        Op::ShiftLeft => {
            if right < 0 {
                return Err(format!("Cannot shift left by a negative number ({right})"));
            }
            Ok(left.wrapping_shl(right as u32))
        }
        Op::ShiftRight => {
            if right < 0 {
                return Err(format!("Cannot shift right by a negative number ({right})"));
            }
            // Arithmetic shift: sign bits come in from the left.
            Ok(left.wrapping_shr(right as u32))
        }
        Op::Equal => Ok(i64::from(left == right)),
        Op::NotEqual => Ok(i64::from(left != right)),
        Op::Less => Ok(i64::from(left < right)),
        Op::Greater => Ok(i64::from(left > right)),
        Op::LessEq => Ok(i64::from(left <= right)),
        Op::GreaterEq => Ok(i64::from(left >= right)),
        Op::LParen | Op::RParen => Err("Missing }".to_string()),
        _ => Err(format!("Unexpected binary operator '{}'", symbol_of(op))),
    }
}

/// Evaluate an expression to a signed integer.
pub fn eval(ctx: &ExprCtx, expr: &str) -> Result<i64, String> {
    let postfix = to_postfix(expr)?;
    let mut values: Vec<i64> = Vec::new();

    for item in postfix {
        match item {
            PostfixItem::Operand(text) => values.push(resolve_operand(ctx, &text)?),
            PostfixItem::Operator(op, OpKind::Unary) => {
                let v = values.pop().ok_or_else(|| {
                    format!("Operator '{}' expects an argument", symbol_of(op))
                })?;
                values.push(apply_unary(op, v)?);
            }
            PostfixItem::Operator(op, _) => {
                let right = values.pop();
                let left = values.pop();
                match (left, right) {
                    (Some(l), Some(r)) => values.push(apply_binary(op, l, r)?),
                    _ => {
                        return Err(format!(
                            "Operator '{}' expects two arguments (unknown label?)",
                            symbol_of(op)
                        ));
                    }
                }
            }
        }
    }

    values.pop().ok_or_else(|| "Empty expression".to_string())
}

/// Fold a signed value into an `bits`-wide unsigned one, two's
/// complement: `to_unsigned(8, -1)` is 255.
pub fn to_unsigned(bits: u32, value: i64) -> i64 {
    value & ((1i64 << bits) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::LabelStore;

    fn ctx(labels: &LabelStore) -> ExprCtx<'_> {
        ExprCtx { labels, pc: 0x8000, final_pass: true, codepage: Codepage::Ascii }
    }

    fn ev(expr: &str) -> i64 {
        let labels = LabelStore::new();
        eval(&ctx(&labels), expr).unwrap()
    }

    #[test]
    fn test_literals() {
        assert_eq!(ev("42"), 42);
        assert_eq!(ev("$ff"), 255);
        assert_eq!(ev("0x10"), 16);
        assert_eq!(ev("10h"), 16);
        assert_eq!(ev("%101"), 5);
        assert_eq!(ev("101b"), 5);
        assert_eq!(ev("'A'"), 65);
    }

    #[test]
    fn test_grouping_with_braces() {
        assert_eq!(ev("{1+2}*3"), 9);
        assert_eq!(ev("1+2*3"), 7);
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(ev("$ff & 0x0f"), 15);
        assert_eq!(ev("1 | 6"), 7);
        assert_eq!(ev("3 ^ 1"), 2);
        assert_eq!(ev("~0"), -1);
    }

    #[test]
    fn test_arithmetic_shift_right() {
        assert_eq!(ev("-1 >> 1"), -1);
        assert_eq!(ev("-4 >> 1"), -2);
        assert_eq!(ev("1 << 4"), 16);
    }

    #[test]
    fn test_negative_shift_is_error() {
        let labels = LabelStore::new();
        assert!(eval(&ctx(&labels), "1 << -1").is_err());
        assert!(eval(&ctx(&labels), "1 >> {0-1}").is_err());
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(ev("1 == 1"), 1);
        assert_eq!(ev("1 != 1"), 0);
        assert_eq!(ev("2 >= 2"), 1);
        assert_eq!(ev("1 < 2 && 2 < 3"), 1);
        assert_eq!(ev("0 || 5"), 1);
    }

    #[test]
    fn test_unary() {
        assert_eq!(ev("-5 + 10"), 5);
        assert_eq!(ev("+7"), 7);
        assert_eq!(ev("-{2+3}"), -5);
    }

    #[test]
    fn test_truncating_division() {
        assert_eq!(ev("7 / 2"), 3);
        assert_eq!(ev("-7 / 2"), -3);
    }

    #[test]
    fn test_division_by_zero() {
        let labels = LabelStore::new();
        assert!(eval(&ctx(&labels), "1 / 0").is_err());
    }

    #[test]
    fn test_dollar_is_pc() {
        assert_eq!(ev("$"), 0x8000);
        assert_eq!(ev("$ + 2"), 0x8002);
    }

    #[test]
    fn test_labels_resolve() {
        let mut labels = LabelStore::new();
        labels.set("screen", 0x4000, LabelKind::Global).unwrap();
        assert_eq!(eval(&ctx(&labels), "screen + 32").unwrap(), 0x4020);
    }

    #[test]
    fn test_undefined_label() {
        let labels = LabelStore::new();
        assert!(eval(&ctx(&labels), "nowhere").is_err());

        let lenient =
            ExprCtx { labels: &labels, pc: 0, final_pass: false, codepage: Codepage::Ascii };
        assert_eq!(eval(&lenient, "nowhere").unwrap(), 0);
    }

    #[test]
    fn test_unbalanced_groups() {
        let labels = LabelStore::new();
        assert!(eval(&ctx(&labels), "{1+2").is_err());
        assert!(eval(&ctx(&labels), "1+2}").is_err());
    }

    #[test]
    fn test_to_unsigned() {
        assert_eq!(to_unsigned(8, -1), 255);
        assert_eq!(to_unsigned(8, 0x1ff), 0xff);
        assert_eq!(to_unsigned(16, -2), 0xfffe);
        assert_eq!(to_unsigned(16, 0x1234), 0x1234);
    }
}
