//! Condition parsing and evaluation

use std::collections::HashMap;

/// Local integer variables of one interpreter
pub type Locals = HashMap<String, i64>;

/// Parse a leading integer the way C `stoll` does: optional whitespace,
/// optional sign, then at least one digit. Trailing text is ignored.
pub fn parse_int(text: &str) -> Option<i64> {
    let s = text.trim_start();
    let sign_len = usize::from(s.starts_with('-') || s.starts_with('+'));
    let digits = s[sign_len..].bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    s[..sign_len + digits].parse().ok()
}

/// Relational operator, listed in match priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Le,
    Ge,
    Eq,
    Ne,
    Lt,
    Gt,
}

impl CompareOp {
    /// Two-character operators come first so `<=` is never read as `<`
    pub const ALL: [Self; 6] = [Self::Le, Self::Ge, Self::Eq, Self::Ne, Self::Lt, Self::Gt];

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
        }
    }

    #[must_use]
    pub fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Self::Le => lhs <= rhs,
            Self::Ge => lhs >= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Gt => lhs > rhs,
        }
    }
}

/// A parsed `while`/`if` condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `lhs OP rhs`, each side a local variable name or an integer literal
    Compare {
        lhs: String,
        op: CompareOp,
        rhs: String,
    },
    /// No operator: a literal that is true when nonzero
    Literal(Option<i64>),
}

impl Condition {
    pub fn parse(expr: &str) -> Self {
        let expr = expr.trim();
        for op in CompareOp::ALL {
            if let Some((lhs, rhs)) = expr.split_once(op.symbol()) {
                return Self::Compare {
                    lhs: lhs.trim().to_string(),
                    op,
                    rhs: rhs.trim().to_string(),
                };
            }
        }
        Self::Literal(parse_int(expr))
    }

    pub fn eval(&self, locals: &Locals) -> bool {
        match self {
            Self::Compare { lhs, op, rhs } => op.apply(operand(lhs, locals), operand(rhs, locals)),
            Self::Literal(value) => value.is_some_and(|v| v != 0),
        }
    }
}

/// Variables shadow literals; anything unresolvable reads as 0
fn operand(text: &str, locals: &Locals) -> i64 {
    locals
        .get(text)
        .copied()
        .or_else(|| parse_int(text))
        .unwrap_or(0)
}
