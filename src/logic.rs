//! The Logic Sub-language: parses and evaluates `if()`/`while()` condition
//! trees, and doubles as the representation for every conditional-property
//! `(value, condition)` pair elsewhere in the Build Model.

use std::cmp::Ordering;

use crate::parser::Arg;

/// Binary comparators recognized inside a `Compare` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    StrEqual,
    Equal,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    VersionLess,
    VersionGreater,
    VersionEqual,
    VersionLessEqual,
    VersionGreaterEqual,
}

impl Comparator {
    fn from_token(s: &str) -> Option<Self> {
        Some(match s {
            "STREQUAL" => Comparator::StrEqual,
            "EQUAL" => Comparator::Equal,
            "LESS" => Comparator::Less,
            "GREATER" => Comparator::Greater,
            "LESS_EQUAL" => Comparator::LessEqual,
            "GREATER_EQUAL" => Comparator::GreaterEqual,
            "VERSION_LESS" => Comparator::VersionLess,
            "VERSION_GREATER" => Comparator::VersionGreater,
            "VERSION_EQUAL" => Comparator::VersionEqual,
            "VERSION_LESS_EQUAL" => Comparator::VersionLessEqual,
            "VERSION_GREATER_EQUAL" => Comparator::VersionGreaterEqual,
            _ => return None,
        })
    }
}

/// A single logic operand: its literal text and whether it arrived quoted
/// (quoted operands are never treated as variable names during evaluation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    pub text: String,
    pub quoted: bool,
}

/// The condition tree. Reused, unmodified, as the representation of every
/// conditional-property `(value, condition)` pair in the Build Model, not
/// only `if`/`while` bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    True,
    False,
    /// A bare token evaluated for truthiness (numeric or the canonical
    /// CMake true/false spellings).
    Bool(Operand),
    Defined(Operand),
    /// `POLICY CMP####` — true if the evaluator recognizes the named policy
    /// id, independent of whether it's currently OLD/NEW/unset.
    Policy(String),
    Compare {
        lhs: Operand,
        op: Comparator,
        rhs: Operand,
    },
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

/// Anything that can resolve a CMake variable name to its current value.
/// The evaluator's scope stack implements this; tests use plain closures
/// via [`FnVarLookup`].
pub trait VarLookup {
    fn lookup(&self, name: &str) -> Option<String>;

    /// Whether a `POLICY CMP####` id is one this translator recognizes, for
    /// `if(POLICY CMP####)`. Defaults to `false` so plain test doubles built
    /// from a closure don't need to implement policy awareness.
    fn policy_known(&self, _id: &str) -> bool {
        false
    }
}

pub struct FnVarLookup<F: Fn(&str) -> Option<String>>(pub F);

impl<F: Fn(&str) -> Option<String>> VarLookup for FnVarLookup<F> {
    fn lookup(&self, name: &str) -> Option<String> {
        (self.0)(name)
    }
}

#[derive(Debug)]
pub struct LogicParseError {
    pub message: String,
}

/// Parses one `if`/`while`-style condition argument list into a [`Condition`]
/// tree, honoring precedence (highest to lowest): primary, comparisons,
/// `NOT`, `AND`, `OR`.
pub struct LogicParser {
    tokens: Vec<Operand>,
    pos: usize,
}

impl LogicParser {
    pub fn new(args: &[Arg]) -> Self {
        let tokens = args
            .iter()
            .map(|a| Operand { text: a.raw_text(), quoted: matches!(a.kind, crate::parser::ArgKind::Quoted) })
            .collect();
        LogicParser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Operand> {
        self.tokens.get(self.pos)
    }

    fn peek_text(&self) -> Option<&str> {
        self.peek().filter(|o| !o.quoted).map(|o| o.text.as_str())
    }

    fn advance(&mut self) -> Option<Operand> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn is_kw(&self, kw: &str) -> bool {
        self.peek_text() == Some(kw)
    }

    pub fn parse(mut self) -> Result<Condition, LogicParseError> {
        let cond = self.parse_or()?;
        if self.pos != self.tokens.len() {
            return Err(LogicParseError {
                message: format!("unexpected trailing token `{}`", self.tokens[self.pos].text),
            });
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Condition, LogicParseError> {
        let mut lhs = self.parse_and()?;
        while self.is_kw("OR") {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Condition::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Condition, LogicParseError> {
        let mut lhs = self.parse_not()?;
        while self.is_kw("AND") {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Condition::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Condition, LogicParseError> {
        if self.is_kw("NOT") {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Condition, LogicParseError> {
        let lhs_primary = self.parse_primary()?;
        if let Some(op_text) = self.peek_text() {
            if let Some(op) = Comparator::from_token(op_text) {
                let lhs = match lhs_primary {
                    Condition::Bool(op) => op,
                    other => {
                        return Err(LogicParseError {
                            message: format!("left side of comparison must be a plain operand, got {other:?}"),
                        })
                    }
                };
                self.advance();
                let rhs = self.advance().ok_or_else(|| LogicParseError {
                    message: "expected right-hand operand after comparator".to_string(),
                })?;
                return Ok(Condition::Compare { lhs, op, rhs });
            }
        }
        Ok(lhs_primary)
    }

    fn parse_primary(&mut self) -> Result<Condition, LogicParseError> {
        if self.is_kw("(") {
            self.advance();
            let inner = self.parse_or()?;
            if !self.is_kw(")") {
                return Err(LogicParseError { message: "expected ')'".to_string() });
            }
            self.advance();
            return Ok(inner);
        }
        if self.is_kw("DEFINED") {
            self.advance();
            let name = self.advance().ok_or_else(|| LogicParseError {
                message: "expected name after DEFINED".to_string(),
            })?;
            return Ok(Condition::Defined(name));
        }
        if self.is_kw("POLICY") {
            self.advance();
            let id = self.advance().ok_or_else(|| LogicParseError {
                message: "expected policy id after POLICY".to_string(),
            })?;
            return Ok(Condition::Policy(id.text));
        }
        if self.is_kw("TRUE") {
            self.advance();
            return Ok(Condition::True);
        }
        if self.is_kw("FALSE") {
            self.advance();
            return Ok(Condition::False);
        }
        let tok = self.advance().ok_or_else(|| LogicParseError {
            message: "expected an operand".to_string(),
        })?;
        Ok(Condition::Bool(tok))
    }
}

/// Convenience entry point mirroring the reference's combined
/// parse-then-evaluate call.
pub fn parse_and_evaluate(args: &[Arg], vars: &dyn VarLookup) -> Result<bool, LogicParseError> {
    let cond = LogicParser::new(args).parse()?;
    Ok(evaluate(&cond, vars))
}

/// Truthy per CMake's constant-folding rules: `ON`/`YES`/`TRUE`/`Y` and
/// non-zero numerics are true; `OFF`/`NO`/`FALSE`/`N`/`IGNORE`/`NOTFOUND`
/// (and anything ending in `-NOTFOUND`), empty string, and `0` are false.
/// Anything else is true only if it resolves to a defined, non-empty,
/// non-falsy variable.
fn is_truthy(raw: &str, quoted: bool, vars: &dyn VarLookup) -> bool {
    let resolved = if quoted {
        raw.to_string()
    } else {
        vars.lookup(raw).unwrap_or_else(|| raw.to_string())
    };
    constant_truthiness(&resolved)
}

fn constant_truthiness(s: &str) -> bool {
    let upper = s.to_ascii_uppercase();
    match upper.as_str() {
        "" | "0" | "OFF" | "NO" | "FALSE" | "N" | "IGNORE" | "NOTFOUND" => false,
        "ON" | "YES" | "TRUE" | "Y" => true,
        _ => {
            if upper.ends_with("-NOTFOUND") {
                return false;
            }
            match s.parse::<f64>() {
                Ok(n) => n != 0.0,
                Err(_) => true,
            }
        }
    }
}

fn resolve(op: &Operand, vars: &dyn VarLookup) -> String {
    if op.quoted {
        op.text.clone()
    } else {
        vars.lookup(&op.text).unwrap_or_else(|| op.text.clone())
    }
}

/// Lenient dotted-integer version ordering (CMake versions are not full
/// semver: `1.2` and `1.2.0.0` compare as equal-prefixed, missing
/// components treated as zero).
fn version_cmp(a: &str, b: &str) -> Ordering {
    let parse = |s: &str| -> Vec<u64> { s.split('.').map(|p| p.parse::<u64>().unwrap_or(0)).collect() };
    let av = parse(a);
    let bv = parse(b);
    let len = av.len().max(bv.len());
    for i in 0..len {
        let ac = av.get(i).copied().unwrap_or(0);
        let bc = bv.get(i).copied().unwrap_or(0);
        match ac.cmp(&bc) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Evaluates a parsed condition tree against a variable scope.
pub fn evaluate(cond: &Condition, vars: &dyn VarLookup) -> bool {
    match cond {
        Condition::True => true,
        Condition::False => false,
        Condition::Bool(op) => is_truthy(&op.text, op.quoted, vars),
        Condition::Defined(op) => vars.lookup(&op.text).is_some(),
        Condition::Policy(id) => vars.policy_known(id),
        Condition::Not(inner) => !evaluate(inner, vars),
        Condition::And(a, b) => evaluate(a, vars) && evaluate(b, vars),
        Condition::Or(a, b) => evaluate(a, vars) || evaluate(b, vars),
        Condition::Compare { lhs, op, rhs } => {
            let l = resolve(lhs, vars);
            let r = resolve(rhs, vars);
            match op {
                Comparator::StrEqual => l == r,
                Comparator::Equal => l.parse::<f64>().unwrap_or(0.0) == r.parse::<f64>().unwrap_or(0.0),
                Comparator::Less => l.parse::<f64>().unwrap_or(0.0) < r.parse::<f64>().unwrap_or(0.0),
                Comparator::Greater => l.parse::<f64>().unwrap_or(0.0) > r.parse::<f64>().unwrap_or(0.0),
                Comparator::LessEqual => l.parse::<f64>().unwrap_or(0.0) <= r.parse::<f64>().unwrap_or(0.0),
                Comparator::GreaterEqual => l.parse::<f64>().unwrap_or(0.0) >= r.parse::<f64>().unwrap_or(0.0),
                Comparator::VersionLess => version_cmp(&l, &r) == Ordering::Less,
                Comparator::VersionGreater => version_cmp(&l, &r) == Ordering::Greater,
                Comparator::VersionEqual => version_cmp(&l, &r) == Ordering::Equal,
                Comparator::VersionLessEqual => version_cmp(&l, &r) != Ordering::Greater,
                Comparator::VersionGreaterEqual => version_cmp(&l, &r) != Ordering::Less,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::diagnostics::DiagnosticSink;
    use std::collections::HashMap;

    fn args_from(src: &str) -> Vec<Arg> {
        let mut sink = DiagnosticSink::new();
        // Wrap in a fake command so the normal command parser can split args.
        let wrapped = format!("cond({src})");
        let wrapped_tokens = Lexer::new(&wrapped).tokenize_all();
        let mut parser = Parser::new(wrapped_tokens, &mut sink, None, 64, 64);
        let ast = parser.parse();
        match &ast[0] {
            crate::parser::Node::Command(cmd) => cmd.args.clone(),
            _ => panic!("expected command"),
        }
    }

    struct MapVars(HashMap<String, String>);
    impl VarLookup for MapVars {
        fn lookup(&self, name: &str) -> Option<String> {
            self.0.get(name).cloned()
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> MapVars {
        MapVars(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn bare_true_false_literals() {
        let v = vars(&[]);
        assert!(evaluate(&Condition::True, &v));
        assert!(!evaluate(&Condition::False, &v));
    }

    #[test]
    fn defined_checks_variable_presence() {
        let v = vars(&[("FOO", "1")]);
        let args = args_from("DEFINED FOO");
        let cond = LogicParser::new(&args).parse().unwrap();
        assert!(evaluate(&cond, &v));
        let args2 = args_from("DEFINED BAR");
        let cond2 = LogicParser::new(&args2).parse().unwrap();
        assert!(!evaluate(&cond2, &v));
    }

    #[test]
    fn strequal_comparison() {
        let v = vars(&[("A", "x"), ("B", "x")]);
        let args = args_from("A STREQUAL B");
        let cond = LogicParser::new(&args).parse().unwrap();
        assert!(evaluate(&cond, &v));
    }

    #[test]
    fn not_and_or_precedence() {
        let v = vars(&[("A", "1"), ("B", "0")]);
        // NOT B AND A  =>  (NOT B) AND A  => true
        let args = args_from("NOT B AND A");
        let cond = LogicParser::new(&args).parse().unwrap();
        assert!(evaluate(&cond, &v));
    }

    #[test]
    fn or_has_lower_precedence_than_and() {
        let v = vars(&[("A", "0"), ("B", "1"), ("C", "1")]);
        // A AND B OR C => (A AND B) OR C => true
        let args = args_from("A AND B OR C");
        let cond = LogicParser::new(&args).parse().unwrap();
        assert!(evaluate(&cond, &v));
    }

    #[test]
    fn version_comparisons_are_dotted_integer_lenient() {
        let v = vars(&[]);
        let args = args_from(r#""1.2" VERSION_LESS "1.10""#);
        let cond = LogicParser::new(&args).parse().unwrap();
        assert!(evaluate(&cond, &v));
    }

    #[test]
    fn falsy_constants() {
        let v = vars(&[]);
        for f in ["OFF", "NO", "FALSE", "N", "IGNORE", "0", "SOMETHING-NOTFOUND"] {
            assert!(!constant_truthiness(f), "{f} should be falsy");
        }
        for t in ["ON", "YES", "TRUE", "Y", "1", "anything-else"] {
            assert!(constant_truthiness(t), "{t} should be truthy");
        }
    }

    #[test]
    fn policy_predicate_consults_var_lookup_policy_known() {
        struct PolicyAwareVars;
        impl VarLookup for PolicyAwareVars {
            fn lookup(&self, _name: &str) -> Option<String> {
                None
            }
            fn policy_known(&self, id: &str) -> bool {
                id == "CMP0048"
            }
        }
        let v = PolicyAwareVars;
        let known = args_from("POLICY CMP0048");
        assert!(evaluate(&LogicParser::new(&known).parse().unwrap(), &v));
        let unknown = args_from("POLICY CMP9999");
        assert!(!evaluate(&LogicParser::new(&unknown).parse().unwrap(), &v));
    }

    #[test]
    fn parenthesized_grouping_overrides_precedence() {
        let v = vars(&[("A", "0"), ("B", "1"), ("C", "0")]);
        // A AND ( B OR C ) => 0 AND 1 => false
        let args = args_from("A AND ( B OR C )");
        let cond = LogicParser::new(&args).parse().unwrap();
        assert!(!evaluate(&cond, &v));
    }
}
