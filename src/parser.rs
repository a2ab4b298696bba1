//! Token stream -> AST. Recovers from local syntax errors; enforces
//! nesting-depth limits from [`crate::config::ParserLimits`].

use crate::diagnostics::{Diagnostic, DiagnosticSink, Origin, Severity};
use crate::lexer::{Lexer, Token, TokenKind};

/// Whether an [`Arg`]'s token run was quoted, bracketed, or bare. This
/// distinction governs later variable expansion and semicolon splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Unquoted,
    Quoted,
    Bracketed,
}

/// One logical command argument: a maximal run of adjacent tokens with no
/// leading whitespace between them.
#[derive(Debug, Clone)]
pub struct Arg {
    pub kind: ArgKind,
    pub tokens: Vec<Token>,
    pub line: usize,
    pub col: usize,
}

impl Arg {
    /// The raw concatenated text of the argument (tokens joined verbatim).
    pub fn raw_text(&self) -> String {
        self.tokens.iter().map(|t| t.text.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub args: Vec<Arg>,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub cond: Vec<Arg>,
    pub then_block: Vec<Node>,
    pub elseif_clauses: Vec<(Vec<Arg>, Vec<Node>)>,
    pub else_block: Option<Vec<Node>>,
}

#[derive(Debug, Clone)]
pub struct ForeachStmt {
    pub header: Vec<Arg>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub cond: Vec<Arg>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct FuncDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Node>,
}

/// AST node: one of command or control-flow block, a closed sum.
#[derive(Debug, Clone)]
pub enum Node {
    Command(Command),
    If(IfStmt),
    Foreach(ForeachStmt),
    While(WhileStmt),
    FunctionDef(FuncDef),
    MacroDef(FuncDef),
}

pub type AstRoot = Vec<Node>;

struct TokenCursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenCursor {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at_end(&self) -> bool {
        self.peek().kind == TokenKind::End
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }
}

/// Parses a token stream into an AST, reporting recoverable errors via
/// `sink` and stopping recursion at configured depth limits.
pub struct Parser<'a> {
    cursor: TokenCursor,
    sink: &'a mut DiagnosticSink,
    file: Option<std::path::PathBuf>,
    max_block_depth: usize,
    max_paren_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(
        tokens: Vec<Token>,
        sink: &'a mut DiagnosticSink,
        file: Option<std::path::PathBuf>,
        max_block_depth: usize,
        max_paren_depth: usize,
    ) -> Self {
        Parser {
            cursor: TokenCursor { tokens, pos: 0 },
            sink,
            file,
            max_block_depth,
            max_paren_depth,
        }
    }

    fn error(&mut self, tok: &Token, msg: impl Into<String>) {
        self.sink.log(
            Diagnostic::new(Severity::Error, "parser", msg.into())
                .with_origin(self.file.clone(), tok.line, tok.col),
        );
    }

    /// `program := node*`
    pub fn parse(&mut self) -> AstRoot {
        self.parse_block(0)
    }

    fn parse_block(&mut self, depth: usize) -> Vec<Node> {
        let mut nodes = Vec::new();
        while !self.cursor.at_end() {
            if self.at_block_terminator() {
                break;
            }
            if let Some(node) = self.parse_node(depth) {
                nodes.push(node);
            } else if !self.cursor.at_end() {
                // Error recovery already advanced past the offending token.
            }
        }
        nodes
    }

    fn at_block_terminator(&self) -> bool {
        if self.cursor.peek().kind != TokenKind::Identifier {
            return false;
        }
        matches!(
            self.cursor.peek().text.to_ascii_lowercase().as_str(),
            "endif" | "elseif" | "else" | "endforeach" | "endwhile" | "endfunction" | "endmacro"
        )
    }

    fn parse_node(&mut self, depth: usize) -> Option<Node> {
        let tok = self.cursor.peek().clone();
        if tok.kind != TokenKind::Identifier {
            self.error(&tok, format!("expected a command name, found {:?}", tok.kind));
            self.cursor.advance();
            return None;
        }
        let lowered = tok.text.to_ascii_lowercase();
        match lowered.as_str() {
            "if" => self.parse_if(depth).map(Node::If),
            "foreach" => self.parse_foreach(depth).map(Node::Foreach),
            "while" => self.parse_while(depth).map(Node::While),
            "function" => self.parse_funcdef(depth, false).map(Node::FunctionDef),
            "macro" => self.parse_funcdef(depth, true).map(Node::MacroDef),
            _ => self.parse_command().map(Node::Command),
        }
    }

    /// `command := identifier '(' argument* ')'`
    fn parse_command(&mut self) -> Option<Command> {
        let name_tok = self.cursor.advance();
        let line = name_tok.line;
        let col = name_tok.col;
        if self.cursor.peek().kind != TokenKind::LParen {
            self.error(&name_tok, format!("expected '(' after command `{}`", name_tok.text));
            return None;
        }
        self.cursor.advance(); // consume '('
        let args = self.parse_args(0);
        if self.cursor.peek().kind != TokenKind::RParen {
            self.error(self.cursor.peek(), format!("missing ')' for command `{}`", name_tok.text));
            // Recover at next newline-equivalent: we don't track raw
            // newlines post-lex, so recover at the next top-level token.
        } else {
            self.cursor.advance();
        }
        Some(Command { name: name_tok.text, args, line, col })
    }

    /// Parses a maximal run of arguments inside one set of parens, splitting
    /// on depth-1 semicolons; nested parens pass through as literal tokens.
    fn parse_args(&mut self, paren_depth: usize) -> Vec<Arg> {
        let mut args = Vec::new();
        let mut current: Option<Arg> = None;

        loop {
            let tok = self.cursor.peek().clone();
            match tok.kind {
                TokenKind::End => break,
                TokenKind::RParen if paren_depth == 0 => break,
                TokenKind::Semicolon if paren_depth == 0 => {
                    self.cursor.advance();
                    if let Some(arg) = current.take() {
                        args.push(arg);
                    }
                }
                TokenKind::LParen => {
                    if paren_depth + 1 > self.max_paren_depth {
                        self.error(&tok, "maximum parenthesis depth exceeded");
                        self.cursor.advance();
                        continue;
                    }
                    self.cursor.advance();
                    self.push_raw_token(&mut current, tok.clone());
                    let nested = self.parse_args(paren_depth + 1);
                    for nested_arg in nested {
                        for t in nested_arg.tokens {
                            self.push_raw_token(&mut current, t);
                        }
                    }
                    if self.cursor.peek().kind == TokenKind::RParen {
                        let close = self.cursor.advance();
                        self.push_raw_token(&mut current, close);
                    }
                }
                TokenKind::RParen => {
                    // Closes a nested paren group; let the caller handle it.
                    break;
                }
                _ => {
                    self.cursor.advance();
                    self.push_raw_token(&mut current, tok);
                }
            }
        }

        if let Some(arg) = current.take() {
            args.push(arg);
        }
        args
    }

    fn push_raw_token(&self, current: &mut Option<Arg>, tok: Token) {
        match current {
            Some(arg) if !tok.has_space_left => {
                arg.tokens.push(tok);
            }
            _ => {
                let kind = match tok.kind {
                    TokenKind::String => ArgKind::Quoted,
                    TokenKind::RawString => ArgKind::Bracketed,
                    _ => ArgKind::Unquoted,
                };
                *current = Some(Arg { kind, line: tok.line, col: tok.col, tokens: vec![tok] });
            }
        }
    }

    fn parse_if(&mut self, depth: usize) -> Option<IfStmt> {
        if depth + 1 > self.max_block_depth {
            self.error(self.cursor.peek(), "maximum block nesting depth exceeded");
            self.cursor.advance();
            return None;
        }
        let if_cmd = self.parse_command()?;
        let then_block = self.parse_block(depth + 1);

        let mut elseif_clauses = Vec::new();
        while self.is_keyword("elseif") {
            let elseif_cmd = self.parse_command()?;
            let block = self.parse_block(depth + 1);
            elseif_clauses.push((elseif_cmd.args, block));
        }

        let else_block = if self.is_keyword("else") {
            self.parse_command()?;
            Some(self.parse_block(depth + 1))
        } else {
            None
        };

        if self.is_keyword("endif") {
            self.parse_command()?;
        } else {
            self.error(self.cursor.peek(), "missing endif()");
        }

        Some(IfStmt { cond: if_cmd.args, then_block, elseif_clauses, else_block })
    }

    fn parse_foreach(&mut self, depth: usize) -> Option<ForeachStmt> {
        if depth + 1 > self.max_block_depth {
            self.error(self.cursor.peek(), "maximum block nesting depth exceeded");
            self.cursor.advance();
            return None;
        }
        let cmd = self.parse_command()?;
        let body = self.parse_block(depth + 1);
        if self.is_keyword("endforeach") {
            self.parse_command()?;
        } else {
            self.error(self.cursor.peek(), "missing endforeach()");
        }
        Some(ForeachStmt { header: cmd.args, body })
    }

    fn parse_while(&mut self, depth: usize) -> Option<WhileStmt> {
        if depth + 1 > self.max_block_depth {
            self.error(self.cursor.peek(), "maximum block nesting depth exceeded");
            self.cursor.advance();
            return None;
        }
        let cmd = self.parse_command()?;
        let body = self.parse_block(depth + 1);
        if self.is_keyword("endwhile") {
            self.parse_command()?;
        } else {
            self.error(self.cursor.peek(), "missing endwhile()");
        }
        Some(WhileStmt { cond: cmd.args, body })
    }

    fn parse_funcdef(&mut self, depth: usize, is_macro: bool) -> Option<FuncDef> {
        if depth + 1 > self.max_block_depth {
            self.error(self.cursor.peek(), "maximum block nesting depth exceeded");
            self.cursor.advance();
            return None;
        }
        let cmd = self.parse_command()?;
        let mut args_iter = cmd.args.into_iter();
        let name = args_iter.next().map(|a| a.raw_text()).unwrap_or_default();
        let params: Vec<String> = args_iter.map(|a| a.raw_text()).collect();
        let body = self.parse_block(depth + 1);
        let end_kw = if is_macro { "endmacro" } else { "endfunction" };
        if self.is_keyword(end_kw) {
            self.parse_command()?;
        } else {
            self.error(self.cursor.peek(), format!("missing {end_kw}()"));
        }
        Some(FuncDef { name, params, body })
    }

    fn is_keyword(&self, kw: &str) -> bool {
        let tok = self.cursor.peek();
        tok.kind == TokenKind::Identifier && tok.text.eq_ignore_ascii_case(kw)
    }
}

/// Convenience: lex then parse a full file in one call.
pub fn parse_source(
    source: &str,
    sink: &mut DiagnosticSink,
    file: Option<std::path::PathBuf>,
    max_block_depth: usize,
    max_paren_depth: usize,
) -> AstRoot {
    let tokens = Lexer::new(source).tokenize_all();
    let mut parser = Parser::new(tokens, sink, file, max_block_depth, max_paren_depth);
    parser.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (AstRoot, DiagnosticSink) {
        let mut sink = DiagnosticSink::new();
        let ast = parse_source(src, &mut sink, None, 64, 64);
        (ast, sink)
    }

    #[test]
    fn parses_simple_command() {
        let (ast, sink) = parse("add_executable(app main.c)\n");
        assert!(!sink.has_errors());
        assert_eq!(ast.len(), 1);
        match &ast[0] {
            Node::Command(cmd) => {
                assert_eq!(cmd.name, "add_executable");
                assert_eq!(cmd.args.len(), 2);
                assert_eq!(cmd.args[0].raw_text(), "app");
                assert_eq!(cmd.args[1].raw_text(), "main.c");
            }
            _ => panic!("expected command"),
        }
    }

    #[test]
    fn splits_arguments_on_semicolon() {
        let (ast, _) = parse("foo(a;b;c)\n");
        match &ast[0] {
            Node::Command(cmd) => assert_eq!(cmd.args.len(), 3),
            _ => panic!(),
        }
    }

    #[test]
    fn if_elseif_else_endif() {
        let (ast, sink) = parse(
            "if(A)\n  foo()\nelseif(B)\n  bar()\nelse()\n  baz()\nendif()\n",
        );
        assert!(!sink.has_errors());
        match &ast[0] {
            Node::If(stmt) => {
                assert_eq!(stmt.then_block.len(), 1);
                assert_eq!(stmt.elseif_clauses.len(), 1);
                assert!(stmt.else_block.is_some());
            }
            _ => panic!("expected if"),
        }
    }

    #[test]
    fn missing_endif_reports_error() {
        let (_, sink) = parse("if(A)\n  foo()\n");
        assert!(sink.has_errors());
    }

    #[test]
    fn nested_parens_pass_through_as_literal_tokens() {
        let (ast, sink) = parse("foo(BAR(baz))\n");
        assert!(!sink.has_errors());
        match &ast[0] {
            Node::Command(cmd) => {
                assert_eq!(cmd.args.len(), 1);
                assert_eq!(cmd.args[0].raw_text(), "BAR(baz)");
            }
            _ => panic!(),
        }
    }

    #[test]
    fn block_depth_limit_enforced() {
        let mut src = String::new();
        for _ in 0..5 {
            src.push_str("if(A)\n");
        }
        for _ in 0..5 {
            src.push_str("endif()\n");
        }
        let mut sink = DiagnosticSink::new();
        let _ast = parse_source(&src, &mut sink, None, 3, 64);
        assert!(sink.has_errors());
    }

    #[test]
    fn function_def_captures_params_and_body() {
        let (ast, sink) = parse("function(greet name)\n  message(${name})\nendfunction()\n");
        assert!(!sink.has_errors());
        match &ast[0] {
            Node::FunctionDef(def) => {
                assert_eq!(def.name, "greet");
                assert_eq!(def.params, vec!["name".to_string()]);
                assert_eq!(def.body.len(), 1);
            }
            _ => panic!("expected function def"),
        }
    }
}
