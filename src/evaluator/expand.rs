//! Variable expansion: `${name}` (recursive), `$ENV{name}`, `$CACHE{name}`,
//! and generator-expression passthrough, plus the semicolon list-splitting
//! that follows expansion of unquoted arguments (§4.5.3).

/// Anything that can resolve the three namespaces an expansion may touch.
pub trait ExpansionContext {
    fn get_var(&self, name: &str) -> Option<String>;
    fn get_env(&self, name: &str) -> Option<String>;
    fn get_cache(&self, name: &str) -> Option<String>;
}

/// Finds the index (in `s`) of the `{`/`}` that matches the one whose
/// content begins at byte offset `start`, honoring `\`-escapes.
fn find_matching_brace(s: &str, start: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 1i32;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Finds the end (exclusive, relative to `s` which starts with `$<`) of a
/// depth-matched generator expression.
fn find_genexp_end(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Expands `${...}`/`$ENV{...}`/`$CACHE{...}` in `input`, recursing into
/// brace content first. Generator expressions are copied through verbatim.
/// Backslash-escape pairs are copied through untouched so list-splitting
/// can still distinguish an escaped `\;` from a real separator; call
/// [`unescape`] on the final result once splitting is done.
pub fn expand_text(input: &str, ctx: &dyn ExpansionContext) -> String {
    let mut out = String::new();
    let bytes = input.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            out.push_str(&input[i..i + 2]);
            i += 2;
            continue;
        }
        if bytes[i] == b'$' {
            if input[i..].starts_with("$<") {
                if let Some(end) = find_genexp_end(&input[i..]) {
                    out.push_str(&input[i..i + end]);
                    i += end;
                    continue;
                }
            }
            let (prefix_len, namespace) = if input[i..].starts_with("$ENV{") {
                (5, Namespace::Env)
            } else if input[i..].starts_with("$CACHE{") {
                (7, Namespace::Cache)
            } else if input[i..].starts_with("${") {
                (2, Namespace::Var)
            } else {
                (0, Namespace::Var)
            };
            if prefix_len > 0 {
                if let Some(close) = find_matching_brace(input, i + prefix_len) {
                    let inner_raw = &input[i + prefix_len..close];
                    let inner_expanded = expand_text(inner_raw, ctx);
                    let value = match namespace {
                        Namespace::Env => ctx.get_env(&inner_expanded),
                        Namespace::Cache => ctx.get_cache(&inner_expanded),
                        Namespace::Var => ctx.get_var(&inner_expanded),
                    }
                    .unwrap_or_default();
                    out.push_str(&value);
                    i = close + 1;
                    continue;
                }
            }
        }
        let ch_len = input[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        out.push_str(&input[i..i + ch_len]);
        i += ch_len;
    }
    out
}

enum Namespace {
    Var,
    Env,
    Cache,
}

/// Removes one level of `\`-escaping: `\X` becomes `X` for any character.
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Splits on semicolons not preceded by a backslash, then unescapes each
/// resulting segment. List semantics for unquoted arguments (§4.5.3).
pub fn split_unescaped_semicolons(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
            continue;
        }
        if c == ';' {
            parts.push(std::mem::take(&mut current));
            continue;
        }
        current.push(c);
    }
    parts.push(current);
    parts.iter().map(|p| unescape(p)).collect()
}

/// Expands and list-splits one unquoted argument's raw text.
pub fn expand_unquoted(raw: &str, ctx: &dyn ExpansionContext) -> Vec<String> {
    let expanded = expand_text(raw, ctx);
    split_unescaped_semicolons(&expanded)
}

/// Expands one quoted argument's raw text (quotes already stripped); no
/// list-splitting.
pub fn expand_quoted(inner: &str, ctx: &dyn ExpansionContext) -> String {
    unescape(&expand_text(inner, ctx))
}

/// Strips the surrounding `"`/`"` delimiters from a quoted token's raw text.
pub fn strip_quotes(raw: &str) -> &str {
    raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(raw)
}

/// Strips the surrounding `[`(`=`)*`[` / `]`(`=`)*`]` delimiters from a
/// bracket (raw) string's token text.
pub fn strip_bracket(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.first() != Some(&b'[') {
        return raw;
    }
    let mut k = 1;
    while bytes.get(k) == Some(&b'=') {
        k += 1;
    }
    if bytes.get(k) != Some(&b'[') {
        return raw;
    }
    let open_len = k + 1;
    raw.get(open_len..raw.len().saturating_sub(open_len)).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapCtx {
        vars: HashMap<String, String>,
        env: HashMap<String, String>,
        cache: HashMap<String, String>,
    }

    impl ExpansionContext for MapCtx {
        fn get_var(&self, name: &str) -> Option<String> {
            self.vars.get(name).cloned()
        }
        fn get_env(&self, name: &str) -> Option<String> {
            self.env.get(name).cloned()
        }
        fn get_cache(&self, name: &str) -> Option<String> {
            self.cache.get(name).cloned()
        }
    }

    fn ctx() -> MapCtx {
        let mut vars = HashMap::new();
        vars.insert("NAME".to_string(), "Foo".to_string());
        vars.insert("NAMEVAR".to_string(), "NAME".to_string());
        let mut env = HashMap::new();
        env.insert("PATH".to_string(), "/usr/bin".to_string());
        let mut cache = HashMap::new();
        cache.insert("X".to_string(), "from_cache".to_string());
        MapCtx { vars, env, cache }
    }

    #[test]
    fn simple_variable_expansion() {
        assert_eq!(expand_text("hello ${NAME}", &ctx()), "hello Foo");
    }

    #[test]
    fn env_variable_expansion() {
        assert_eq!(expand_text("$ENV{PATH}", &ctx()), "/usr/bin");
    }

    #[test]
    fn cache_variable_expansion() {
        assert_eq!(expand_text("$CACHE{X}", &ctx()), "from_cache");
    }

    #[test]
    fn nested_variable_name_expands_inside_out() {
        assert_eq!(expand_text("${${NAMEVAR}}", &ctx()), "Foo");
    }

    #[test]
    fn undefined_variable_expands_to_empty() {
        assert_eq!(expand_text("<${MISSING}>", &ctx()), "<>");
    }

    #[test]
    fn generator_expression_is_passed_through_literally() {
        assert_eq!(expand_text("$<CONFIG:Debug>", &ctx()), "$<CONFIG:Debug>");
    }

    #[test]
    fn semicolon_splitting_after_expansion() {
        let mut c = ctx();
        c.vars.insert("LIST".to_string(), "a;b;c".to_string());
        let expanded = expand_text("${LIST}", &c);
        let parts = split_unescaped_semicolons(&expanded);
        assert_eq!(parts, vec!["a", "b", "c"]);
    }

    #[test]
    fn escaped_semicolon_does_not_split() {
        let parts = split_unescaped_semicolons(r"a\;b;c");
        assert_eq!(parts, vec!["a;b", "c"]);
    }

    #[test]
    fn strip_quotes_removes_delimiters() {
        assert_eq!(strip_quotes(r#""hello""#), "hello");
    }

    #[test]
    fn strip_bracket_removes_equals_padded_delimiters() {
        assert_eq!(strip_bracket("[==[raw]==]"), "raw");
    }
}
