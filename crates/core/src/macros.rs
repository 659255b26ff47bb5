//! Macro store.
//!
//! Definitions are recorded verbatim, one source line at a time, and
//! played back with textual substitution. Three markers expand inside a
//! body line:
//!
//! - `\N` — invocation argument *N* (1-based; `\0` is the macro name)
//! - `\*` — all arguments, comma-joined
//! - `@NAME` — the argument bound to declared parameter `NAME`
//!
//! Arguments re-emit with their original quoting, so a `(hl)` argument
//! comes back as `(hl)` and a `"text"` argument keeps its quotes. The
//! `@` introducer can be changed with `OPTION macro-arg-char`.

use crate::parse::Token;
use crate::text::eq_ignore_case;

/// Deepest allowed macro invocation nesting.
pub const MAX_INVOKE_DEPTH: usize = 1024;

const DEFAULT_ARG_CHAR: char = '@';

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub lines: Vec<String>,
}

/// A live playback of one definition: which definition, the invocation
/// tokens (name first, then arguments, quoting preserved) and the body
/// cursor.
#[derive(Debug, Clone)]
pub struct MacroInvocation {
    def: usize,
    args: Vec<Token>,
    cursor: usize,
}

#[derive(Debug, Default)]
pub struct MacroStore {
    defs: Vec<MacroDef>,
    arg_char: char,
}

impl MacroStore {
    pub fn new() -> MacroStore {
        MacroStore { defs: Vec::new(), arg_char: DEFAULT_ARG_CHAR }
    }

    /// Reset per-pass options to their defaults. Definitions survive;
    /// they are only ever recorded on the first pass.
    pub fn set_defaults(&mut self) {
        self.arg_char = DEFAULT_ARG_CHAR;
    }

    /// Change the named-parameter introducer. Alphanumerics are
    /// rejected because they could not be told apart from body text.
    pub fn set_arg_char(&mut self, c: char) -> Result<(), String> {
        if c == '\0' || c.is_ascii_alphanumeric() {
            return Err(format!("illegal character '{c}'"));
        }
        self.arg_char = c;
        Ok(())
    }

    fn find_def(&self, name: &str) -> Option<usize> {
        self.defs.iter().position(|d| eq_ignore_case(&d.name, name))
    }

    /// Create a definition. Duplicate names and malformed parameter
    /// names are errors.
    pub fn define(&mut self, name: &str, params: &[Token]) -> Result<usize, String> {
        if self.find_def(name).is_some() {
            return Err(format!("macro {name} already exists"));
        }

        let mut names = Vec::with_capacity(params.len());
        for p in params {
            if p.text.is_empty() || !p.text.chars().all(is_name_char) {
                return Err(format!("illegal argument name '{}'", p.text));
            }
            names.push(p.text.clone());
        }

        self.defs.push(MacroDef {
            name: name.to_string(),
            params: names,
            lines: Vec::new(),
        });

        Ok(self.defs.len() - 1)
    }

    /// Append a raw source line to a definition's body.
    pub fn record(&mut self, def: usize, line: &str) {
        self.defs[def].lines.push(line.to_string());
    }

    pub fn def(&self, index: usize) -> &MacroDef {
        &self.defs[index]
    }

    pub fn defs(&self) -> impl Iterator<Item = &MacroDef> {
        self.defs.iter()
    }

    /// Match a tokenized command against the defined macros. `tokens`
    /// is the command token followed by its arguments. Returns a fresh
    /// invocation, `Ok(None)` when no macro matches, or an error for an
    /// arity mismatch.
    pub fn find(&self, tokens: &[Token]) -> Result<Option<MacroInvocation>, String> {
        let Some(name) = tokens.first() else {
            return Ok(None);
        };
        let Some(def) = self.find_def(&name.text) else {
            return Ok(None);
        };

        let argc = tokens.len() - 1;
        let want = self.defs[def].params.len();

        if want != 0 && want != argc {
            return Err(format!(
                "{}: expected {} argument{}, got {}",
                name.text,
                want,
                if want == 1 { "" } else { "s" },
                argc
            ));
        }

        Ok(Some(MacroInvocation { def, args: tokens.to_vec(), cursor: 0 }))
    }

    /// Produce the next expanded body line, or `None` when the
    /// invocation is exhausted.
    pub fn play(&self, invocation: &mut MacroInvocation) -> Option<String> {
        let def = &self.defs[invocation.def];
        let line = def.lines.get(invocation.cursor)?;
        invocation.cursor += 1;

        if !line.contains('\\') && !line.contains(self.arg_char) {
            return Some(line.clone());
        }

        Some(self.expand(def, invocation, line))
    }

    fn expand(&self, def: &MacroDef, invocation: &MacroInvocation, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '\\' {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    for (i, arg) in invocation.args.iter().enumerate().skip(1) {
                        if i > 1 {
                            out.push(',');
                        }
                        requote(&mut out, arg);
                    }
                    continue;
                }

                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }

                if let Ok(n) = digits.parse::<usize>()
                    && let Some(arg) = invocation.args.get(n)
                {
                    requote(&mut out, arg);
                }
            } else if c == self.arg_char {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if !is_name_char(d) {
                        break;
                    }
                    name.push(d);
                    chars.next();
                }

                // Unknown parameter names expand to nothing.
                if let Some(i) = def.params.iter().position(|p| eq_ignore_case(p, &name))
                    && let Some(arg) = invocation.args.get(i + 1)
                {
                    requote(&mut out, arg);
                }
            } else {
                out.push(c);
            }
        }

        out
    }
}

impl MacroInvocation {
    pub fn name<'a>(&self, store: &'a MacroStore) -> &'a str {
        &store.def(self.def).name
    }
}

/// Re-emit an argument with its original quoting.
fn requote(out: &mut String, arg: &Token) {
    match arg.quote {
        Some('(') => {
            out.push('(');
            out.push_str(&arg.text);
            out.push(')');
        }
        Some('[') => {
            out.push('[');
            out.push_str(&arg.text);
            out.push(']');
        }
        Some(q) => {
            out.push(q);
            out.push_str(&arg.text);
            out.push(q);
        }
        None => out.push_str(&arg.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(parts: &[&str]) -> Vec<Token> {
        parts.iter().map(|p| Token::bare(*p)).collect()
    }

    fn invoke(store: &MacroStore, tokens: Vec<Token>) -> MacroInvocation {
        store.find(&tokens).unwrap().unwrap()
    }

    fn play_all(store: &MacroStore, inv: &mut MacroInvocation) -> Vec<String> {
        std::iter::from_fn(|| store.play(inv)).collect()
    }

    #[test]
    fn test_positional_substitution() {
        let mut store = MacroStore::new();
        let def = store.define("move", &[]).unwrap();
        store.record(def, "  LD \\1,\\2");

        let mut inv = invoke(&store, toks(&["move", "A", "B"]));
        assert_eq!(play_all(&store, &mut inv), vec!["  LD A,B"]);
    }

    #[test]
    fn test_quoting_preserved() {
        let mut store = MacroStore::new();
        let def = store.define("fetch", &[]).unwrap();
        store.record(def, "  XYZ \\1");

        let mut inv = invoke(
            &store,
            vec![Token::bare("fetch"), Token::quoted("hl", '(')],
        );
        assert_eq!(play_all(&store, &mut inv), vec!["  XYZ (hl)"]);
    }

    #[test]
    fn test_named_parameters() {
        let mut store = MacroStore::new();
        let def = store.define("push2", &toks(&["r1", "r2"])).unwrap();
        store.record(def, "  PUSH @r1");
        store.record(def, "  PUSH @r2");

        let mut inv = invoke(&store, toks(&["push2", "BC", "DE"]));
        assert_eq!(play_all(&store, &mut inv), vec!["  PUSH BC", "  PUSH DE"]);
    }

    #[test]
    fn test_star_joins_arguments() {
        let mut store = MacroStore::new();
        let def = store.define("bytes", &[]).unwrap();
        store.record(def, "  DB \\*");

        let mut inv = invoke(&store, toks(&["bytes", "1", "2", "3"]));
        assert_eq!(play_all(&store, &mut inv), vec!["  DB 1,2,3"]);
    }

    #[test]
    fn test_unknown_name_is_empty() {
        let mut store = MacroStore::new();
        let def = store.define("m", &toks(&["a"])).unwrap();
        store.record(def, "  DB @a@nope");

        let mut inv = invoke(&store, toks(&["m", "7"]));
        assert_eq!(play_all(&store, &mut inv), vec!["  DB 7"]);
    }

    #[test]
    fn test_arity_enforced() {
        let mut store = MacroStore::new();
        store.define("two", &toks(&["a", "b"])).unwrap();
        assert!(store.find(&toks(&["two", "1"])).is_err());
        assert!(store.find(&toks(&["two", "1", "2"])).unwrap().is_some());
    }

    #[test]
    fn test_parameterless_accepts_any_arity() {
        let mut store = MacroStore::new();
        store.define("any", &[]).unwrap();
        assert!(store.find(&toks(&["any", "1", "2", "3"])).unwrap().is_some());
    }

    #[test]
    fn test_duplicate_definition() {
        let mut store = MacroStore::new();
        store.define("m", &[]).unwrap();
        assert!(store.define("M", &[]).is_err());
    }

    #[test]
    fn test_bad_parameter_name() {
        let mut store = MacroStore::new();
        assert!(store.define("m", &toks(&["a-b"])).is_err());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut store = MacroStore::new();
        store.define("Blit", &[]).unwrap();
        assert!(store.find(&toks(&["BLIT"])).unwrap().is_some());
    }

    #[test]
    fn test_custom_arg_char() {
        let mut store = MacroStore::new();
        store.set_arg_char('?').unwrap();
        let def = store.define("m", &toks(&["x"])).unwrap();
        store.record(def, "  DB ?x");

        let mut inv = invoke(&store, toks(&["m", "9"]));
        assert_eq!(play_all(&store, &mut inv), vec!["  DB 9"]);

        assert!(store.set_arg_char('a').is_err());
    }
}
