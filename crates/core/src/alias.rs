//! Command aliases.
//!
//! `ALIAS from to` installs a rewrite applied to the command token
//! before dispatch, so a source written for another assembler's
//! directive names can be adapted inline. The table is cleared between
//! passes; the driver re-installs entries as it re-reads the `ALIAS`
//! lines.

use crate::text::eq_ignore_case;

#[derive(Debug, Default)]
pub struct AliasTable {
    entries: Vec<(String, String)>,
}

impl AliasTable {
    pub fn new() -> AliasTable {
        AliasTable::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Install or replace a mapping.
    pub fn create(&mut self, command: &str, alias: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(from, _)| eq_ignore_case(from, command))
        {
            Some((_, to)) => *to = alias.to_string(),
            None => self.entries.push((command.to_string(), alias.to_string())),
        }
    }

    /// Rewrite a command token, or hand it back untouched.
    pub fn expand<'a>(&'a self, command: &'a str) -> &'a str {
        self.entries
            .iter()
            .find(|(from, _)| eq_ignore_case(from, command))
            .map(|(_, to)| to.as_str())
            .unwrap_or(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand() {
        let mut aliases = AliasTable::new();
        aliases.create("dfb", "db");
        assert_eq!(aliases.expand("DFB"), "db");
        assert_eq!(aliases.expand("dw"), "dw");
    }

    #[test]
    fn test_replace() {
        let mut aliases = AliasTable::new();
        aliases.create("x", "one");
        aliases.create("X", "two");
        assert_eq!(aliases.expand("x"), "two");
    }

    #[test]
    fn test_clear() {
        let mut aliases = AliasTable::new();
        aliases.create("x", "y");
        aliases.clear();
        assert_eq!(aliases.expand("x"), "x");
    }
}
