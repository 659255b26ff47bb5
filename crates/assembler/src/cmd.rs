//! Command handler plumbing.
//!
//! Every directive and CPU handler reports back through the same narrow
//! channel: it either succeeded, succeeded with a warning the driver
//! should log, didn't recognize the command at all (letting the next
//! dispatcher try), or failed with a message. Failure travels as the
//! `Err` arm so handlers can use `?` on anything that evaluates.

use rasm_core::Token;

/// Non-failure outcomes of a command handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmdStatus {
    Ok,
    /// Logged, assembly continues.
    Warning(String),
    /// Not this dispatcher's command; try the next one.
    NotKnown,
}

/// What a handler returns; `Err` is fatal for the whole assembly.
pub type CmdResult = Result<CmdStatus, String>;

/// One row of an option table: the `OPTION` name and the tag the owner
/// dispatches on.
#[derive(Debug, Clone, Copy)]
pub struct OptionEntry {
    pub name: &'static str,
    pub tag: u32,
}

/// Look an option name up in a table.
pub fn find_option(name: &str, table: &'static [OptionEntry]) -> Option<&'static OptionEntry> {
    table.iter().find(|e| e.name.eq_ignore_ascii_case(name))
}

/// Require at least `min` tokens (command included), mirroring the
/// argument checks every handler performs up front.
pub fn argc_check(args: &[Token], min: usize) -> Result<(), String> {
    if args.len() < min {
        Err(format!("{}: missing argument", args[0].text))
    } else {
        Ok(())
    }
}

/// Parse a yes/no/on/off/true/false token, with a default for anything
/// else.
pub fn true_false(text: &str, default: bool) -> bool {
    match text.to_ascii_lowercase().as_str() {
        "yes" | "on" | "true" | "1" => true,
        "no" | "off" | "false" | "0" => false,
        _ => default,
    }
}

/// Render an argument the way it was written, quoting included, for
/// diagnostics.
pub fn display_arg(arg: &Token) -> String {
    match arg.quote {
        Some('(') => format!("({})", arg.text),
        Some('[') => format!("[{}]", arg.text),
        Some(q) => format!("{q}{}{q}", arg.text),
        None => arg.text.clone(),
    }
}

/// The shared "illegal arguments" diagnostic: the mnemonic plus every
/// argument as written.
pub fn illegal_args(args: &[Token]) -> CmdResult {
    let msg = match args.len() {
        0 => "no command/arguments".to_string(),
        1 => format!("{}: no arguments", args[0].text),
        2 => format!("{}: illegal argument {}", args[0].text, display_arg(&args[1])),
        _ => {
            let rendered: Vec<String> = args[1..].iter().map(display_arg).collect();
            format!("{}: illegal arguments {}", args[0].text, rendered.join(", "))
        }
    };
    Err(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_true_false() {
        assert!(true_false("YES", false));
        assert!(true_false("on", false));
        assert!(!true_false("no", true));
        assert!(true_false("gibberish", true));
    }

    #[test]
    fn test_display_arg() {
        assert_eq!(display_arg(&Token::quoted("hl", '(')), "(hl)");
        assert_eq!(display_arg(&Token::quoted("hi", '"')), "\"hi\"");
        assert_eq!(display_arg(&Token::bare("42")), "42");
    }

    #[test]
    fn test_argc_check() {
        let args = vec![Token::bare("org")];
        assert!(argc_check(&args, 2).is_err());
        assert!(argc_check(&args, 1).is_ok());
    }
}
