//! Literal tokenizer for shell-exec command strings: leading `NAME=VALUE`
//! tokens become environment variables, everything from the first token that
//! doesn't match (or that follows one that didn't) on is the program and its
//! arguments. Ported from the inline parsing loop in `xpopen`'s child branch.

/// A command string split into its leading env assignments and the program
/// invocation that follows them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedCommand {
    pub env: Vec<(String, String)>,
    pub args: Vec<String>,
}

/// Splits `cmd` on spaces/tabs. A token is an environment assignment only
/// while no argument token has been seen yet — once the program name
/// appears, later `NAME=VALUE`-shaped tokens are just arguments, matching
/// the original's `icmd == 0` guard.
#[must_use]
pub fn parse(cmd: &str) -> ParsedCommand {
    let mut parsed = ParsedCommand::default();

    for token in cmd.split([' ', '\t']).filter(|t| !t.is_empty()) {
        if parsed.args.is_empty() {
            if let Some(eq) = token.find('=') {
                let name = &token[..eq];
                let value = strip_matching_quotes(&token[eq + 1..]);
                parsed.env.push((name.to_string(), value));
                continue;
            }
        }
        parsed.args.push(token.to_string());
    }

    parsed
}

fn strip_matching_quotes(value: &str) -> String {
    if let Some(rest) = value.strip_prefix('"') {
        return rest.trim_matches('"').to_string();
    }
    if let Some(rest) = value.strip_prefix('\'') {
        return rest.trim_matches('\'').to_string();
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_program_and_arguments() {
        let parsed = parse("/bin/echo hello world");
        assert!(parsed.env.is_empty());
        assert_eq!(parsed.args, vec!["/bin/echo", "hello", "world"]);
    }

    #[test]
    fn collects_leading_env_assignments() {
        let parsed = parse("FOO=bar BAZ=qux /bin/env");
        assert_eq!(parsed.env, vec![("FOO".to_string(), "bar".to_string()), ("BAZ".to_string(), "qux".to_string())]);
        assert_eq!(parsed.args, vec!["/bin/env"]);
    }

    #[test]
    fn strips_matching_double_quotes_from_the_value_only() {
        let parsed = parse(r#"GREETING="hello world" /bin/env"#);
        assert_eq!(parsed.env, vec![("GREETING".to_string(), "hello".to_string())]);
        assert_eq!(parsed.args, vec![r#"world""#, "/bin/env"]);
    }

    #[test]
    fn equals_signs_after_the_program_name_are_plain_arguments() {
        let parsed = parse("/bin/env FOO=bar");
        assert!(parsed.env.is_empty());
        assert_eq!(parsed.args, vec!["/bin/env", "FOO=bar"]);
    }

    #[test]
    fn empty_command_yields_nothing() {
        let parsed = parse("   ");
        assert!(parsed.env.is_empty());
        assert!(parsed.args.is_empty());
    }
}
