//! ANSI escape stripping for error messages captured from terminals.

use std::sync::OnceLock;

use regex::Regex;

fn ansi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[\x1b\x{9b}][\[\]()#;?]*(?:[0-9]{1,4}(?:;[0-9]{0,4})*)?[0-9A-ORZcf-nqry=><]")
            .expect("ANSI pattern is a valid regex")
    })
}

/// Remove ANSI colour and cursor sequences.
pub fn strip_ansi(input: &str) -> String {
    ansi_pattern().replace_all(input, "").into_owned()
}
