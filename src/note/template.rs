/// Default note body: YAML front matter followed by the item content.
pub const DEFAULT_TEMPLATE: &str = "---\ntitle: \"{{title}}\"\nauthor: \"{{author}}\"\nsource: \"{{link}}\"\ndate: \"{{pubDate}}\"\nfeed: \"{{feedName}}\"\n---\n\n{{content}}";

/// Values available to a note template.
#[derive(Debug, Clone, Copy)]
pub struct NoteFields<'a> {
    pub title: &'a str,
    pub author: &'a str,
    pub link: &'a str,
    pub pub_date: &'a str,
    pub feed_name: &'a str,
    pub content: &'a str,
}

impl<'a> NoteFields<'a> {
    /// Looks up a placeholder name as written in templates.
    pub fn get(&self, name: &str) -> Option<&'a str> {
        match name {
            "title" => Some(self.title),
            "author" => Some(self.author),
            "link" => Some(self.link),
            "pubDate" => Some(self.pub_date),
            "feedName" => Some(self.feed_name),
            "content" => Some(self.content),
            _ => None,
        }
    }
}

/// Replaces every `{{name}}` placeholder in `template` with its field value.
///
/// Single left-to-right pass: substituted values are never scanned again, so
/// a title containing `{{author}}` stays literal. Unknown placeholders are
/// kept verbatim.
///
/// ```
/// use feednote::note::{render, NoteFields};
///
/// let fields = NoteFields {
///     title: "A",
///     author: "B",
///     link: "",
///     pub_date: "",
///     feed_name: "",
///     content: "",
/// };
/// assert_eq!(render("{{title}} by {{author}}", &fields), "A by B");
/// assert_eq!(render("{{xyz}}", &fields), "{{xyz}}");
/// ```
pub fn render(template: &str, fields: &NoteFields<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let value = after
            .find("}}")
            .and_then(|end| fields.get(&after[..end]).map(|v| (v, end)));

        match value {
            Some((v, end)) => {
                out.push_str(v);
                rest = &after[end + 2..];
            }
            None => {
                // Emit one brace and rescan, so `{{{title}}` still resolves
                out.push('{');
                rest = &rest[start + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn fields<'a>(title: &'a str, author: &'a str) -> NoteFields<'a> {
        NoteFields {
            title,
            author,
            link: "https://example.com/a",
            pub_date: "2024-01-01",
            feed_name: "Example",
            content: "<p>Body</p>",
        }
    }

    #[test]
    fn test_basic_substitution() {
        assert_eq!(render("{{title}} by {{author}}", &fields("A", "B")), "A by B");
    }

    #[test]
    fn test_unknown_placeholder_left_literal() {
        assert_eq!(render("{{xyz}} {{title}}", &fields("A", "B")), "{{xyz}} A");
    }

    #[test]
    fn test_every_occurrence_replaced() {
        assert_eq!(render("{{title}}/{{title}}", &fields("A", "B")), "A/A");
    }

    #[test]
    fn test_values_not_re_expanded() {
        assert_eq!(
            render("{{title}} by {{author}}", &fields("{{author}}", "B")),
            "{{author}} by B"
        );
    }

    #[test]
    fn test_unterminated_and_stray_braces() {
        let f = fields("A", "B");
        assert_eq!(render("{{title", &f), "{{title");
        assert_eq!(render("{{{title}}}", &f), "{A}");
        assert_eq!(render("}} {{ }}", &f), "}} {{ }}");
        assert_eq!(render("{{ title }}", &f), "{{ title }}");
    }

    #[test]
    fn test_default_template() {
        let rendered = render(DEFAULT_TEMPLATE, &fields("A", "B"));
        assert_eq!(
            rendered,
            "---\ntitle: \"A\"\nauthor: \"B\"\nsource: \"https://example.com/a\"\ndate: \"2024-01-01\"\nfeed: \"Example\"\n---\n\n<p>Body</p>"
        );
    }

    proptest! {
        #[test]
        fn prop_field_values_are_inserted_verbatim(title in ".{0,40}", author in ".{0,40}") {
            let f = fields(&title, &author);
            prop_assert_eq!(render("[{{title}}|{{author}}]", &f), format!("[{}|{}]", title, author));
        }

        #[test]
        fn prop_templates_without_placeholders_unchanged(template in "[^{]{0,80}") {
            prop_assert_eq!(render(&template, &fields("A", "B")), template);
        }
    }
}
