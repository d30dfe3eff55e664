use super::sanitize::clean_html;
use crate::storage::ContentFormat;

/// Cleans `raw` and wraps it according to the configured content format.
///
/// Empty content stays empty in every mode, so templates do not end up
/// with an empty code fence.
pub fn format_content(raw: &str, format: ContentFormat) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let cleaned = clean_html(raw);

    match format {
        ContentFormat::Html => cleaned,
        ContentFormat::HtmlBlock => format!("```html\n{}\n```", cleaned),
        ContentFormat::HtmlCallout => format!(
            "> [!note] Original HTML\n> ```html\n> {}\n> ```",
            cleaned.replace('\n', "\n> ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_html_mode_is_cleaned_markup() {
        assert_eq!(
            format_content("  <p>Hi</p><p></p>  ", ContentFormat::Html),
            "<p>Hi</p>"
        );
    }

    #[test]
    fn test_block_mode_fences_markup() {
        assert_eq!(
            format_content("<p>Hi</p>", ContentFormat::HtmlBlock),
            "```html\n<p>Hi</p>\n```"
        );
    }

    #[test]
    fn test_callout_mode_quotes_every_line() {
        assert_eq!(
            format_content("<p>a</p>\n<p>b</p>", ContentFormat::HtmlCallout),
            "> [!note] Original HTML\n> ```html\n> <p>a</p>\n> <p>b</p>\n> ```"
        );
    }

    #[test]
    fn test_empty_content_stays_empty() {
        for format in [
            ContentFormat::Html,
            ContentFormat::HtmlBlock,
            ContentFormat::HtmlCallout,
        ] {
            assert_eq!(format_content("", format), "");
        }
    }
}
