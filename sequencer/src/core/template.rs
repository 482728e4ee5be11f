//! Template personalization
//!
//! Pure text substitution of lead fields into a message template. Tokens
//! look like `{{key}}`; a token whose key is missing from the field map is
//! left verbatim so a half-filled profile fails open instead of erroring.

use std::collections::HashMap;

/// Replace every `{{key}}` occurrence with the matching field value
///
/// The template is scanned left to right and each token is looked up by key,
/// so the result does not depend on field iteration order and substituted
/// values are never re-scanned for tokens.
pub fn render(template: &str, fields: &HashMap<String, String>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        match after_open.find("}}") {
            Some(end) => {
                let key = &after_open[..end];
                match fields.get(key) {
                    Some(value) => output.push_str(value),
                    None => {
                        output.push_str("{{");
                        output.push_str(key);
                        output.push_str("}}");
                    }
                }
                rest = &after_open[end + 2..];
            }
            None => {
                // Unterminated token, keep the rest verbatim
                output.push_str("{{");
                rest = after_open;
            }
        }
    }

    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_replaces_known_placeholders() {
        let result = render(
            "Hi {{name}}, welcome to {{company}}!",
            &fields(&[("name", "Sarah"), ("company", "Acme")]),
        );
        assert_eq!(result, "Hi Sarah, welcome to Acme!");
    }

    #[test]
    fn test_unknown_placeholder_left_verbatim() {
        let result = render(
            "Hi {{name}}, from {{company}}",
            &fields(&[("name", "Sarah")]),
        );
        assert_eq!(result, "Hi Sarah, from {{company}}");
    }

    #[test]
    fn test_repeated_placeholder_replaced_everywhere() {
        let result = render(
            "{{name}} and {{name}} again",
            &fields(&[("name", "Sarah")]),
        );
        assert_eq!(result, "Sarah and Sarah again");
    }

    #[test]
    fn test_empty_fields_leave_template_untouched() {
        let template = "Hi {{name}}, from {{company}}";
        assert_eq!(render(template, &HashMap::new()), template);
    }

    #[test]
    fn test_unterminated_token_kept() {
        let result = render("Hi {{name", &fields(&[("name", "Sarah")]));
        assert_eq!(result, "Hi {{name");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let result = render(
            "{{a}}",
            &fields(&[("a", "{{b}}"), ("b", "oops")]),
        );
        assert_eq!(result, "{{b}}");
    }

    #[test]
    fn test_no_placeholders_is_identity() {
        let template = "plain text, no tokens";
        assert_eq!(render(template, &fields(&[("name", "Sarah")])), template);
    }
}
