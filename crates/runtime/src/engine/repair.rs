//! Best-effort repair of almost-JSON model output.
//!
//! Handles the mistakes models actually make when asked for a JSON object:
//! markdown code fences, `//` and `/* */` comments, trailing commas, bare
//! object keys, single-quoted strings and missing closers at the end.

use serde_json::Value;

/// Parse `input`, repairing it first if a strict parse fails.
pub fn repair_json(input: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(input) {
        return Some(value);
    }
    let repaired = normalize(strip_fences(input.trim()));
    serde_json::from_str(&repaired).ok()
}

/// Remove a surrounding ```` ```json ```` fence.
fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '-'
}

fn next_significant(chars: &[char], mut i: usize) -> Option<char> {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    chars.get(i).copied()
}

fn normalize(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    // Quote character of the string being copied, if any.
    let mut quote: Option<char> = None;
    let mut escaped = false;
    // Last structural character emitted outside strings.
    let mut last = '\0';
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = quote {
            if escaped {
                escaped = false;
                // `\'` is not a JSON escape.
                if c == '\'' {
                    out.pop();
                }
                out.push(c);
            } else if c == '\\' {
                escaped = true;
                out.push(c);
            } else if c == q {
                quote = None;
                out.push('"');
            } else if c == '"' {
                out.push_str("\\\"");
            } else if c == '\n' {
                out.push_str("\\n");
            } else {
                out.push(c);
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push('"');
                last = '"';
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                continue;
            }
            ',' => {
                if !matches!(next_significant(&chars, i + 1), Some('}' | ']') | None) {
                    out.push(',');
                    last = ',';
                }
            }
            '{' | '[' => {
                closers.push(if c == '{' { '}' } else { ']' });
                out.push(c);
                last = c;
            }
            '}' | ']' => {
                if closers.last() == Some(&c) {
                    closers.pop();
                }
                out.push(c);
                last = c;
            }
            c if is_ident_start(c) && matches!(last, '{' | ',') && inside_object(&closers) => {
                let start = i;
                while i < chars.len() && is_ident(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if next_significant(&chars, i) == Some(':') {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else {
                    out.push_str(&word);
                }
                last = 'k';
                continue;
            }
            c => {
                out.push(c);
                if !c.is_whitespace() {
                    last = c;
                }
            }
        }
        i += 1;
    }

    if quote.is_some() {
        out.push('"');
    }
    while let Some(closer) = closers.pop() {
        out.push(closer);
    }
    out
}

fn inside_object(closers: &[char]) -> bool {
    closers.last() == Some(&'}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_json_is_untouched() {
        assert_eq!(repair_json(r#"{"a": [1, 2]}"#), Some(json!({"a": [1, 2]})));
    }

    #[test]
    fn unquoted_key_and_trailing_comma() {
        assert_eq!(repair_json(r#"{content: "hi", }"#), Some(json!({"content": "hi"})));
    }

    #[test]
    fn trailing_commas_in_arrays() {
        assert_eq!(
            repair_json(r#"{"actions": [{"name": "a",},],}"#),
            Some(json!({"actions": [{"name": "a"}]}))
        );
    }

    #[test]
    fn comments_and_fences() {
        let input = "```json\n{\n  // reply\n  \"content\": \"ok\" /* done */\n}\n```";
        assert_eq!(repair_json(input), Some(json!({"content": "ok"})));
    }

    #[test]
    fn single_quotes() {
        assert_eq!(
            repair_json(r#"{'content': 'it\'s "fine"'}"#),
            Some(json!({"content": "it's \"fine\""}))
        );
    }

    #[test]
    fn missing_closers() {
        assert_eq!(
            repair_json(r#"{"content": "x", "actions": [{"name": "a""#),
            Some(json!({"content": "x", "actions": [{"name": "a"}]}))
        );
    }

    #[test]
    fn urls_inside_strings_survive() {
        assert_eq!(
            repair_json(r#"{url: "https://example.com/a,b",}"#),
            Some(json!({"url": "https://example.com/a,b"}))
        );
    }

    #[test]
    fn bare_words_in_values_are_kept() {
        assert_eq!(
            repair_json("{ok: true, missing: null,}"),
            Some(json!({"ok": true, "missing": null}))
        );
    }

    #[test]
    fn prose_is_not_json() {
        assert_eq!(repair_json("Sure! Here is the answer."), None);
    }
}
