//! Formatting utilities (Telegram HTML escaping, command listings, message splitting).

use crate::store::CommandSet;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `Commands:` header followed by one `trigger: response` line per entry.
///
/// Responses are shown escaped (as typed), not rendered, so admins can see
/// the markup they stored.
pub fn render_command_list_html(commands: &CommandSet) -> String {
    let mut out = String::from("<b>Commands:</b>");
    for (trigger, response) in commands.iter() {
        out.push('\n');
        out.push_str(&format!(
            "<code>{}</code>: {}",
            escape_html(trigger),
            escape_html(response)
        ));
    }
    out
}

/// Split `text` into chunks of at most `limit` bytes, preferring line breaks.
///
/// Lines longer than `limit` are cut at char boundaries. Callers must not rely
/// on HTML tags surviving a cut inside a line.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();
    let mut chunk = String::new();

    for line in text.split('\n') {
        let needed = if chunk.is_empty() {
            line.len()
        } else {
            chunk.len() + 1 + line.len()
        };
        if needed <= limit {
            if !chunk.is_empty() {
                chunk.push('\n');
            }
            chunk.push_str(line);
            continue;
        }

        if !chunk.is_empty() {
            out.push(std::mem::take(&mut chunk));
        }

        let mut rest = line;
        while rest.len() > limit {
            let (head, tail) = split_utf8_prefix(rest, limit);
            out.push(head.to_string());
            rest = tail;
        }
        chunk.push_str(rest);
    }

    if !chunk.is_empty() {
        out.push(chunk);
    }
    out
}

fn split_utf8_prefix(s: &str, max_bytes: usize) -> (&str, &str) {
    let mut idx = max_bytes.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    if idx == 0 {
        // A single char wider than the limit; emit it alone.
        idx = s.chars().next().map(char::len_utf8).unwrap_or(s.len());
    }
    s.split_at(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_specials() {
        assert_eq!(escape_html(r#"<a href="x">&</a>"#), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn lists_commands_in_order_with_escaping() {
        let set: CommandSet = [("b", "<two>"), ("a", "*one*")].into_iter().collect();
        assert_eq!(
            render_command_list_html(&set),
            "<b>Commands:</b>\n<code>a</code>: *one*\n<code>b</code>: &lt;two&gt;"
        );
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("hello", 10), vec!["hello".to_string()]);
    }

    #[test]
    fn splits_on_line_boundaries() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(
            split_message(text, 9),
            vec!["aaaa\nbbbb".to_string(), "cccc".to_string()]
        );
    }

    #[test]
    fn long_lines_are_cut_at_char_boundaries() {
        let text = "é".repeat(10); // 20 bytes
        let chunks = split_message(&text, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn every_chunk_respects_the_limit() {
        let text = (0..200)
            .map(|i| format!("trigger{i}: some response text"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_message(&text, 100);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 100));
        assert_eq!(chunks.join("\n"), text);
    }
}
