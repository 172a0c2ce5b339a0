//! HTML rendering for list entries and the page shell.
//!
//! The browser side is plain HTML driven by HTMX: entries are pushed as
//! fragments over SSE and swapped into the message list.

use crate::message::{Message, Segment};

/// Escape text for use in HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the text of a message. Line breaks become `<br>`.
pub fn render_text(message: &Message) -> String {
    message
        .text
        .segments()
        .iter()
        .map(|segment| match segment {
            Segment::Text(text) => escape_html(text),
            Segment::LineBreak => "<br>".to_string(),
        })
        .collect()
}

/// Render one list entry.
///
/// `appeared` toggles the class the entrance transition keys off.
pub fn render_entry(index: usize, message: &Message, appeared: bool) -> String {
    let appeared_class = if appeared { " appeared" } else { "" };
    format!(
        r#"<li id="message-{index}" class="message {side}{appeared_class}" data-index="{index}"><div class="avatar"></div><div class="text_wrapper"><div class="text">{text}</div><div class="timestamp">{time}</div></div></li>"#,
        side = message.side.as_str(),
        text = render_text(message),
        time = escape_html(&message.display_time()),
    )
}

/// Page shell for one widget instance.
///
/// `entries` is the pre-rendered list content at page render time and
/// `after` the index the event stream should resume from.
pub fn page_shell(widget_id: &str, entries: &str, after: usize) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Chat</title>
    <script src="https://unpkg.com/htmx.org@2.0.8"></script>
    <script src="https://unpkg.com/htmx-ext-sse@2.2.2/sse.js"></script>
    <style>
        .chat_window {{ max-width: 640px; margin: 2rem auto; font-family: sans-serif; }}
        .messages {{ list-style: none; padding: 1rem; height: 60vh; overflow-y: auto; }}
        .message {{ display: flex; margin-bottom: 1rem; opacity: 0; transition: opacity 0.3s ease-out; }}
        .message.appeared {{ opacity: 1; }}
        .message.user {{ flex-direction: row-reverse; text-align: right; }}
        .message .text_wrapper {{ padding: 0.5rem 1rem; border-radius: 1rem; background: #eee; }}
        .message.user .text_wrapper {{ background: #cde; }}
        .message .timestamp {{ font-size: 0.75rem; color: #888; }}
        .bottom_wrapper {{ display: flex; gap: 0.5rem; padding: 1rem; }}
        #msg_input {{ flex: 1; }}
    </style>
</head>
<body>
    <div class="chat_window" data-widget-id="{widget_id}"
         hx-post="/api/widgets/{widget_id}/load" hx-trigger="load" hx-swap="none">
        <ul class="messages" id="messages"
            hx-ext="sse" sse-connect="/api/widgets/{widget_id}/events?after={after}"
            sse-swap="entry.appended" hx-swap="beforeend">{entries}</ul>
        <form class="bottom_wrapper" hx-post="/api/widgets/{widget_id}/send" hx-swap="none">
            <textarea id="msg_input" name="message" rows="1" placeholder="Type your message here..."></textarea>
            <button id="send_button" type="submit">Send</button>
        </form>
    </div>
    <script>
        (function () {{
            const list = document.getElementById('messages');
            const input = document.getElementById('msg_input');
            const scrollToBottom = (duration) => {{
                const start = list.scrollTop;
                const distance = list.scrollHeight - start;
                const began = performance.now();
                const step = (now) => {{
                    const t = Math.min((now - began) / duration, 1);
                    list.scrollTop = start + distance * t;
                    if (t < 1) requestAnimationFrame(step);
                }};
                requestAnimationFrame(step);
            }};
            list.addEventListener('htmx:sseMessage', (e) => {{
                const detail = e.detail;
                if (detail.type === 'entry.appeared') {{
                    const entry = document.getElementById('message-' + JSON.parse(detail.data).index);
                    if (entry) entry.classList.add('appeared');
                }} else if (detail.type === 'list.scroll') {{
                    scrollToBottom(JSON.parse(detail.data).duration_ms);
                }} else if (detail.type === 'input.cleared') {{
                    input.value = '';
                }}
            }});
        }})();
    </script>
</body>
</html>"##
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageText, Side};
    use chrono::{Local, TimeZone};

    fn fixed(text: MessageText, side: Side) -> Message {
        let time = Local.with_ymd_and_hms(2024, 1, 5, 15, 42, 0).unwrap();
        Message::new(text, side, Some(time))
    }

    #[test]
    fn test_user_entry_has_line_breaks() {
        let msg = fixed(MessageText::with_line_breaks("Hello\nWorld"), Side::User);
        let html = render_entry(0, &msg, false);
        assert!(html.contains(r#"class="message user""#));
        assert!(html.contains(r#"<div class="text">Hello<br>World</div>"#));
        assert!(html.contains("Jan 5, 3:42 PM"));
        assert!(!html.contains('\n'));
    }

    #[test]
    fn test_bot_entry_class_and_appeared() {
        let msg = fixed(MessageText::plain("42"), Side::Bot);
        let html = render_entry(3, &msg, true);
        assert!(html.contains(r#"class="message bot appeared""#));
        assert!(html.contains(r#"id="message-3""#));
    }

    #[test]
    fn test_text_is_escaped() {
        let msg = fixed(MessageText::plain("<b>&</b>"), Side::Bot);
        assert_eq!(render_text(&msg), "&lt;b&gt;&amp;&lt;/b&gt;");
    }

    #[test]
    fn test_empty_text_renders_empty_entry() {
        let msg = fixed(MessageText::with_line_breaks(""), Side::User);
        let html = render_entry(0, &msg, false);
        assert!(html.contains(r#"<div class="text"></div>"#));
    }

    #[test]
    fn test_page_shell_wires_widget_endpoints() {
        let html = page_shell("abc", "", 0);
        assert!(html.contains("/api/widgets/abc/load"));
        assert!(html.contains("/api/widgets/abc/send"));
        assert!(html.contains("/api/widgets/abc/events?after=0"));
    }
}
