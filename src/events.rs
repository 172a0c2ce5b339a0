//! Widget events and their Server-Sent Events encoding.
//!
//! Every visible change a widget makes is published as a [`WidgetEvent`].
//! The browser shell listens for them by SSE event name:
//!
//! - `entry.appended`: the HTML fragment of a new list entry (swapped in by HTMX)
//! - `entry.appeared`: the entrance transition for an entry may run
//! - `list.scroll`: animate the list to its bottom
//! - `input.cleared`: empty the input field
//!
//! # Example
//!
//! ```rust
//! use chat_relay_widget::events::{WidgetEvent, sse_event};
//!
//! let sse = sse_event(&WidgetEvent::InputCleared);
//! assert!(sse.starts_with("event: input.cleared\n"));
//! ```

use serde::{Deserialize, Serialize};

use crate::message::Side;

/// A change to the widget's view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum WidgetEvent {
    /// A list entry was appended.
    #[serde(rename = "entry.appended")]
    EntryAppended {
        /// Position in the list.
        index: usize,
        side: Side,
        /// Rendered `<li>` fragment.
        html: String,
    },

    /// An entry moved to its `appeared` state.
    #[serde(rename = "entry.appeared")]
    EntryAppeared { index: usize },

    /// Scroll the list to the bottom over `duration_ms`.
    #[serde(rename = "list.scroll")]
    ScrollToBottom { duration_ms: u64 },

    /// The input field was emptied.
    #[serde(rename = "input.cleared")]
    InputCleared,
}

/// Get the SSE event name for a [`WidgetEvent`].
pub fn event_name(evt: &WidgetEvent) -> &'static str {
    match evt {
        WidgetEvent::EntryAppended { .. } => "entry.appended",
        WidgetEvent::EntryAppeared { .. } => "entry.appeared",
        WidgetEvent::ScrollToBottom { .. } => "list.scroll",
        WidgetEvent::InputCleared => "input.cleared",
    }
}

/// Convert a [`WidgetEvent`] to an SSE-formatted string.
///
/// `entry.appended` carries the raw HTML fragment as its data so HTMX can
/// swap it in directly; every other event carries its JSON payload.
pub fn sse_event(evt: &WidgetEvent) -> String {
    let data = match evt {
        WidgetEvent::EntryAppended { html, .. } => html.clone(),
        WidgetEvent::EntryAppeared { index } => serde_json::json!({ "index": index }).to_string(),
        WidgetEvent::ScrollToBottom { duration_ms } => {
            serde_json::json!({ "duration_ms": duration_ms }).to_string()
        }
        WidgetEvent::InputCleared => "{}".to_string(),
    };

    let mut out = format!("event: {}\n", event_name(evt));
    // A data field may not contain raw newlines.
    for line in data.split('\n') {
        out.push_str("data: ");
        out.push_str(line.trim_end_matches('\r'));
        out.push('\n');
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appended_carries_html() {
        let evt = WidgetEvent::EntryAppended {
            index: 0,
            side: Side::Bot,
            html: "<li>hi</li>".to_string(),
        };
        assert_eq!(sse_event(&evt), "event: entry.appended\ndata: <li>hi</li>\n\n");
    }

    #[test]
    fn test_multiline_data_is_split() {
        let evt = WidgetEvent::EntryAppended {
            index: 1,
            side: Side::Bot,
            html: "<li>a\nb</li>".to_string(),
        };
        let sse = sse_event(&evt);
        assert!(sse.contains("data: <li>a\ndata: b</li>\n"));
        assert!(sse.ends_with("\n\n"));
    }

    #[test]
    fn test_scroll_payload() {
        let sse = sse_event(&WidgetEvent::ScrollToBottom { duration_ms: 300 });
        assert!(sse.starts_with("event: list.scroll\n"));
        assert!(sse.contains(r#""duration_ms":300"#));
    }

    #[test]
    fn test_json_tagging() {
        let json = serde_json::to_string(&WidgetEvent::EntryAppeared { index: 2 }).unwrap();
        assert_eq!(json, r#"{"type":"entry.appeared","data":{"index":2}}"#);
    }
}
