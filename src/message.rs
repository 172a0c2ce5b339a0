//! Message records and their display text.
//!
//! A [`Message`] is the transient description of one chat line. It has no
//! identity of its own; once appended to a [`MessageStore`](crate::store::MessageStore)
//! its position in the list is the only key it ever gets.

use std::fmt;

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

/// Which side of the conversation a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Typed by the person using the widget.
    User,
    /// Returned by the remote query service (or the greeting).
    Bot,
}

impl Side {
    /// CSS class used for the list entry.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::User => "user",
            Side::Bot => "bot",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A piece of display text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Segment {
    /// Literal text. Rendered escaped.
    Text(String),
    /// A visual line break.
    LineBreak,
}

/// Display text of a message, split into text runs and line breaks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageText(Vec<Segment>);

impl MessageText {
    /// Text shown exactly as received. Newlines stay inside the text run.
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Self::default();
        }
        Self(vec![Segment::Text(text)])
    }

    /// Text with every `\r\n`, `\r` and `\n` turned into a [`Segment::LineBreak`].
    pub fn with_line_breaks(text: &str) -> Self {
        let mut segments = Vec::new();
        let mut run = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\r' | '\n' => {
                    if c == '\r' && chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    if !run.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut run)));
                    }
                    segments.push(Segment::LineBreak);
                }
                _ => run.push(c),
            }
        }
        if !run.is_empty() {
            segments.push(Segment::Text(run));
        }

        Self(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of line breaks in the text.
    pub fn line_breaks(&self) -> usize {
        self.0
            .iter()
            .filter(|s| matches!(s, Segment::LineBreak))
            .count()
    }
}

impl fmt::Display for MessageText {
    /// Plain-text view, line breaks as `\n`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            match segment {
                Segment::Text(text) => f.write_str(text)?,
                Segment::LineBreak => f.write_str("\n")?,
            }
        }
        Ok(())
    }
}

/// One chat line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub text: MessageText,
    pub side: Side,
    pub timestamp: DateTime<Local>,
}

impl Message {
    /// Build a message, defaulting the timestamp to now.
    pub fn new(text: MessageText, side: Side, timestamp: Option<DateTime<Local>>) -> Self {
        Self {
            text,
            side,
            timestamp: timestamp.unwrap_or_else(Local::now),
        }
    }

    /// A user message. Newline sequences become line breaks.
    pub fn user(raw: &str) -> Self {
        Self::new(MessageText::with_line_breaks(raw), Side::User, None)
    }

    /// A bot message. The text is kept verbatim.
    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(MessageText::plain(text), Side::Bot, None)
    }

    /// The timestamp as shown under the message.
    pub fn display_time(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

/// Format a time as `"Jan 5, 3:42 PM"`.
pub fn format_timestamp<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    time.format("%b %-d, %-I:%M %p").to_string()
}
