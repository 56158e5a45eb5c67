//! Structured notification content
//!
//! A message is a list of content tokens so each channel can render it in its
//! own dialect without the runner knowing channel details.

use serde::{Deserialize, Serialize};

use crate::storage::MonitorStatus;

/// One piece of message content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentToken {
    Text { content: String },
    Bold { content: String },
    Code { content: String },
    Url { url: String, label: Option<String> },
    Newline,
}

impl ContentToken {
    pub fn text(content: impl Into<String>) -> Self {
        ContentToken::Text { content: content.into() }
    }

    pub fn bold(content: impl Into<String>) -> Self {
        ContentToken::Bold { content: content.into() }
    }

    pub fn code(content: impl Into<String>) -> Self {
        ContentToken::Code { content: content.into() }
    }

    pub fn url(url: impl Into<String>, label: Option<String>) -> Self {
        ContentToken::Url { url: url.into(), label }
    }
}

/// A titled message ready for dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub title: String,
    pub tokens: Vec<ContentToken>,

    /// Transition that caused the message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MonitorStatus>,
}

impl NotificationMessage {
    pub fn new(title: impl Into<String>, tokens: Vec<ContentToken>) -> Self {
        Self {
            title: title.into(),
            tokens,
            status: None,
        }
    }

    pub fn with_status(mut self, status: MonitorStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Render without any markup
    pub fn to_plain_text(&self) -> String {
        render_plain(&self.tokens)
    }
}

pub fn render_plain(tokens: &[ContentToken]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            ContentToken::Text { content } | ContentToken::Bold { content } | ContentToken::Code { content } => {
                out.push_str(content)
            }
            ContentToken::Url { url, label: Some(label) } => {
                out.push_str(label);
                out.push_str(" (");
                out.push_str(url);
                out.push(')');
            }
            ContentToken::Url { url, label: None } => out.push_str(url),
            ContentToken::Newline => out.push('\n'),
        }
    }
    out
}

/// Escapes text for Telegram MarkdownV2.
/// Characters to escape: _ * [ ] ( ) ~ ` > # + - = | { } . !
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|' | '{' | '}' | '.'
            | '!' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Inside inline code and link targets only `` ` `` and `\` need escaping
fn escape_markdown_v2_code(text: &str) -> String {
    text.replace('\\', "\\\\").replace('`', "\\`")
}

fn escape_markdown_v2_url(text: &str) -> String {
    text.replace('\\', "\\\\").replace(')', "\\)")
}

pub fn render_telegram(tokens: &[ContentToken]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            ContentToken::Text { content } => out.push_str(&escape_markdown_v2(content)),
            ContentToken::Bold { content } => {
                out.push('*');
                out.push_str(&escape_markdown_v2(content));
                out.push('*');
            }
            ContentToken::Code { content } => {
                out.push('`');
                out.push_str(&escape_markdown_v2_code(content));
                out.push('`');
            }
            ContentToken::Url { url, label } => {
                let label = label.as_deref().unwrap_or(url);
                out.push('[');
                out.push_str(&escape_markdown_v2(label));
                out.push_str("](");
                out.push_str(&escape_markdown_v2_url(url));
                out.push(')');
            }
            ContentToken::Newline => out.push('\n'),
        }
    }
    out
}

pub fn render_discord(tokens: &[ContentToken]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            ContentToken::Text { content } => out.push_str(content),
            ContentToken::Bold { content } => {
                out.push_str("**");
                out.push_str(content);
                out.push_str("**");
            }
            ContentToken::Code { content } => {
                out.push('`');
                out.push_str(content);
                out.push('`');
            }
            ContentToken::Url { url, label: Some(label) } => out.push_str(&format!("[{label}]({url})")),
            ContentToken::Url { url, label: None } => out.push_str(url),
            ContentToken::Newline => out.push('\n'),
        }
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// HTML fragment for mail bodies
pub fn render_html(tokens: &[ContentToken]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            ContentToken::Text { content } => out.push_str(&escape_html(content)),
            ContentToken::Bold { content } => out.push_str(&format!("<b>{}</b>", escape_html(content))),
            ContentToken::Code { content } => out.push_str(&format!("<code>{}</code>", escape_html(content))),
            ContentToken::Url { url, label } => {
                let label = label.as_deref().unwrap_or(url);
                out.push_str(&format!("<a href=\"{}\">{}</a>", escape_html(url), escape_html(label)));
            }
            ContentToken::Newline => out.push_str("<br>\n"),
        }
    }
    out
}
