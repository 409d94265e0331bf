//! What the browser UI shows: page chrome, example prompts and transcript markup.

use pulldown_cmark::{Event, Options, Parser, html};

use crate::conversation::Conversation;

pub const TITLE: &str = "Mistral Coding Assistant";
pub const DESCRIPTION: &str = "A chatbot that helps with coding tasks.";

pub const EXAMPLE_PROMPTS: &[&str] = &[
    "What is the syntax for a for loop in Python?",
    "How do I create a new list in Python?",
];

/// The single-page UI.
pub const INDEX_HTML: &str = include_str!("../assets/index.html");

/// HTML for the output pane: one block per turn, a role header followed by
/// the turn's content rendered as Markdown.
///
/// Raw HTML inside turns is escaped rather than passed through.
pub fn render_html(conversation: &Conversation) -> String {
    let mut out = String::new();
    for turn in conversation.turns() {
        let label = turn.role.label();
        out.push_str(&format!(
            "<div class=\"turn turn-{}\">\n<p><strong>{label}:</strong></p>\n",
            label.to_ascii_lowercase()
        ));
        out.push_str(&markdown_to_html(&turn.content));
        out.push_str("</div>\n");
    }
    out
}

fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH)
        .map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
