//! Heading lookup for markdown documents.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use vaultdex_types::Heading;

/// List the headings of a markdown document with their 0-based start lines
pub fn extract_headings(markdown: &str) -> Vec<Heading> {
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(markdown.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    let line_of = |offset: usize| match line_starts.binary_search(&offset) {
        Ok(line) => line,
        Err(next) => next.saturating_sub(1),
    };

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut headings = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (event, range) in Parser::new_ext(markdown, options).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                current = Some((line_of(range.start), String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, ref mut title)) = current {
                    title.push_str(text.as_ref());
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((start_line, text)) = current.take() {
                    headings.push(Heading {
                        start_line,
                        text: text.trim().to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    headings
}
