//! Document scanning: walks a document once and emits its records.

use std::collections::HashMap;

use vaultdex_types::{DocPath, DocStat, Heading};

use crate::config::BlocksConfig;
use crate::models::Record;
use crate::parser::{parse_block, parse_task_line, BlockContext, LineContext};
use crate::text;

/// Everything the scanner needs to know about one document
#[derive(Debug, Clone, Copy)]
pub struct DocumentInput<'a> {
    pub path: &'a DocPath,
    pub content: &'a str,
    pub stat: DocStat,
    /// Headings with 0-based start lines
    pub headings: &'a [Heading],
}

/// Scans documents into ordered record sets
#[derive(Debug, Clone)]
pub struct DocumentScanner {
    blocks: BlocksConfig,
}

impl DocumentScanner {
    pub fn new(blocks: BlocksConfig) -> Self {
        Self { blocks }
    }

    /// Parse every task line and delimited block of a document
    ///
    /// Records are stamped with the document timestamps, the enclosing heading
    /// and the heading's inline tags.
    pub fn scan(&self, doc: DocumentInput<'_>) -> Vec<Record> {
        let lines: Vec<&str> = doc.content.lines().collect();
        let headings: HashMap<usize, &str> = doc
            .headings
            .iter()
            .map(|h| (h.start_line, h.text.as_str()))
            .collect();

        let path = doc.path.as_str();
        let folder = doc.path.parent_folder();
        let mut current_header: Option<String> = None;
        let mut section_tags: Vec<String> = Vec::new();
        let mut records = Vec::new();

        let mut i = 0;
        while i < lines.len() {
            if let Some(text) = headings.get(&i) {
                section_tags = text::collect_tags(text);
                let stripped = text::strip_tags(text);
                current_header = Some(stripped).filter(|h| !h.is_empty());
            }

            let line = lines[i];
            if line.trim() == self.blocks.start {
                if let Some(end) = self.find_block_end(&lines, i) {
                    let ctx = BlockContext {
                        path,
                        folder,
                        start: i,
                        end,
                    };
                    if let Some(record) = parse_block(&lines, ctx) {
                        records.push(self.stamp(record, &doc, &current_header, &section_tags));
                    }
                    i = end + 1;
                    continue;
                }
            }

            let ctx = LineContext {
                path,
                folder,
                line: i + 1,
            };
            if let Some(record) = parse_task_line(line, ctx) {
                records.push(self.stamp(record, &doc, &current_header, &section_tags));
            }
            i += 1;
        }

        records
    }

    fn find_block_end(&self, lines: &[&str], start: usize) -> Option<usize> {
        lines
            .iter()
            .enumerate()
            .skip(start + 1)
            .find(|(_, l)| l.trim() == self.blocks.end)
            .map(|(idx, _)| idx)
    }

    fn stamp(
        &self,
        mut record: Record,
        doc: &DocumentInput<'_>,
        header: &Option<String>,
        section_tags: &[String],
    ) -> Record {
        record.created = doc.stat.ctime;
        record.modified = doc.stat.mtime;
        record.header = header.clone();
        record.tags.extend(section_tags.iter().cloned());
        record
    }
}

impl Default for DocumentScanner {
    fn default() -> Self {
        Self::new(BlocksConfig::default())
    }
}
