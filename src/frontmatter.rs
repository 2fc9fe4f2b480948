//! YAML front-matter extraction for markdown pages.
//!
//! Only a metadata block that opens the document counts as front-matter. The markdown body is
//! never touched here; rendering it is the presentation layer's job.
use pulldown_cmark::{
    Event as MdEvent, MetadataBlockKind, Options, Parser as MdParser, Tag as MdTag,
    TagEnd as MdTagEnd,
};
use serde_json::Value;

use crate::error::ContentError;

fn frontmatter_options() -> Options {
    let mut md_options = Options::empty();
    md_options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    md_options
}

/// Return the raw YAML of the leading metadata block, if the document has one.
pub fn frontmatter_block(markdown: &str) -> Option<String> {
    let mut events = MdParser::new_ext(markdown, frontmatter_options());
    match events.next() {
        Some(MdEvent::Start(MdTag::MetadataBlock(MetadataBlockKind::YamlStyle))) => {}
        _ => return None,
    }
    let mut accumulator = String::new();
    for event in events {
        match event {
            MdEvent::Text(text) => accumulator.push_str(&text),
            MdEvent::End(MdTagEnd::MetadataBlock(_)) => return Some(accumulator),
            _ => {}
        }
    }
    // Unterminated block
    None
}

/// Parse the leading metadata block of `markdown` as YAML.
///
/// `Ok(None)` when there is no block or the block is blank.
pub fn parse_frontmatter(path: &str, markdown: &str) -> Result<Option<Value>, ContentError> {
    let Some(block) = frontmatter_block(markdown) else {
        return Ok(None);
    };
    if block.trim().is_empty() {
        return Ok(None);
    }
    serde_yaml::from_str::<Value>(&block)
        .map(Some)
        .map_err(|e| ContentError::parse(path, e))
}
