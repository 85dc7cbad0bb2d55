//! JSON builders for the Notion block types the page layout uses.
use serde_json::{json, Map, Value};

/// Notion rejects rich-text segments longer than this many characters.
pub const MAX_TEXT_CHARS: usize = 2000;

/// A block plus the children that must be appended under it.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub block: Value,
    pub children: Vec<BlockNode>,
}

impl BlockNode {
    pub fn leaf(block: Value) -> Self {
        Self {
            block,
            children: Vec::new(),
        }
    }

    pub fn with_children(block: Value, children: Vec<BlockNode>) -> Self {
        Self { block, children }
    }

    pub fn block_type(&self) -> &str {
        self.block["type"].as_str().unwrap_or_default()
    }

    /// Fully nested JSON, children embedded under `<type>.children`.
    pub fn to_json(&self) -> Value {
        let mut block = self.block.clone();
        if !self.children.is_empty() {
            let typ = self.block_type().to_string();
            let children: Vec<Value> = self.children.iter().map(BlockNode::to_json).collect();
            if let Some(body) = block.get_mut(&typ).and_then(Value::as_object_mut) {
                body.insert("children".into(), Value::Array(children));
            }
        }
        block
    }

    /// Number of blocks in this subtree, including itself.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(BlockNode::count).sum::<usize>()
    }
}

/// Split `content` into rich-text segments that respect `MAX_TEXT_CHARS`.
pub fn rich_text(content: &str, annotations: Option<Value>) -> Vec<Value> {
    let chars: Vec<char> = content.chars().collect();
    let pieces: Vec<String> = if chars.is_empty() {
        vec![String::new()]
    } else {
        chars
            .chunks(MAX_TEXT_CHARS)
            .map(|c| c.iter().collect())
            .collect()
    };
    pieces
        .into_iter()
        .map(|piece| {
            let mut seg = Map::new();
            seg.insert("type".into(), json!("text"));
            seg.insert("text".into(), json!({ "content": piece }));
            if let Some(a) = &annotations {
                seg.insert("annotations".into(), a.clone());
            }
            Value::Object(seg)
        })
        .collect()
}

pub fn heading_1(text: &str, color: Option<&str>) -> Value {
    let annotations = match color {
        Some(c) => json!({ "bold": true, "color": c }),
        None => json!({ "bold": true }),
    };
    json!({
        "object": "block",
        "type": "heading_1",
        "heading_1": { "rich_text": rich_text(text, Some(annotations)) }
    })
}

pub fn callout(text: &str, emoji: &str, color: &str) -> Value {
    json!({
        "object": "block",
        "type": "callout",
        "callout": {
            "rich_text": rich_text(text, None),
            "icon": { "type": "emoji", "emoji": emoji },
            "color": color
        }
    })
}

pub fn toggle(text: &str, color: Option<&str>) -> Value {
    let annotations = match color {
        Some(c) => json!({ "bold": true, "color": c }),
        None => json!({ "bold": true }),
    };
    json!({
        "object": "block",
        "type": "toggle",
        "toggle": { "rich_text": rich_text(text, Some(annotations)) }
    })
}

pub fn paragraph(text: &str) -> Value {
    json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": { "rich_text": rich_text(text, None) }
    })
}

pub fn divider() -> Value {
    json!({ "object": "block", "type": "divider", "divider": {} })
}

/// Concatenated text of a block's (or property's) `rich_text`/`title` array.
pub fn plain_text(segments: &Value) -> String {
    segments
        .as_array()
        .map(|segs| {
            segs.iter()
                .filter_map(|s| {
                    s.get("plain_text")
                        .or_else(|| s.get("text").and_then(|t| t.get("content")))
                        .and_then(Value::as_str)
                })
                .collect()
        })
        .unwrap_or_default()
}
