use serde::Deserialize;
use serde_json::{Map, Value};

use super::blocks::plain_text;

#[derive(Deserialize, Debug)]
pub struct DatabaseProperty {
    pub id: String,
    #[serde(rename = "type")]
    pub typ: String,
}

#[derive(Deserialize, Debug)]
pub struct RetrieveDatabaseResp {
    pub id: String,
    pub properties: std::collections::HashMap<String, DatabaseProperty>,
}

/// One page of a paginated list endpoint.
#[derive(Deserialize, Debug)]
pub struct ListResp<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Block {
    pub id: String,
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Block {
    pub fn is_heading(&self) -> bool {
        matches!(self.typ.as_str(), "heading_1" | "heading_2" | "heading_3")
    }

    pub fn plain_text(&self) -> String {
        self.body
            .get(&self.typ)
            .map(|b| plain_text(&b["rich_text"]))
            .unwrap_or_default()
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Page {
    /// Text of a title or rich_text property.
    pub fn text_property(&self, name: &str) -> String {
        match self.properties.get(name) {
            Some(p) => {
                let typ = p["type"].as_str().unwrap_or("rich_text");
                plain_text(&p[typ])
            }
            None => String::new(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct Created {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_exposes_heading_text() {
        let block: Block = serde_json::from_value(json!({
            "object": "block",
            "id": "b1",
            "type": "heading_1",
            "has_children": false,
            "heading_1": { "rich_text": [{ "plain_text": "📖 담당자별 기도제목" }] }
        }))
        .unwrap();
        assert!(block.is_heading());
        assert_eq!(block.plain_text(), "📖 담당자별 기도제목");
    }

    #[test]
    fn page_reads_title_and_rich_text_properties() {
        let page: Page = serde_json::from_value(json!({
            "id": "p1",
            "properties": {
                "이름": { "type": "title", "title": [{ "plain_text": "행사" }] },
                "배치": { "type": "rich_text", "rich_text": [{ "plain_text": "run-1" }] }
            }
        }))
        .unwrap();
        assert!(!page.archived);
        assert_eq!(page.text_property("이름"), "행사");
        assert_eq!(page.text_property("배치"), "run-1");
        assert_eq!(page.text_property("없음"), "");
    }

    #[test]
    fn database_response_keeps_only_property_types() {
        let db: RetrieveDatabaseResp = serde_json::from_value(json!({
            "object": "database",
            "id": "db1",
            "title": [{ "plain_text": "기도 일정" }],
            "properties": {
                "날짜": { "id": "a%3Db", "type": "date", "date": {} }
            }
        }))
        .unwrap();
        assert_eq!(db.id, "db1");
        assert_eq!(db.properties["날짜"].typ, "date");
    }

    #[test]
    fn list_response_defaults() {
        let list: ListResp<Created> =
            serde_json::from_value(json!({ "results": [{ "id": "a" }] })).unwrap();
        assert_eq!(list.results[0].id, "a");
        assert!(!list.has_more);
        assert!(list.next_cursor.is_none());
    }
}
