//! Compiled JSON -> [`StoryDocument`].

use serde_json::{Map, Value};
use tracing::debug;

use super::{
    ChoicePoint, Container, ContainerFlags, ContentItem, ControlCommand, Divert, DivertKind,
    DocumentError, StoryDocument,
};
use crate::path::StoryPath;

/// Oldest compiled format version the loader accepts.
pub const MIN_INK_VERSION: u64 = 19;

/// Parse a compiled story from raw bytes.
pub fn load_document(bytes: &[u8]) -> Result<StoryDocument, DocumentError> {
    let value: Value = serde_json::from_slice(bytes)?;
    document_from_value(&value)
}

/// Parse a compiled story from an already-decoded JSON value.
pub fn document_from_value(value: &Value) -> Result<StoryDocument, DocumentError> {
    let object = value
        .as_object()
        .ok_or_else(|| malformed("top level is not an object"))?;

    let ink_version = object
        .get("inkVersion")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("missing or non-integer 'inkVersion'"))?;
    if ink_version < MIN_INK_VERSION {
        return Err(DocumentError::UnsupportedVersion {
            found: ink_version,
            minimum: MIN_INK_VERSION,
        });
    }

    let root = object
        .get("root")
        .ok_or_else(|| malformed("missing 'root'"))?;
    let root = parse_item(root)?;

    debug!(ink_version, "Loaded compiled story");
    Ok(StoryDocument::new(ink_version, root))
}

fn malformed(message: &str) -> DocumentError {
    DocumentError::Malformed(message.to_string())
}

fn parse_item(value: &Value) -> Result<ContentItem, DocumentError> {
    match value {
        Value::Array(items) => Ok(ContentItem::Container(parse_container(items, None)?)),
        Value::String(raw) => Ok(parse_string(raw)),
        Value::Object(object) => parse_object(object),
        other => Ok(ContentItem::Value(other.clone())),
    }
}

fn parse_string(raw: &str) -> ContentItem {
    if let Some(text) = raw.strip_prefix('^') {
        ContentItem::Text(text.to_string())
    } else if raw == "\n" {
        ContentItem::Newline
    } else {
        ContentItem::Control(ControlCommand::parse(raw))
    }
}

fn parse_object(object: &Map<String, Value>) -> Result<ContentItem, DocumentError> {
    let path_field = |key: &str| -> Result<Option<StoryPath>, DocumentError> {
        match object.get(key) {
            None => Ok(None),
            Some(Value::String(raw)) => Ok(Some(StoryPath::parse(raw))),
            Some(_) => Err(DocumentError::Malformed(format!(
                "'{}' target is not a string",
                key
            ))),
        }
    };

    let divert = [
        ("->", DivertKind::Jump),
        ("->t->", DivertKind::Tunnel),
        ("f()", DivertKind::Function),
    ]
    .into_iter()
    .find_map(|(key, kind)| path_field(key).transpose().map(|target| (target, kind)));

    if let Some((target, kind)) = divert {
        return Ok(ContentItem::Divert(Divert {
            target: target?,
            kind,
            conditional: object.get("c").and_then(Value::as_bool).unwrap_or(false),
            variable: object.get("var").and_then(Value::as_bool).unwrap_or(false),
        }));
    }

    if let Some(target) = path_field("*")? {
        let flags = match object.get("flg") {
            Some(value) => value
                .as_u64()
                .and_then(|bits| u32::try_from(bits).ok())
                .ok_or_else(|| malformed("choice 'flg' is not a 32-bit integer"))?,
            None => 0,
        };
        return Ok(ContentItem::ChoicePoint(ChoicePoint { target, flags }));
    }

    Ok(ContentItem::Value(Value::Object(object.clone())))
}

/// A container is an array whose last element is `null` or an object of
/// named sub-containers plus the `#f` and `#n` keys.
fn parse_container(items: &[Value], name: Option<String>) -> Result<Container, DocumentError> {
    let (body, terminator) = match items.split_last() {
        Some((last @ (Value::Null | Value::Object(_)), body)) => (body, Some(last)),
        _ => (items, None),
    };

    let mut container = Container::new(name);
    let mut own_name = None;

    if let Some(Value::Object(meta)) = terminator {
        for (key, value) in meta {
            match key.as_str() {
                "#f" => {
                    let bits = value
                        .as_u64()
                        .and_then(|bits| u8::try_from(bits).ok())
                        .ok_or_else(|| malformed("'#f' is not an 8-bit integer"))?;
                    container = container.with_flags(ContainerFlags(bits));
                }
                "#n" => {
                    own_name = Some(
                        value
                            .as_str()
                            .ok_or_else(|| malformed("'#n' is not a string"))?
                            .to_string(),
                    );
                }
                child_name => {
                    let child_items = value.as_array().ok_or_else(|| {
                        DocumentError::Malformed(format!(
                            "named content '{}' is not a container",
                            child_name
                        ))
                    })?;
                    let child = parse_container(child_items, Some(child_name.to_string()))?;
                    container = container.with_named(child);
                }
            }
        }
    }

    if container.name().is_none() {
        if let Some(own_name) = own_name {
            container.name = Some(own_name);
        }
    }

    for item in body {
        container = container.with_content(parse_item(item)?);
    }

    Ok(container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathComponent;
    use serde_json::json;

    #[test]
    fn test_load_minimal_story() {
        let story = json!({
            "inkVersion": 21,
            "root": [
                [{"->": "start"}, ["done", {"#n": "g-0"}], null],
                "done",
                {
                    "start": ["^Hello", "\n", "end", {"#f": 1}],
                    "global decl": ["ev", "/ev", "end", null]
                }
            ],
            "listDefs": {}
        });

        let doc = load_document(story.to_string().as_bytes()).unwrap();
        assert_eq!(doc.ink_version(), 21);

        let root = doc.root_container().unwrap();
        assert_eq!(root.content().len(), 2);

        let names: Vec<_> = root.named_children().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec![Some("start"), Some("global decl")]);

        let start = doc.container_at(&StoryPath::parse("start")).unwrap();
        assert!(start.visits_tracked());
        assert_eq!(start.content()[0], ContentItem::Text("Hello".to_string()));
        assert_eq!(start.content()[1], ContentItem::Newline);
        assert_eq!(start.content()[2], ContentItem::Control(ControlCommand::End));

        let gather = doc.container_at(&StoryPath::parse("0.1")).unwrap();
        assert_eq!(gather.name(), Some("g-0"));
        assert!(doc.container_at(&StoryPath::parse("0.g-0")).is_ok());
    }

    #[test]
    fn test_parse_divert_and_choice() {
        let story = json!({
            "inkVersion": 21,
            "root": [
                {"->": "knot.stitch", "c": true},
                {"->t->": "tunnel"},
                {"f()": "func"},
                {"*": ".^.c-0", "flg": 20},
                {"VAR?": "x"},
                5,
                null
            ]
        });

        let doc = document_from_value(&story).unwrap();
        let content = doc.root_container().unwrap().content();

        match &content[0] {
            ContentItem::Divert(divert) => {
                assert_eq!(divert.kind, DivertKind::Jump);
                assert!(divert.conditional);
                assert_eq!(divert.target.to_string(), "knot.stitch");
            }
            other => panic!("expected divert, got {:?}", other),
        }
        assert!(matches!(
            &content[1],
            ContentItem::Divert(Divert { kind: DivertKind::Tunnel, .. })
        ));
        assert!(matches!(
            &content[2],
            ContentItem::Divert(Divert { kind: DivertKind::Function, .. })
        ));
        match &content[3] {
            ContentItem::ChoicePoint(choice) => {
                assert_eq!(choice.flags, 20);
                assert!(choice.once_only());
                assert!(!choice.has_condition());
                assert_eq!(choice.target.components()[0], PathComponent::Parent);
            }
            other => panic!("expected choice point, got {:?}", other),
        }
        assert!(matches!(&content[4], ContentItem::Value(_)));
        assert!(matches!(&content[5], ContentItem::Value(_)));
    }

    #[test]
    fn test_rejects_bad_json() {
        assert!(matches!(
            load_document(b"{not json"),
            Err(DocumentError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_old_version() {
        let story = json!({"inkVersion": 10, "root": [null]});
        assert!(matches!(
            document_from_value(&story),
            Err(DocumentError::UnsupportedVersion { found: 10, .. })
        ));
    }

    #[test]
    fn test_rejects_missing_root() {
        let story = json!({"inkVersion": 21});
        assert!(matches!(
            document_from_value(&story),
            Err(DocumentError::Malformed(_))
        ));
    }

    #[test]
    fn test_non_container_root_is_kept() {
        let story = json!({"inkVersion": 21, "root": "done"});
        let doc = document_from_value(&story).unwrap();
        assert!(doc.root_container().is_none());
    }

    #[test]
    fn test_rejects_out_of_range_flags() {
        let container_flags = json!({"inkVersion": 21, "root": ["done", {"#f": 256}]});
        assert!(matches!(
            document_from_value(&container_flags),
            Err(DocumentError::Malformed(_))
        ));

        let choice_flags = json!({
            "inkVersion": 21,
            "root": [{"*": "0", "flg": 4_294_967_296_u64}, null]
        });
        assert!(matches!(
            document_from_value(&choice_flags),
            Err(DocumentError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_non_array_named_content() {
        let story = json!({"inkVersion": 21, "root": ["done", {"start": 3}]});
        assert!(matches!(
            document_from_value(&story),
            Err(DocumentError::Malformed(_))
        ));
    }
}
