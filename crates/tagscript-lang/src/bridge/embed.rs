//! Rich embeds: the `embed(...)` built-in, its builder methods, and the
//! conversion of script values into message payloads.

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::runtime::value::{Object, Value};
use crate::syntax::cst::Span;
use crate::types::registry::{arg, invalid_arg, TypeDesc};
use crate::types::time::{from_millis, parse_time};

const MAX_TITLE: usize = 256;
const MAX_DESCRIPTION: usize = 4096;
const MAX_FIELDS: usize = 25;
const MAX_FIELD_NAME: usize = 256;
const MAX_FIELD_VALUE: usize = 1024;
const MAX_FOOTER: usize = 2048;
const MAX_AUTHOR: usize = 256;
const MAX_TOTAL: usize = 6000;
const MAX_CONTENT: usize = 2000;

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbedDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    /// RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedMedia {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Body of `channel.send` / `message.edit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<EmbedDescriptor>,
}

// ─── Value → descriptor ───────────────────────────────────────────────────────

pub fn is_embed(v: &Value) -> bool {
    matches!(v, Value::Object(o) if o.class == Some("embed"))
}

fn text(o: &Object, key: &str) -> Option<String> {
    o.get(key).and_then(|v| v.to_display())
}

fn media(v: Option<Value>) -> Option<EmbedMedia> {
    match v? {
        Value::Object(o) => text(&o, "url").map(|url| EmbedMedia { url }),
        other => other.to_display().map(|url| EmbedMedia { url }),
    }
}

fn color(v: Option<Value>, span: Span) -> Result<Option<u32>, RuntimeError> {
    let bad = || invalid_arg(span, "embed color must be a number or a '#rrggbb' string");
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) if n >= 0.0 && n <= 0xFF_FFFF as f64 && n.fract() == 0.0 => Ok(Some(n as u32)),
        Some(Value::String(s)) => {
            let hex = s.strip_prefix('#').unwrap_or(&s);
            if hex.len() != 6 {
                return Err(bad());
            }
            u32::from_str_radix(hex, 16).map(Some).map_err(|_| bad())
        }
        Some(_) => Err(bad()),
    }
}

fn timestamp(v: Option<Value>, span: Span) -> Result<Option<String>, RuntimeError> {
    let t = match v {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Time(t)) => Some(t),
        Some(Value::Number(ms)) => from_millis(ms),
        Some(Value::String(s)) => parse_time(&s),
        Some(_) => None,
    };
    t.map(|t| Some(Value::Time(t).stringify()))
        .ok_or_else(|| invalid_arg(span, "embed timestamp must be a time, milliseconds or an ISO string"))
}

/// Read an embed out of any object with embed-shaped properties.
pub fn from_value(v: &Value, span: Span) -> Result<EmbedDescriptor, RuntimeError> {
    let Value::Object(o) = v else {
        return Err(invalid_arg(span, format!("embed expects an object, got {}", v.type_name())));
    };

    let footer = match o.get("footer") {
        None | Some(Value::Null) => None,
        Some(Value::Object(f)) => text(&f, "text").map(|t| EmbedFooter { text: t, icon_url: text(&f, "iconUrl") }),
        Some(other) => other.to_display().map(|t| EmbedFooter { text: t, icon_url: None }),
    };
    let author = match o.get("author") {
        None | Some(Value::Null) => None,
        Some(Value::Object(a)) => text(&a, "name").map(|name| EmbedAuthor {
            name,
            url: text(&a, "url"),
            icon_url: text(&a, "iconUrl"),
        }),
        Some(other) => other.to_display().map(|name| EmbedAuthor { name, url: None, icon_url: None }),
    };

    let mut fields = Vec::new();
    match o.get("fields") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for (i, item) in items.read().iter().enumerate() {
                let Value::Object(f) = item else {
                    return Err(invalid_arg(span, format!("embed field {} must be an object", i + 1)));
                };
                let (Some(name), Some(value)) = (text(f, "name"), text(f, "value")) else {
                    return Err(invalid_arg(span, format!("embed field {} needs a name and a value", i + 1)));
                };
                let inline = f.get("inline").is_some_and(|v| v.truthy());
                fields.push(EmbedField { name, value, inline });
            }
        }
        Some(_) => return Err(invalid_arg(span, "embed fields must be an array")),
    }

    let desc = EmbedDescriptor {
        title: text(o, "title"),
        description: text(o, "description"),
        url: text(o, "url"),
        color: color(o.get("color"), span)?,
        timestamp: timestamp(o.get("timestamp"), span)?,
        footer,
        image: media(o.get("image")),
        thumbnail: media(o.get("thumbnail")),
        author,
        fields,
    };
    validate(&desc, span)?;
    Ok(desc)
}

fn validate(d: &EmbedDescriptor, span: Span) -> Result<(), RuntimeError> {
    let len = |s: &Option<String>| s.as_deref().map_or(0, |s| s.chars().count());
    let check = |what: &str, n: usize, max: usize| {
        if n > max {
            Err(invalid_arg(span, format!("embed {what} is longer than {max} characters")))
        } else {
            Ok(())
        }
    };

    check("title", len(&d.title), MAX_TITLE)?;
    check("description", len(&d.description), MAX_DESCRIPTION)?;
    let footer = d.footer.as_ref().map_or(0, |f| f.text.chars().count());
    check("footer", footer, MAX_FOOTER)?;
    let author = d.author.as_ref().map_or(0, |a| a.name.chars().count());
    check("author name", author, MAX_AUTHOR)?;
    if d.fields.len() > MAX_FIELDS {
        return Err(invalid_arg(span, format!("embed has more than {MAX_FIELDS} fields")));
    }
    let mut total = len(&d.title) + len(&d.description) + footer + author;
    for f in &d.fields {
        check("field name", f.name.chars().count(), MAX_FIELD_NAME)?;
        check("field value", f.value.chars().count(), MAX_FIELD_VALUE)?;
        total += f.name.chars().count() + f.value.chars().count();
    }
    check("text", total, MAX_TOTAL)
}

/// What a reply or `send` puts on the wire.
pub fn payload(v: &Value, span: Span) -> Result<MessagePayload, RuntimeError> {
    if is_embed(v) {
        return Ok(MessagePayload { content: None, embed: Some(from_value(v, span)?) });
    }
    let content = v.to_display().filter(|s| !s.is_empty())
        .ok_or_else(|| invalid_arg(span, "cannot send an empty message"))?;
    if content.chars().count() > MAX_CONTENT {
        return Err(invalid_arg(span, format!("message is longer than {MAX_CONTENT} characters")));
    }
    Ok(MessagePayload { content: Some(content), embed: None })
}

// ─── Built-in and builder ─────────────────────────────────────────────────────

/// `embed({...})`
pub fn embed(_: &Value, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let init = arg(args, 0);
    let props = match init {
        Value::Null => Default::default(),
        Value::Object(o) => {
            from_value(init, span)?;
            o.props.read().clone()
        }
        other => return Err(invalid_arg(span, format!("embed expects an object, got {}", other.type_name()))),
    };
    Ok(Value::entity("embed", props))
}

/// Set one property after checking the result is still a valid embed.
fn set(this: &Value, key: &str, value: Value, span: Span) -> Result<Value, RuntimeError> {
    let Value::Object(o) = this else { return Ok(Value::Null) };
    let mut props = o.props.read().clone();
    props.insert(key.to_string(), value.clone());
    from_value(&Value::object(props), span)?;
    o.set(key, value);
    Ok(this.clone())
}

fn pair(a: (&str, Value), b: (&str, &Value)) -> Value {
    let mut props = indexmap::IndexMap::new();
    props.insert(a.0.to_string(), a.1);
    if !b.1.is_null() {
        props.insert(b.0.to_string(), b.1.clone());
    }
    Value::object(props)
}

pub fn embed_desc() -> TypeDesc {
    TypeDesc::new("embed")
        .method("setTitle", |this, args, span| set(this, "title", arg(args, 0).clone(), span))
        .method("setDescription", |this, args, span| set(this, "description", arg(args, 0).clone(), span))
        .method("setUrl", |this, args, span| set(this, "url", arg(args, 0).clone(), span))
        .method("setColor", |this, args, span| set(this, "color", arg(args, 0).clone(), span))
        .method("setTimestamp", |this, args, span| set(this, "timestamp", arg(args, 0).clone(), span))
        .method("setImage", |this, args, span| set(this, "image", arg(args, 0).clone(), span))
        .method("setThumbnail", |this, args, span| set(this, "thumbnail", arg(args, 0).clone(), span))
        .method("setFooter", |this, args, span| {
            let footer = pair(("text", arg(args, 0).clone()), ("iconUrl", arg(args, 1)));
            set(this, "footer", footer, span)
        })
        .method("setAuthor", |this, args, span| {
            let author = pair(("name", arg(args, 0).clone()), ("iconUrl", arg(args, 1)));
            set(this, "author", author, span)
        })
        .method("addField", |this, args, span| {
            let Value::Object(o) = this else { return Ok(Value::Null) };
            let mut field = indexmap::IndexMap::new();
            field.insert("name".to_string(), arg(args, 0).clone());
            field.insert("value".to_string(), arg(args, 1).clone());
            field.insert("inline".to_string(), Value::Boolean(arg(args, 2).truthy()));
            let mut fields = match o.get("fields") {
                Some(Value::Array(items)) => items.read().clone(),
                _ => Vec::new(),
            };
            fields.push(Value::object(field));
            set(this, "fields", Value::array(fields), span)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn obj(pairs: &[(&str, Value)]) -> Value {
        Value::object(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<IndexMap<_, _>>())
    }

    #[test]
    fn reads_shorthand_and_nested_forms() {
        let v = obj(&[
            ("title", Value::string("Hi")),
            ("color", Value::string("#ff0000")),
            ("footer", Value::string("bye")),
            ("image", obj(&[("url", Value::string("https://x/y.png"))])),
            ("fields", Value::array(vec![obj(&[("name", Value::string("a")), ("value", Value::Number(1.0))])])),
        ]);
        let d = from_value(&v, Span::default()).unwrap();
        assert_eq!(d.title.as_deref(), Some("Hi"));
        assert_eq!(d.color, Some(0xFF0000));
        assert_eq!(d.footer.unwrap().text, "bye");
        assert_eq!(d.image.unwrap().url, "https://x/y.png");
        assert_eq!(d.fields, vec![EmbedField { name: "a".into(), value: "1".into(), inline: false }]);
    }

    #[test]
    fn enforces_limits() {
        let long = Value::String("x".repeat(MAX_TITLE + 1));
        assert!(from_value(&obj(&[("title", long)]), Span::default()).is_err());
        let fields = Value::array(vec![obj(&[("name", Value::string("n"))])]);
        assert!(from_value(&obj(&[("fields", fields)]), Span::default()).is_err());
        assert!(from_value(&obj(&[("color", Value::Number(-1.0))]), Span::default()).is_err());
    }

    #[test]
    fn builder_methods_validate_before_writing() {
        let e = embed(&Value::Null, &[], Span::default()).unwrap();
        set(&e, "title", Value::string("ok"), Span::default()).unwrap();
        assert!(set(&e, "color", Value::string("nope"), Span::default()).is_err());
        let d = from_value(&e, Span::default()).unwrap();
        assert_eq!(d.title.as_deref(), Some("ok"));
        assert_eq!(d.color, None);
    }

    #[test]
    fn payload_of_plain_values() {
        let p = payload(&Value::Number(3.0), Span::default()).unwrap();
        assert_eq!(p.content.as_deref(), Some("3"));
        assert!(payload(&Value::Null, Span::default()).is_err());
        let wire = serde_json::to_value(&p).unwrap();
        assert_eq!(wire, serde_json::json!({"content": "3"}));
    }
}
