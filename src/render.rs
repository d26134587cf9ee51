//! Output of the merged tree: fragment syntax for humans, JSON for tools.
use std::fmt::Write as _;

use serde_json::{Map, Number, Value as Json};

use crate::fragment::{Scalar, Value};
use crate::merge::{Entry, GlobalNode, GlobalTree};

const INDENT: &str = "    ";

/// Render the whole tree back into fragment syntax.
///
/// Derived classes already hold a copy of everything they inherited, so the
/// base is written as a comment (`class Name /* inherits Base */`) and the
/// text merges back to the same members no matter where the base class
/// ended up in creation order. Appends are already folded into plain arrays.
#[must_use]
pub fn to_text(tree: &GlobalTree) -> String {
    let mut out = String::new();
    for class in tree.classes() {
        write_class(&mut out, class, 0);
    }
    out
}

/// Render one query result: a value on a single line, a class as a block.
#[must_use]
pub fn entry_to_text(entry: Entry<'_>) -> String {
    match entry {
        Entry::Value(value) => format!("{value}\n"),
        Entry::Class(node) => {
            let mut out = String::new();
            write_class(&mut out, node, 0);
            out
        }
    }
}

fn write_class(out: &mut String, node: &GlobalNode, depth: usize) {
    let pad = INDENT.repeat(depth);
    let header = node.parent().map_or_else(
        || format!("class {}", node.name()),
        |base| format!("class {} /* inherits {base} */", node.name()),
    );
    if node.is_empty() {
        let _ = writeln!(out, "{pad}{header} {{}};");
        return;
    }
    let _ = writeln!(out, "{pad}{header}");
    let _ = writeln!(out, "{pad}{{");
    for property in node.properties() {
        let brackets = if property.value.is_array() { "[]" } else { "" };
        let _ = writeln!(
            out,
            "{pad}{INDENT}{}{brackets} = {};",
            property.name, property.value
        );
    }
    for child in node.children() {
        write_class(out, child, depth + 1);
    }
    let _ = writeln!(out, "{pad}}};");
}

/// Convert the whole tree to JSON.
///
/// Every class becomes an object with `parent`, `properties` and `classes`
/// members; member order follows declaration order.
#[must_use]
pub fn to_json(tree: &GlobalTree) -> Json {
    classes_to_json(tree.classes())
}

/// Convert one query result to JSON.
#[must_use]
pub fn entry_to_json(entry: Entry<'_>) -> Json {
    match entry {
        Entry::Value(value) => value_to_json(value),
        Entry::Class(node) => node_to_json(node),
    }
}

fn classes_to_json<'a>(classes: impl Iterator<Item = &'a GlobalNode>) -> Json {
    Json::Object(
        classes
            .map(|class| (class.name().to_string(), node_to_json(class)))
            .collect(),
    )
}

fn node_to_json(node: &GlobalNode) -> Json {
    let properties: Map<String, Json> = node
        .properties()
        .map(|p| (p.name.clone(), value_to_json(&p.value)))
        .collect();
    let mut object = Map::new();
    object.insert(
        "parent".to_string(),
        node.parent().map_or(Json::Null, |p| Json::String(p.to_string())),
    );
    object.insert("properties".to_string(), Json::Object(properties));
    object.insert("classes".to_string(), classes_to_json(node.children()));
    Json::Object(object)
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Scalar(scalar) => scalar_to_json(scalar),
        Value::Array(items) => Json::Array(items.iter().map(scalar_to_json).collect()),
    }
}

fn scalar_to_json(scalar: &Scalar) -> Json {
    match scalar {
        Scalar::String(s) => Json::String(s.clone()),
        Scalar::Bool(b) => Json::Bool(*b),
        Scalar::Number(raw) => scalar
            .as_i64()
            .map(Number::from)
            .or_else(|| scalar.as_f64().and_then(Number::from_f64))
            .map_or_else(|| Json::String(raw.clone()), Json::Number),
    }
}
