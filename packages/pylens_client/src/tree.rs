//! Renders inspection results as a navigable tree of rows.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use pylens_protocol::{
    AttributeEntry, Category, ErrorInfo, InspectionNode, MethodEntry, MethodInfo, ObjectInfo,
};
use serde_json::Value;

use crate::navigator::child_path;

/// Path whose attributes are grouped by top-level package.
pub const MODULE_REGISTRY: &str = "sys.modules";

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTree {
    /// Path the tree was rendered for.
    pub path: String,
    pub header: Header,
    pub methods: Vec<Row>,
    pub attributes: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    Object {
        type_name: String,
        category: Category,
        doc: Option<String>,
        /// Label/value pairs, nulls already removed.
        metadata: Vec<(String, String)>,
    },
    Error(ErrorInfo),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub name: String,
    pub type_name: String,
    pub category: Category,
    /// Inspection path of this member.
    pub path: String,
    pub detail: Detail,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Detail {
    Method(MethodDetail),
    Value {
        value: Option<String>,
        /// Length and element/key/value types of containers.
        summary: Option<String>,
    },
    Error(ErrorInfo),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodDetail {
    pub method_type: Option<String>,
    pub decorators: Vec<String>,
    pub signature: Option<String>,
    pub return_type: Option<String>,
    pub flags: Vec<&'static str>,
    pub doc: Option<String>,
    pub source: Option<String>,
    pub source_file: Option<String>,
    /// Call expression staged for editing; only for runnable methods.
    pub run: Option<String>,
}

impl RenderedTree {
    /// Methods then attributes, in display order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.methods.iter().chain(self.attributes.iter())
    }

    /// Row by its 1-based display number.
    pub fn row(&self, number: usize) -> Option<&Row> {
        number.checked_sub(1).and_then(|i| self.rows().nth(i))
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        match &self.header {
            Header::Error(error) => {
                let _ = writeln!(out, "{}: {error}", self.path);
                return out;
            }
            Header::Object {
                type_name,
                category,
                doc,
                metadata,
            } => {
                let _ = writeln!(out, "{} : {type_name} ({category})", self.path);
                if let Some(doc) = doc {
                    for line in doc.lines() {
                        let _ = writeln!(out, "  {line}");
                    }
                }
                for (label, value) in metadata {
                    let _ = writeln!(out, "  {label}: {value}");
                }
            }
        }

        let mut number = 0;
        for (title, rows) in [("Methods", &self.methods), ("Attributes", &self.attributes)] {
            if rows.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{title}");
            for row in rows {
                number += 1;
                write_row(&mut out, number, row);
            }
        }
        out
    }
}

fn write_row(out: &mut String, number: usize, row: &Row) {
    match &row.detail {
        Detail::Method(method) => {
            let signature = method.signature.as_deref().unwrap_or("()");
            let kind = method.method_type.as_deref().unwrap_or("method");
            let _ = write!(out, "  [{number}] {}{signature}  {kind}", row.name);
            if method.run.is_some() {
                out.push_str(" (run)");
            }
            out.push('\n');
            if !method.decorators.is_empty() {
                let _ = writeln!(out, "      {}", method.decorators.join(" "));
            }
            if let Some(ret) = &method.return_type {
                let _ = writeln!(out, "      Returns: {ret}");
            }
            if !method.flags.is_empty() {
                let _ = writeln!(out, "      {}", method.flags.join(", "));
            }
            if let Some(first) = method.doc.as_deref().and_then(|d| d.lines().next()) {
                let _ = writeln!(out, "      {first}");
            }
            if let Some(file) = &method.source_file {
                let _ = writeln!(out, "      defined in {file}");
            }
        }
        Detail::Value { value, summary } => {
            let _ = write!(out, "  [{number}] {}  {}", row.name, row.type_name);
            if let Some(value) = value {
                let _ = write!(out, " = {value}");
            }
            out.push('\n');
            if let Some(summary) = summary {
                let _ = writeln!(out, "      {summary}");
            }
        }
        Detail::Error(error) => {
            let _ = writeln!(out, "  [{number}] {}  {error}", row.name);
        }
    }
}

/// Render `node`, the result of inspecting `path`.
pub fn render_tree(node: &InspectionNode, path: &str) -> RenderedTree {
    let obj = match node {
        InspectionNode::Error(error) => {
            return RenderedTree {
                path: path.to_string(),
                header: Header::Error(error.clone()),
                methods: Vec::new(),
                attributes: Vec::new(),
            };
        }
        InspectionNode::Object(obj) => obj,
    };

    let methods = obj
        .methods
        .iter()
        .map(|(name, entry)| method_row(path, obj.category, name, entry))
        .collect();

    let attributes = visible_attributes(path, &obj.attributes)
        .into_iter()
        .map(|(name, entry)| attribute_row(path, obj.category, name, entry))
        .collect();

    RenderedTree {
        path: path.to_string(),
        header: header(obj),
        methods,
        attributes,
    }
}

fn header(obj: &ObjectInfo) -> Header {
    let metadata = obj
        .metadata
        .iter()
        .filter_map(|(key, value)| {
            let value = format_value(value)?;
            Some((key.replace('_', " ").to_uppercase(), value))
        })
        .collect();

    Header::Object {
        type_name: obj.type_name.clone(),
        category: obj.category,
        doc: obj.doc.clone().filter(|d| !d.is_empty()),
        metadata,
    }
}

/// Display text for a metadata value; `None` for null.
fn format_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(format_value)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}

/// Attributes to list. Under the module registry only one module per
/// top-level package is shown: the package itself, else its first submodule.
fn visible_attributes<'a>(
    path: &str,
    attributes: &'a BTreeMap<String, AttributeEntry>,
) -> Vec<(&'a str, &'a AttributeEntry)> {
    if path != MODULE_REGISTRY {
        return attributes
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
            .collect();
    }

    let mut groups: BTreeMap<&str, (&str, &AttributeEntry)> = BTreeMap::new();
    for (name, entry) in attributes {
        let top = name.split('.').next().unwrap_or(name);
        match groups.get(top) {
            Some((chosen, _)) if *chosen == top => {}
            Some(_) if name != top => {}
            _ => {
                groups.insert(top, (name.as_str(), entry));
            }
        }
    }
    groups.into_values().collect()
}

fn method_row(parent: &str, parent_category: Category, name: &str, entry: &MethodEntry) -> Row {
    let path = child_path(parent, parent_category, name);
    match entry {
        MethodEntry::Error(error) => Row {
            name: name.to_string(),
            type_name: "error".to_string(),
            category: Category::Error,
            path,
            detail: Detail::Error(error.clone()),
        },
        MethodEntry::Method(info) => {
            let detail = method_detail(&path, info);
            Row {
                name: name.to_string(),
                type_name: "method".to_string(),
                category: Category::Method,
                path,
                detail: Detail::Method(detail),
            }
        }
    }
}

fn method_detail(path: &str, info: &MethodInfo) -> MethodDetail {
    let mut flags = Vec::new();
    if info.is_async {
        flags.push("async");
    }
    if info.is_generator {
        flags.push("generator");
    }
    if info.is_property {
        flags.push("property");
    }

    MethodDetail {
        method_type: info.method_type.clone(),
        decorators: info.decorators.clone(),
        signature: info.usable_signature().map(str::to_string),
        return_type: info.return_type.clone(),
        flags,
        doc: info.usable_doc().map(str::to_string),
        source: info.source.clone(),
        source_file: info.source_file.clone(),
        run: info
            .is_runnable
            .then(|| call_expression(path, info.usable_signature())),
    }
}

fn attribute_row(
    parent: &str,
    parent_category: Category,
    name: &str,
    entry: &AttributeEntry,
) -> Row {
    let path = child_path(parent, parent_category, name);
    match entry {
        AttributeEntry::Error(error) => Row {
            name: name.to_string(),
            type_name: "error".to_string(),
            category: Category::Error,
            path,
            detail: Detail::Error(error.clone()),
        },
        AttributeEntry::Attribute(info) => Row {
            name: name.to_string(),
            type_name: info.type_name.clone(),
            category: info.category,
            path,
            detail: Detail::Value {
                value: info.value.clone(),
                summary: container_summary(info.category, &info.metadata),
            },
        },
    }
}

fn container_summary(category: Category, metadata: &BTreeMap<String, Value>) -> Option<String> {
    let field = |key: &str| {
        metadata
            .get(key)
            .and_then(format_value)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    };
    match category {
        Category::Sequence => Some(format!(
            "Length: {}, Element Types: {}",
            field("length"),
            field("element_types")
        )),
        Category::Dictionary => Some(format!(
            "Length: {}, Key Types: {}, Value Types: {}",
            field("length"),
            field("key_types"),
            field("value_types")
        )),
        _ => None,
    }
}

/// `path(a, b, ...)` with the parameter names of `signature`.
pub fn call_expression(path: &str, signature: Option<&str>) -> String {
    let params = signature.map(parse_parameters).unwrap_or_default();
    format!("{path}({})", params.join(", "))
}

/// Names of the parameters a caller fills in positionally.
///
/// Variadic parameters and the bare `/` and `*` markers are skipped; type
/// hints and defaults are stripped. Commas nested in brackets or string
/// literals do not split parameters.
pub fn parse_parameters(signature: &str) -> Vec<String> {
    let Some(open) = signature.find('(') else {
        return Vec::new();
    };

    let mut params = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in signature[open + 1..].chars() {
        if let Some(q) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => params.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    params.push(current);

    params
        .iter()
        .filter_map(|param| {
            let name = param.split([':', '=']).next().unwrap_or("").trim();
            if name.is_empty() || name.starts_with('*') || name == "/" {
                None
            } else {
                Some(name.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: Value) -> InspectionNode {
        serde_json::from_value(value).unwrap()
    }

    fn module_entry(name: &str) -> Value {
        json!({"type": "module", "category": "module", "value": format!("<module '{name}'>")})
    }

    #[test]
    fn test_module_registry_grouping() {
        let modules = node(json!({
            "type": "dict",
            "category": "dictionary",
            "attributes": {
                "os": module_entry("os"),
                "os.path": module_entry("os.path"),
                "json": module_entry("json"),
                "json.decoder": module_entry("json.decoder"),
                "xml.dom": module_entry("xml.dom"),
                "xml.sax": module_entry("xml.sax"),
            }
        }));

        let tree = render_tree(&modules, "sys.modules");
        let names: Vec<_> = tree.attributes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["json", "os", "xml.dom"]);
        assert_eq!(tree.attributes[1].path, "sys.modules['os']");
    }

    #[test]
    fn test_grouping_only_applies_to_module_registry() {
        let modules = node(json!({
            "type": "dict",
            "category": "dictionary",
            "attributes": {
                "os": module_entry("os"),
                "os.path": module_entry("os.path"),
            }
        }));
        let tree = render_tree(&modules, "mods");
        assert_eq!(tree.attributes.len(), 2);
    }

    #[test]
    fn test_header_metadata() {
        let tree = render_tree(
            &node(json!({
                "type": "list",
                "category": "sequence",
                "doc": "Built-in mutable sequence.",
                "metadata": {
                    "module": null,
                    "element_types": ["int", "str"],
                    "length": 3
                }
            })),
            "items",
        );
        assert_eq!(
            tree.header,
            Header::Object {
                type_name: "list".to_string(),
                category: Category::Sequence,
                doc: Some("Built-in mutable sequence.".to_string()),
                metadata: vec![
                    ("ELEMENT TYPES".to_string(), "int, str".to_string()),
                    ("LENGTH".to_string(), "3".to_string()),
                ],
            }
        );
    }

    #[test]
    fn test_method_rows() {
        let tree = render_tree(
            &node(json!({
                "type": "Client",
                "category": "class",
                "methods": {
                    "fetch": {
                        "type": "method",
                        "signature": "(self, url: str, *, timeout: float = 5.0, **kwargs)",
                        "doc": "No documentation available",
                        "return_type": "bytes",
                        "decorators": ["@retry"],
                        "is_async": true,
                        "is_runnable": true,
                        "method_type": "instance"
                    },
                    "broken": {"type": "error", "error_type": "AttributeError", "error": "gone"}
                }
            })),
            "client",
        );

        assert_eq!(tree.methods.len(), 2);
        let broken = &tree.methods[0];
        assert_eq!(broken.path, "client.broken");
        assert!(matches!(broken.detail, Detail::Error(_)));

        let fetch = &tree.methods[1];
        let Detail::Method(detail) = &fetch.detail else {
            panic!("expected a method row");
        };
        assert_eq!(detail.doc, None);
        assert_eq!(detail.flags, ["async"]);
        assert_eq!(detail.run.as_deref(), Some("client.fetch(self, url, timeout)"));
    }

    #[test]
    fn test_unrunnable_method_has_no_run_expression() {
        let tree = render_tree(
            &node(json!({
                "type": "module",
                "category": "module",
                "methods": {
                    "helper": {"type": "method", "signature": "Signature unavailable"}
                }
            })),
            "pkg",
        );
        let Detail::Method(detail) = &tree.methods[0].detail else {
            panic!("expected a method row");
        };
        assert_eq!(detail.run, None);
        assert_eq!(detail.signature, None);
    }

    #[test]
    fn test_container_summaries() {
        let tree = render_tree(
            &node(json!({
                "type": "Settings",
                "category": "class",
                "attributes": {
                    "hosts": {
                        "type": "list", "category": "sequence", "value": "['a', 'b']",
                        "metadata": {"length": 2, "element_types": ["str"]}
                    },
                    "limits": {
                        "type": "dict", "category": "dictionary", "value": "{}",
                        "metadata": {"length": 0, "key_types": [], "value_types": []}
                    },
                    "secret": {"type": "error", "error_type": "PermissionError", "error": "denied"}
                }
            })),
            "settings",
        );

        assert_eq!(
            tree.attributes[0].detail,
            Detail::Value {
                value: Some("['a', 'b']".to_string()),
                summary: Some("Length: 2, Element Types: str".to_string()),
            }
        );
        assert_eq!(
            tree.attributes[1].detail,
            Detail::Value {
                value: Some("{}".to_string()),
                summary: Some(
                    "Length: 0, Key Types: unknown, Value Types: unknown".to_string()
                ),
            }
        );
        let text = tree.to_text();
        assert!(text.contains("[3] secret  PermissionError: denied"));
    }

    #[test]
    fn test_error_root() {
        let tree = render_tree(
            &node(json!({"type": "error", "error_type": "NameError", "error": "name 'x' is not defined"})),
            "x",
        );
        assert!(tree.rows().next().is_none());
        assert_eq!(tree.to_text(), "x: NameError: name 'x' is not defined\n");
    }

    #[test]
    fn test_row_numbering_spans_sections() {
        let tree = render_tree(
            &node(json!({
                "type": "Point",
                "category": "class",
                "methods": {"norm": {"type": "method", "signature": "(self)"}},
                "attributes": {"x": {"type": "int", "category": "number", "value": "1"}}
            })),
            "p",
        );
        assert_eq!(tree.row(1).map(|r| r.name.as_str()), Some("norm"));
        assert_eq!(tree.row(2).map(|r| r.path.as_str()), Some("p.x"));
        assert_eq!(tree.row(0), None);
        assert_eq!(tree.row(3), None);

        let text = tree.to_text();
        assert!(text.starts_with("p : Point (class)\n"));
        assert!(text.contains("  [1] norm(self)  method\n"));
        assert!(text.contains("  [2] x  int = 1\n"));
    }

    #[test]
    fn test_parse_parameters() {
        assert_eq!(parse_parameters("(a, b=1, *args, **kwargs)"), ["a", "b"]);
        assert_eq!(parse_parameters("(x, /, y, *, z)"), ["x", "y", "z"]);
        assert_eq!(
            parse_parameters("(m: Dict[str, int] = {}, s: str = 'a,b)')"),
            ["m", "s"]
        );
        assert_eq!(parse_parameters("(cb: Callable[[int], None]) -> int"), ["cb"]);
        assert!(parse_parameters("()").is_empty());
        assert!(parse_parameters("no parens").is_empty());
    }

    #[test]
    fn test_call_expression() {
        assert_eq!(call_expression("obj.run", None), "obj.run()");
        assert_eq!(call_expression("f", Some("(a, b: int = 2)")), "f(a, b)");
    }
}
