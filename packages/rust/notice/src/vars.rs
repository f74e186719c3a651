//! Key/value data attached to a notice (parameters, session, CGI, user).
//!
//! [`Vars`] is an ordered string-keyed map. Values are scalars, nested owned
//! maps, or [`SharedVars`] objects. Shared objects are reference-counted and
//! may form cycles; [`xml_vars_for`] tracks them by identity in a
//! [`VarsScope`] so rendering always terminates.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use errbit_xml::{XmlBuilder, XmlValue};

/// Text emitted in place of an object that was already rendered.
pub const RECURSION_MARKER: &str = "*** RECURSION ***";

/// Replacement value for redacted keys.
pub const FILTERED_MARKER: &str = "[FILTERED]";

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A single value in a [`Vars`] map.
#[derive(Debug, Clone, PartialEq)]
pub enum Var {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Nested map owned by its parent.
    Map(Vars),
    /// Shared, possibly self-referential object.
    Object(SharedVars),
}

impl Var {
    /// Scalar string form, `None` for maps and objects.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => Some(String::new()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(n) => Some(n.to_string()),
            Self::Float(n) => Some(n.to_string()),
            Self::Str(s) => Some(s.clone()),
            Self::Map(_) | Self::Object(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Str(s) => s.is_empty(),
            Self::Map(vars) => vars.is_empty(),
            Self::Object(obj) => obj.is_empty(),
            _ => false,
        }
    }

    fn to_xml_value(&self) -> XmlValue {
        match self {
            Self::Null => XmlValue::Null,
            Self::Bool(b) => XmlValue::Bool(*b),
            Self::Int(n) => XmlValue::from(*n),
            Self::Float(n) => XmlValue::from(*n),
            Self::Str(s) => XmlValue::Text(s.clone()),
            Self::Map(_) | Self::Object(_) => XmlValue::Array,
        }
    }
}

impl From<&str> for Var {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Var {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for Var {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Var {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Var {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

impl From<u16> for Var {
    fn from(n: u16) -> Self {
        Self::Int(n.into())
    }
}

impl From<f64> for Var {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<Vars> for Var {
    fn from(vars: Vars) -> Self {
        Self::Map(vars)
    }
}

impl From<SharedVars> for Var {
    fn from(obj: SharedVars) -> Self {
        Self::Object(obj)
    }
}

impl From<serde_json::Value> for Var {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if n.is_f64() {
                    Self::Float(n.as_f64().unwrap_or_default())
                } else {
                    Self::Str(n.to_string())
                }
            }
            Value::String(s) => Self::Str(s),
            Value::Array(_) | Value::Object(_) => Self::Map(Vars::from_json(value)),
        }
    }
}

// ---------------------------------------------------------------------------
// Maps
// ---------------------------------------------------------------------------

/// Ordered string-keyed map. Inserting an existing key replaces its value in
/// place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vars {
    entries: Vec<(String, Var)>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert arbitrary JSON. Arrays are keyed by index; a bare scalar
    /// becomes a single entry under `"0"`.
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::new(),
            Value::Object(map) => map.into_iter().collect(),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| (idx.to_string(), item))
                .collect(),
            scalar => std::iter::once(("0".to_string(), scalar)).collect(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Var>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Var>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Var> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Non-empty scalar text for `key`.
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(Var::as_text)
            .filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Var)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Replace the value of every top-level key matching `is_filtered` with
    /// [`FILTERED_MARKER`].
    pub fn redact(&mut self, is_filtered: impl Fn(&str) -> bool) {
        for (key, value) in &mut self.entries {
            if is_filtered(key) {
                *value = Var::Str(FILTERED_MARKER.to_string());
            }
        }
    }
}

impl<K: Into<String>, V: Into<Var>> FromIterator<(K, V)> for Vars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = Self::new();
        for (key, value) in iter {
            vars.insert(key, value);
        }
        vars
    }
}

// ---------------------------------------------------------------------------
// Shared objects
// ---------------------------------------------------------------------------

/// A reference-typed map. Clones share the same underlying entries, so an
/// object can contain itself.
#[derive(Clone, Default)]
pub struct SharedVars(Arc<RwLock<Vars>>);

impl SharedVars {
    pub fn new(vars: Vars) -> Self {
        Self(Arc::new(RwLock::new(vars)))
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Var>) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    /// Point-in-time copy of the entries.
    pub fn snapshot(&self) -> Vars {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Identity of the underlying allocation.
    fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for SharedVars {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// Entries are not printed: the graph may be cyclic.
impl fmt::Debug for SharedVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedVars({:#x})", self.id())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Objects already rendered during one document build.
#[derive(Debug, Default)]
pub struct VarsScope {
    seen: HashSet<usize>,
}

impl VarsScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `obj`; returns `false` if it was already seen in this scope.
    fn enter(&mut self, obj: &SharedVars) -> bool {
        self.seen.insert(obj.id())
    }
}

/// Render `vars` as nested `<var key="…">` elements under `builder`.
///
/// Scalars become leaves. Maps recurse. Objects recurse the first time they
/// are seen in `scope` and render as [`RECURSION_MARKER`] afterwards.
pub fn xml_vars_for(builder: &mut XmlBuilder<'_>, vars: &Vars, scope: &mut VarsScope) {
    for (key, value) in vars.iter() {
        match value {
            Var::Map(nested) => {
                builder.tag_with("var", "", [("key", key)], |var| {
                    xml_vars_for(var, nested, scope);
                });
            }
            Var::Object(obj) => {
                if scope.enter(obj) {
                    let nested = obj.snapshot();
                    builder.tag_with("var", "", [("key", key)], |var| {
                        xml_vars_for(var, &nested, scope);
                    });
                } else {
                    builder.tag("var", RECURSION_MARKER).attribute("key", key);
                }
            }
            scalar => {
                builder.tag("var", scalar.to_xml_value()).attribute("key", key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use errbit_xml::{NO_ATTRIBUTES, XmlDocument};
    use serde_json::json;

    use super::*;

    fn render(vars: &Vars) -> String {
        let mut doc = XmlDocument::new();
        let mut scope = VarsScope::new();
        doc.builder()
            .tag_with("params", "", NO_ATTRIBUTES, |params| {
                xml_vars_for(params, vars, &mut scope);
            })
            .as_xml()
    }

    #[test]
    fn insert_replaces_in_place() {
        let vars = Vars::new().with("a", 1).with("b", 2).with("a", "x");
        let keys: Vec<_> = vars.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(vars.get("a"), Some(&Var::from("x")));
    }

    #[test]
    fn from_json_preserves_shape() {
        let vars = Vars::from_json(json!({
            "name": "tester",
            "age": 42,
            "ratio": 0.5,
            "admin": false,
            "tags": ["a", "b"],
            "nothing": null,
        }));
        assert_eq!(vars.len(), 6);
        assert_eq!(vars.text("age").as_deref(), Some("42"));
        assert_eq!(vars.text("nothing"), None);
        let Some(Var::Map(tags)) = vars.get("tags") else {
            panic!("tags should be a map");
        };
        assert_eq!(tags.text("1").as_deref(), Some("b"));

        assert_eq!(Vars::from_json(json!("solo")).text("0").as_deref(), Some("solo"));
        assert!(Vars::from_json(json!(null)).is_empty());
    }

    #[test]
    fn redact_only_touches_top_level_matches() {
        let mut vars = Vars::new()
            .with("password", "hunter2")
            .with("nested", Vars::new().with("password", "inner"));
        vars.redact(|key| key == "password");
        assert_eq!(vars.text("password").as_deref(), Some(FILTERED_MARKER));
        let Some(Var::Map(nested)) = vars.get("nested") else {
            panic!("nested should be a map");
        };
        assert_eq!(nested.text("password").as_deref(), Some("inner"));
    }

    #[test]
    fn renders_scalars_and_nested_maps() {
        let vars = Vars::new()
            .with("id", 7)
            .with("flag", true)
            .with("empty", Var::Null)
            .with("user", Vars::new().with("name", "ann"));
        assert_eq!(
            render(&vars),
            "<params><var key=\"id\">7</var><var key=\"flag\">true</var>\
             <var key=\"empty\"/>\
             <var key=\"user\"><var key=\"name\">ann</var></var></params>"
        );
    }

    #[test]
    fn self_reference_renders_marker() {
        let session = SharedVars::new(Vars::new().with("user", "ann"));
        session.insert("me", session.clone());

        let xml = render(&Vars::new().with("session", session));
        assert_eq!(
            xml,
            "<params><var key=\"session\"><var key=\"user\">ann</var>\
             <var key=\"me\">*** RECURSION ***</var></var></params>"
        );
    }

    #[test]
    fn mutual_cycle_terminates() {
        let a = SharedVars::new(Vars::new().with("name", "a"));
        let b = SharedVars::new(Vars::new().with("name", "b"));
        a.insert("peer", b.clone());
        b.insert("peer", a.clone());

        let xml = render(&Vars::new().with("root", a));
        assert_eq!(xml.matches(RECURSION_MARKER).count(), 1);
        assert!(xml.contains("<var key=\"name\">b</var>"));
    }

    #[test]
    fn scope_is_per_render() {
        let shared = SharedVars::new(Vars::new().with("k", "v"));
        let vars = Vars::new().with("obj", shared);
        assert_eq!(render(&vars), render(&vars));
        assert!(!render(&vars).contains(RECURSION_MARKER));
    }

    #[test]
    fn shared_vars_compare_by_identity() {
        let a = SharedVars::new(Vars::new().with("k", "v"));
        let b = SharedVars::new(Vars::new().with("k", "v"));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
