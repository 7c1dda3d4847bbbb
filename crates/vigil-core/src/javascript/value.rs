//! Value model for the symbolic interpreter
//!
//! Every traversed expression produces a [`Wrapped`] value. Objects, arrays
//! and XPCOM instances live in a per-file [`Heap`] and are referenced by id,
//! so two bindings holding the same id observe each other's writes.

use std::fmt;
use std::sync::Arc;

use id_arena::{Arena, Id};
use indexmap::IndexMap;

use super::entities::Entity;

pub type ObjectId = Id<JsObject>;
pub type ArrayId = Id<JsArray>;
pub type InstanceId = Id<Instance>;

/// Longest string the interpreter models. Longer results are unknown.
pub const MAX_STRING_LEN: usize = 1 << 20;

const MAX_COERCION_DEPTH: usize = 8;
const MAX_COERCION_STEPS: usize = 10_000;

/// Scalar value with JavaScript coercion rules.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Literal {
    pub fn truthy(&self) -> bool {
        match self {
            Literal::Undefined | Literal::Null => false,
            Literal::Bool(b) => *b,
            Literal::Number(n) => *n != 0.0 && !n.is_nan(),
            Literal::String(s) => !s.is_empty(),
        }
    }

    /// `ToNumber`. Unparseable strings become NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Literal::Undefined => f64::NAN,
            Literal::Null => 0.0,
            Literal::Bool(b) => f64::from(u8::from(*b)),
            Literal::Number(n) => *n,
            Literal::String(s) => string_to_number(s),
        }
    }

    /// `ToString`.
    pub fn to_js_string(&self) -> String {
        match self {
            Literal::Undefined => "undefined".to_string(),
            Literal::Null => "null".to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Number(n) => number_to_string(*n),
            Literal::String(s) => s.clone(),
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Literal::Undefined => "undefined",
            Literal::Null => "object",
            Literal::Bool(_) => "boolean",
            Literal::Number(_) => "number",
            Literal::String(_) => "string",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|v| v as f64)
                .unwrap_or(f64::NAN);
        }
    }

    let (sign, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (-1.0, &trimmed[1..]),
        b'+' => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };

    if unsigned == "Infinity" {
        return sign * f64::INFINITY;
    }

    let numeric = !unsigned.is_empty()
        && unsigned
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if numeric {
        return unsigned.parse::<f64>().map(|v| sign * v).unwrap_or(f64::NAN);
    }

    f64::NAN
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        exponent_form(n)
    } else {
        n.to_string()
    }
}

/// `1e+21`, `-1.5e-7`: shortest mantissa with an explicitly signed exponent.
fn exponent_form(n: f64) -> String {
    let formatted = format!("{n:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => formatted,
    }
}

/// Security context a value was reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Context {
    #[default]
    Chrome,
    Content,
}

/// A value backed by the knowledge base.
#[derive(Clone)]
pub struct GlobalRef {
    /// Dotted access path, used in messages.
    pub name: String,
    pub target: GlobalTarget,
}

#[derive(Clone)]
pub enum GlobalTarget {
    /// A shared node of the frozen knowledge base.
    Entity(Arc<Entity>),
    /// An XPCOM instance owned by the heap.
    Instance(InstanceId),
}

impl fmt::Debug for GlobalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match &self.target {
            GlobalTarget::Entity(_) => "entity".to_string(),
            GlobalTarget::Instance(id) => format!("instance#{}", id.index()),
        };
        f.debug_struct("GlobalRef")
            .field("name", &self.name)
            .field("target", &target)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum ValueKind {
    Literal(Literal),
    Object(ObjectId),
    Array(ArrayId),
    Function,
    Global(GlobalRef),
    Unknown,
}

#[derive(Debug, Clone)]
pub struct Wrapped {
    pub kind: ValueKind,
    pub context: Context,
    pub readonly: bool,
    pub overwritable: bool,
}

impl Wrapped {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            context: Context::Chrome,
            readonly: false,
            overwritable: false,
        }
    }

    pub fn unknown() -> Self {
        Self::new(ValueKind::Unknown)
    }

    pub fn function() -> Self {
        Self::new(ValueKind::Function)
    }

    pub fn literal(literal: Literal) -> Self {
        Self::new(ValueKind::Literal(literal))
    }

    pub fn undefined() -> Self {
        Self::literal(Literal::Undefined)
    }

    pub fn number(n: f64) -> Self {
        Self::literal(Literal::Number(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::literal(Literal::String(s.into()))
    }

    pub fn boolean(b: bool) -> Self {
        Self::literal(Literal::Bool(b))
    }

    pub fn global(name: impl Into<String>, target: GlobalTarget) -> Self {
        Self::new(ValueKind::Global(GlobalRef {
            name: name.into(),
            target,
        }))
    }

    pub fn is_global(&self) -> bool {
        matches!(self.kind, ValueKind::Global(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.kind, ValueKind::Unknown)
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ValueKind::Literal(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        self.as_literal().map(Literal::to_number)
    }

    /// Best-effort scalar coercion. Values that cannot be modeled coerce as
    /// `undefined`, and so do arrays whose joined form would exceed
    /// [`MAX_STRING_LEN`] or take too many steps to build.
    pub fn literal_value(&self, heap: &Heap) -> Literal {
        self.bounded_literal_value(heap).unwrap_or(Literal::Undefined)
    }

    /// Like [`Wrapped::literal_value`], but `None` when an array is too
    /// large to join.
    pub fn bounded_literal_value(&self, heap: &Heap) -> Option<Literal> {
        Join {
            heap,
            visiting: Vec::new(),
            steps: 0,
        }
        .coerce(self)
    }

    /// Truthiness as used by predicates. Unknown values are falsy.
    pub fn truthy(&self) -> bool {
        match &self.kind {
            ValueKind::Literal(l) => l.truthy(),
            ValueKind::Object(_) | ValueKind::Array(_) | ValueKind::Function | ValueKind::Global(_) => true,
            ValueKind::Unknown => false,
        }
    }

    /// Truthiness when it can be decided statically.
    pub fn known_truthiness(&self) -> Option<bool> {
        match &self.kind {
            ValueKind::Unknown => None,
            _ => Some(self.truthy()),
        }
    }

    pub fn type_of(&self) -> Option<&'static str> {
        match &self.kind {
            ValueKind::Literal(l) => Some(l.type_of()),
            ValueKind::Object(_) | ValueKind::Array(_) => Some("object"),
            ValueKind::Function => Some("function"),
            ValueKind::Global(_) | ValueKind::Unknown => None,
        }
    }
}

/// `Array.prototype.join` over nested heap arrays. An array that is already
/// being joined contributes "", as in JS.
struct Join<'h> {
    heap: &'h Heap,
    visiting: Vec<ArrayId>,
    steps: usize,
}

impl Join<'_> {
    fn coerce(&mut self, value: &Wrapped) -> Option<Literal> {
        self.steps += 1;
        if self.steps > MAX_COERCION_STEPS {
            return None;
        }

        let id = match &value.kind {
            ValueKind::Literal(l) => return Some(l.clone()),
            ValueKind::Object(_) => return Some(Literal::String("[object Object]".to_string())),
            ValueKind::Array(id) => *id,
            ValueKind::Function | ValueKind::Global(_) | ValueKind::Unknown => {
                return Some(Literal::Undefined);
            }
        };
        if self.visiting.contains(&id) || self.visiting.len() >= MAX_COERCION_DEPTH {
            return Some(Literal::String(String::new()));
        }

        self.visiting.push(id);
        let joined = self.join(id);
        self.visiting.pop();
        joined.map(Literal::String)
    }

    fn join(&mut self, id: ArrayId) -> Option<String> {
        let heap = self.heap;
        let mut joined = String::new();
        for (index, element) in heap.array(id).elements.iter().enumerate() {
            if index > 0 {
                joined.push(',');
            }
            match self.coerce(element)? {
                Literal::Undefined | Literal::Null => {}
                other => joined.push_str(&other.to_js_string()),
            }
            if joined.len() > MAX_STRING_LEN {
                return None;
            }
        }
        Some(joined)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsObject {
    pub members: IndexMap<String, Wrapped>,
}

#[derive(Debug, Clone, Default)]
pub struct JsArray {
    pub elements: Vec<Wrapped>,
}

/// An XPCOM object built from an interface descriptor. The entity is an
/// independently owned clone; writes land in `assigned`.
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub entity: Entity,
    pub assigned: IndexMap<String, Wrapped>,
}

#[derive(Default)]
pub struct Heap {
    objects: Arena<JsObject>,
    arrays: Arena<JsArray>,
    instances: Arena<Instance>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_object(&mut self, object: JsObject) -> Wrapped {
        Wrapped::new(ValueKind::Object(self.objects.alloc(object)))
    }

    pub fn alloc_array(&mut self, elements: Vec<Wrapped>) -> Wrapped {
        Wrapped::new(ValueKind::Array(self.arrays.alloc(JsArray { elements })))
    }

    pub fn alloc_instance(&mut self, instance: Instance) -> InstanceId {
        self.instances.alloc(instance)
    }

    pub fn object(&self, id: ObjectId) -> &JsObject {
        &self.objects[id]
    }

    pub fn object_mut(&mut self, id: ObjectId) -> &mut JsObject {
        &mut self.objects[id]
    }

    pub fn array(&self, id: ArrayId) -> &JsArray {
        &self.arrays[id]
    }

    pub fn array_mut(&mut self, id: ArrayId) -> &mut JsArray {
        &mut self.arrays[id]
    }

    pub fn instance(&self, id: InstanceId) -> &Instance {
        &self.instances[id]
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> &mut Instance {
        &mut self.instances[id]
    }
}
