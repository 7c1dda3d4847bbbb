//! Entity knowledge base
//!
//! A read-only tree describing the restricted global APIs an extension can
//! reach. Tables are declared in [`globals`] and [`interfaces`], wired in a
//! second phase that resolves cross references, and frozen into one
//! process-wide [`KnowledgeBase`].
//!
//! Paths that are not described resolve to nothing, which the traverser
//! treats as an unrestricted object.

mod globals;
mod interfaces;

use std::fmt;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use super::dispatch::{Arguments, Environment, HookCall, HookError};
use super::traverser::Traverser;
use super::value::{Context, Literal, Wrapped};

pub use globals::BANNED_IDENTIFIERS;

/// Alias chains longer than this are treated as cyclic.
const MAX_ALIAS_HOPS: usize = 16;

pub type ReturnHook = Arc<dyn Fn(&mut HookCall<'_, '_>) -> Result<Wrapped, HookError> + Send + Sync>;
pub type DangerPredicate = Arc<dyn Fn(&Arguments<'_>, &Environment<'_>) -> Verdict + Send + Sync>;
pub type ReadonlyPredicate = Arc<dyn Fn(&mut Traverser<'_>) -> bool + Send + Sync>;

/// Outcome of a dangerous-usage predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Violation,
    Message(String),
}

impl Verdict {
    pub fn when(condition: bool) -> Self {
        if condition {
            Verdict::Violation
        } else {
            Verdict::Safe
        }
    }

    /// A violation carrying `message`. An empty message means no violation.
    pub fn message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.is_empty() {
            Verdict::Safe
        } else {
            Verdict::Message(message)
        }
    }

    pub fn is_violation(&self) -> bool {
        !matches!(self, Verdict::Safe)
    }
}

#[derive(Clone)]
pub enum Danger {
    /// Any access is reported.
    Always,
    /// Any access is reported with this message.
    Message(&'static str),
    /// Calls are checked against their arguments.
    Predicate(DangerPredicate),
}

#[derive(Clone)]
pub enum Readonly {
    Flag(bool),
    Predicate(ReadonlyPredicate),
}

/// Where an XPCOM interface descriptor comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XpcomMap {
    Interface(&'static str),
    Global(&'static [&'static str]),
}

#[derive(Clone, Default)]
pub enum EntityValue {
    #[default]
    None,
    Members(IndexMap<String, Arc<Entity>>),
    /// Resolves to another path of the global table. The empty path is the
    /// global object itself.
    Alias(&'static [&'static str]),
    Constant(Literal),
    /// A service built fresh from an interface on every access.
    Service {
        method: &'static str,
        interface: &'static str,
    },
}

#[derive(Clone, Default)]
pub struct Entity {
    pub value: EntityValue,
    pub call: Option<ReturnHook>,
    pub dangerous: Option<Danger>,
    pub readonly: Option<Readonly>,
    pub overwritable: bool,
    pub context: Option<Context>,
    pub xpcom_map: Option<XpcomMap>,
    pub xpcom_wildcard: bool,
    wildcard_child: Option<Arc<Entity>>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match &self.value {
            EntityValue::None => "none".to_string(),
            EntityValue::Members(members) => {
                format!("members({})", members.keys().cloned().collect::<Vec<_>>().join(", "))
            }
            EntityValue::Alias(path) => format!("alias({})", path.join(".")),
            EntityValue::Constant(literal) => format!("constant({literal})"),
            EntityValue::Service { method, interface } => format!("{method}({interface})"),
        };
        f.debug_struct("Entity")
            .field("value", &value)
            .field("callable", &self.call.is_some())
            .field("dangerous", &self.dangerous.is_some())
            .field("overwritable", &self.overwritable)
            .field("xpcom_map", &self.xpcom_map)
            .field("xpcom_wildcard", &self.xpcom_wildcard)
            .finish()
    }
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member(mut self, name: &str, entity: Entity) -> Self {
        self.members_mut().insert(name.to_string(), Arc::new(entity));
        self
    }

    pub fn alias(mut self, path: &'static [&'static str]) -> Self {
        self.value = EntityValue::Alias(path);
        self
    }

    pub fn constant(mut self, literal: Literal) -> Self {
        self.value = EntityValue::Constant(literal);
        self
    }

    pub fn service(mut self, method: &'static str, interface: &'static str) -> Self {
        self.value = EntityValue::Service { method, interface };
        self
    }

    pub fn returns(
        mut self,
        hook: impl Fn(&mut HookCall<'_, '_>) -> Result<Wrapped, HookError> + Send + Sync + 'static,
    ) -> Self {
        self.call = Some(Arc::new(hook));
        self
    }

    pub fn returns_hook(mut self, hook: ReturnHook) -> Self {
        self.call = Some(hook);
        self
    }

    pub fn dangerous(mut self) -> Self {
        self.dangerous = Some(Danger::Always);
        self
    }

    pub fn dangerous_message(mut self, message: &'static str) -> Self {
        self.dangerous = Some(Danger::Message(message));
        self
    }

    pub fn dangerous_when(
        mut self,
        predicate: impl Fn(&Arguments<'_>, &Environment<'_>) -> Verdict + Send + Sync + 'static,
    ) -> Self {
        self.dangerous = Some(Danger::Predicate(Arc::new(predicate)));
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = Some(Readonly::Flag(readonly));
        self
    }

    pub fn readonly_when(
        mut self,
        predicate: impl Fn(&mut Traverser<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.readonly = Some(Readonly::Predicate(Arc::new(predicate)));
        self
    }

    pub fn overwritable(mut self) -> Self {
        self.overwritable = true;
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn xpcom_interface(mut self, interface: &'static str) -> Self {
        self.xpcom_map = Some(XpcomMap::Interface(interface));
        self
    }

    pub fn xpcom_global(mut self, path: &'static [&'static str]) -> Self {
        self.xpcom_map = Some(XpcomMap::Global(path));
        self
    }

    pub fn xpcom_wildcard(mut self) -> Self {
        self.xpcom_wildcard = true;
        self
    }

    /// Member map, turning a value-less entity into one with members.
    pub fn members_mut(&mut self) -> &mut IndexMap<String, Arc<Entity>> {
        if !matches!(self.value, EntityValue::Members(_)) {
            self.value = EntityValue::Members(IndexMap::new());
        }
        match &mut self.value {
            EntityValue::Members(members) => members,
            _ => unreachable!("value was just set to members"),
        }
    }

    pub fn members(&self) -> Option<&IndexMap<String, Arc<Entity>>> {
        match &self.value {
            EntityValue::Members(members) => Some(members),
            _ => None,
        }
    }

    /// Clone with no node shared with `self`.
    pub fn deep_clone(&self) -> Entity {
        let mut cloned = self.clone();
        if let EntityValue::Members(members) = &self.value {
            cloned.value = EntityValue::Members(
                members
                    .iter()
                    .map(|(name, member)| (name.clone(), Arc::new(member.deep_clone())))
                    .collect(),
            );
        }
        cloned.wildcard_child = self
            .wildcard_child
            .as_ref()
            .map(|child| Arc::new(child.deep_clone()));
        cloned
    }
}

pub struct KnowledgeBase {
    root: Arc<Entity>,
    interfaces: IndexMap<&'static str, Arc<Entity>>,
    universal: IndexMap<&'static str, Arc<Entity>>,
}

static KNOWLEDGE_BASE: OnceLock<KnowledgeBase> = OnceLock::new();

impl KnowledgeBase {
    /// The frozen process-wide instance.
    pub fn global() -> &'static KnowledgeBase {
        KNOWLEDGE_BASE.get_or_init(|| Skeleton::declare().wire())
    }

    pub fn root(&self) -> &Arc<Entity> {
        &self.root
    }

    pub fn is_root(&self, entity: &Arc<Entity>) -> bool {
        Arc::ptr_eq(&self.root, entity)
    }

    pub fn lookup_global(&self, name: &str) -> Option<Arc<Entity>> {
        self.member(&self.root, name)
    }

    /// Member `name` of `entity`: exact match first, then the XPCOM wildcard.
    pub fn member(&self, entity: &Entity, name: &str) -> Option<Arc<Entity>> {
        self.member_hops(entity, name, 0)
    }

    fn member_hops(&self, entity: &Entity, name: &str, hops: usize) -> Option<Arc<Entity>> {
        if hops > MAX_ALIAS_HOPS {
            tracing::debug!(member = name, "alias chain too long, treating as unrestricted");
            return None;
        }
        match &entity.value {
            EntityValue::Members(members) => members
                .get(name)
                .cloned()
                .or_else(|| entity.wildcard_child.clone()),
            EntityValue::Alias(path) => {
                let target = self.resolve_hops(path, hops + 1)?;
                self.member_hops(&target, name, hops + 1)
            }
            _ => entity.wildcard_child.clone(),
        }
    }

    /// Resolves a dotted path from the global object, following aliases.
    pub fn resolve(&self, path: &[&str]) -> Option<Arc<Entity>> {
        self.resolve_hops(path, 0)
    }

    fn resolve_hops(&self, path: &[&str], hops: usize) -> Option<Arc<Entity>> {
        let mut node = self.root.clone();
        for segment in path {
            node = self.member_hops(&node, segment, hops)?;
        }
        Some(node)
    }

    /// A fresh, independently owned copy of an XPCOM interface descriptor.
    pub fn instantiate(&self, map: &XpcomMap) -> Option<Entity> {
        let source = match map {
            XpcomMap::Interface(name) => self.interfaces.get(name).cloned(),
            XpcomMap::Global(path) => self.resolve(path),
        }?;
        Some(source.deep_clone())
    }

    pub fn interface(&self, name: &str) -> Option<Arc<Entity>> {
        self.interfaces.get(name).cloned()
    }

    /// Members available on every object, such as `QueryInterface`.
    pub fn universal(&self, name: &str) -> Option<Arc<Entity>> {
        self.universal.get(name).cloned()
    }

    pub fn banned_identifier(&self, name: &str) -> Option<&'static str> {
        BANNED_IDENTIFIERS
            .iter()
            .find(|(banned, _)| *banned == name)
            .map(|(_, message)| *message)
    }
}

/// Unwired tables. Cross references are plain paths until [`Skeleton::wire`]
/// checks them.
struct Skeleton {
    root: Entity,
    interfaces: IndexMap<&'static str, Entity>,
    universal: IndexMap<&'static str, Entity>,
}

impl Skeleton {
    fn declare() -> Self {
        let mut root = Entity::new();
        for (name, entity) in globals::table() {
            root.members_mut().insert(name.to_string(), Arc::new(entity));
        }
        Self {
            root,
            interfaces: interfaces::table(),
            universal: globals::universal(),
        }
    }

    fn wire(self) -> KnowledgeBase {
        let unresolved = self.unresolved_references();
        for reference in &unresolved {
            tracing::warn!(reference = %reference, "knowledge base reference does not resolve");
        }

        let interfaces = self
            .interfaces
            .into_iter()
            .map(|(name, entity)| (name, Arc::new(finish(entity, &unresolved))))
            .collect();
        let universal = self
            .universal
            .into_iter()
            .map(|(name, entity)| (name, Arc::new(finish(entity, &unresolved))))
            .collect();

        KnowledgeBase {
            root: Arc::new(finish(self.root, &unresolved)),
            interfaces,
            universal,
        }
    }

    fn unresolved_references(&self) -> Vec<String> {
        let probe = KnowledgeBase {
            root: Arc::new(self.root.clone()),
            interfaces: self
                .interfaces
                .iter()
                .map(|(name, entity)| (*name, Arc::new(entity.clone())))
                .collect(),
            universal: IndexMap::new(),
        };

        let mut unresolved = Vec::new();
        let mut visit = |entity: &Entity| {
            if let EntityValue::Alias(path) = &entity.value {
                if probe.resolve(path).is_none() {
                    unresolved.push(path.join("."));
                }
            }
            if let Some(map) = &entity.xpcom_map {
                if probe.instantiate(map).is_none() {
                    unresolved.push(map_key(map));
                }
            }
            if let EntityValue::Service { interface, .. } = &entity.value {
                if !probe.interfaces.contains_key(interface) {
                    unresolved.push(format!("interface {interface}"));
                }
            }
        };

        walk(&self.root, &mut visit);
        for entity in self.interfaces.values().chain(self.universal.values()) {
            walk(entity, &mut visit);
        }
        unresolved
    }
}

fn walk(entity: &Entity, visit: &mut impl FnMut(&Entity)) {
    visit(entity);
    if let Some(members) = entity.members() {
        for member in members.values() {
            walk(member, visit);
        }
    }
}

fn map_key(map: &XpcomMap) -> String {
    match map {
        XpcomMap::Interface(name) => format!("interface {name}"),
        XpcomMap::Global(path) => path.join("."),
    }
}

/// Builds wildcard children and drops references that do not resolve.
fn finish(mut entity: Entity, unresolved: &[String]) -> Entity {
    if let EntityValue::Alias(path) = &entity.value {
        if unresolved.contains(&path.join(".")) {
            entity.value = EntityValue::None;
        }
    }
    if let Some(map) = &entity.xpcom_map {
        if unresolved.contains(&map_key(map)) {
            entity.xpcom_map = None;
        }
    }

    if let EntityValue::Members(members) = &mut entity.value {
        let wired = members
            .drain(..)
            .map(|(name, member)| {
                let member = Arc::try_unwrap(member).unwrap_or_else(|shared| (*shared).clone());
                (name, Arc::new(finish(member, unresolved)))
            })
            .collect();
        *members = wired;
    }

    if entity.xpcom_wildcard {
        let mut child = entity.clone();
        child.xpcom_wildcard = false;
        child.wildcard_child = None;
        entity.wildcard_child = Some(Arc::new(child));
    }
    entity
}
