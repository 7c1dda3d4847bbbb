//! Return hooks for callable knowledge base entries
//!
//! Hooks receive arguments that were already evaluated by the dispatcher and
//! always produce a value. Compatibility notices are emitted as a side effect
//! of the call.

use std::sync::Arc;

use super::dispatch::{HookCall, HookError};
use super::entities::{Entity, ReturnHook};
use super::value::{GlobalRef, GlobalTarget, Instance, InstanceId, JsObject, ValueKind, Wrapped};
use crate::diagnostic::{Compatibility, CompatibilityType, RuleId, Severity};

pub const COMPAT_MODULE: &str = "compat";
pub const COMPAT_TIER: u32 = 5;

/// A version-scoped compatibility notice raised by calling an API.
#[derive(Debug)]
pub struct CompatNotice {
    pub check: &'static str,
    pub message: &'static str,
    pub description: &'static str,
    pub compatibility_type: CompatibilityType,
    /// `(application guid, min version, max version)`
    pub apps: &'static [(&'static str, &'static str, &'static str)],
    /// Whether the call yields an object rather than an unknown value.
    pub returns_object: bool,
}

impl CompatNotice {
    pub fn rule_id(&self) -> RuleId {
        RuleId::new(COMPAT_MODULE, self.check)
    }

    pub fn compatibility(&self) -> Compatibility {
        self.apps
            .iter()
            .fold(Compatibility::new(self.compatibility_type), |compat, (guid, min, max)| {
                compat.app(guid, min, max)
            })
    }
}

pub mod notices {
    use super::CompatNotice;
    use crate::diagnostic::{CompatibilityType, FIREFOX_GUID, THUNDERBIRD_GUID};

    pub static AMP_RP_BUG660359: CompatNotice = CompatNotice {
        check: "amp_rp_bug660359",
        message: "Custom add-on types may not work properly in Firefox 6",
        description: "This add-on appears to register custom add-on types, which are \
                      affected and may not work properly due to changes made on Firefox 6. \
                      For more information, please refer to \
                      https://bugzilla.mozilla.org/show_bug.cgi?id=595848",
        compatibility_type: CompatibilityType::Error,
        apps: &[
            (FIREFOX_GUID, "6.0a1", "7.0a1"),
            (THUNDERBIRD_GUID, "6.0a1", "7.0a1"),
        ],
        returns_object: false,
    };

    pub static NSIDOMFILE_DEPREC: CompatNotice = CompatNotice {
        check: "nsIDOMFile_deprec",
        message: "Deprecated nsIDOMFile methods in use.",
        description: "Your add-on uses methods that have been removed from the nsIDOMFile \
                      interface in Firefox 7. Please refer to \
                      https://bugzilla.mozilla.org/show_bug.cgi?id=661876 for more information.",
        compatibility_type: CompatibilityType::Error,
        apps: &[
            (FIREFOX_GUID, "7.0a1", "8.0a1"),
            (THUNDERBIRD_GUID, "7.0a1", "8.0a1"),
        ],
        returns_object: true,
    };

    pub static NSIJSON_DEPREC: CompatNotice = CompatNotice {
        check: "nsIJSON_deprec",
        message: "Deprecated nsIJSON methods in use.",
        description: "The encode and decode methods in nsIJSON have been deprecated in \
                      Firefox 7. You can use the methods in the global JSON object instead. \
                      See https://developer.mozilla.org/En/Using_native_JSON for more \
                      information.",
        compatibility_type: CompatibilityType::Warning,
        apps: &[
            (FIREFOX_GUID, "7.0a1", "8.0a1"),
            (THUNDERBIRD_GUID, "7.0a1", "8.0a1"),
        ],
        returns_object: true,
    };

    pub static IMAP_MAIL_FOLDER_SINK_CHANGED: CompatNotice = CompatNotice {
        check: "nsIImapMailFolderSink_changed",
        message: "Modified nsIImapMailFolderSink method in use.",
        description: "This add-on appears to use nsIImapMailFolderSink.setUrlState, which may \
                      no longer work correctly due to changes made in Thunderbird 6. For more \
                      information, please refer to \
                      https://bugzilla.mozilla.org/show_bug.cgi?id=464126",
        compatibility_type: CompatibilityType::Error,
        apps: &[(THUNDERBIRD_GUID, "6.0a1", "8.0a1")],
        returns_object: true,
    };

    pub static IMAP_PROTOCOL_REMOVED: CompatNotice = CompatNotice {
        check: "nsIImapProtocol_removed",
        message: "Removed nsIImapProtocol method in use.",
        description: "This add-on appears to use nsIImapProtocol.NotifyHdrsToDownload, which \
                      may no longer work correctly due to changes made in Thunderbird 6. For \
                      more information, please refer to \
                      https://bugzilla.mozilla.org/show_bug.cgi?id=464126",
        compatibility_type: CompatibilityType::Error,
        apps: &[(THUNDERBIRD_GUID, "6.0a1", "8.0a1")],
        returns_object: true,
    };

    pub static DOCUMENT_GET_SELECTION: CompatNotice = CompatNotice {
        check: "document_getSelection",
        message: "document.getSelection()'s return type has changed.",
        description: "The return type of document.getSelection() has changed in Firefox 8. \
                      This function is deprecated, and you should be using \
                      window.getSelection() instead. See \
                      https://developer.mozilla.org/En/Window.getSelection for more \
                      information.",
        compatibility_type: CompatibilityType::Error,
        apps: &[
            (FIREFOX_GUID, "8.0a1", "9.0a1"),
            (THUNDERBIRD_GUID, "8.0a1", "9.0a1"),
        ],
        returns_object: true,
    };

    pub static MSG_THREAD_REMOVED: CompatNotice = CompatNotice {
        check: "nsIMsgThread_removed",
        message: "Removed nsIMsgThread method in use.",
        description: "This add-on appears to use nsIMsgThread.GetChildAt, which may no longer \
                      work correctly due to changes made in Thunderbird 7. For more \
                      information, please refer to \
                      https://bugzilla.mozilla.org/show_bug.cgi?id=617839",
        compatibility_type: CompatibilityType::Error,
        apps: &[(THUNDERBIRD_GUID, "7.0a1", "8.0a1")],
        returns_object: true,
    };

    pub static MAIL_ATTACHMENT_API: CompatNotice = CompatNotice {
        check: "mail_attachment_api",
        message: "Removed attachment API function in use.",
        description: "This add-on appears to use a global attachment function, one of: \
                      attachmentIsEmpty, cloneAttachment, createNewAttachmentInfo, \
                      detachAttachment, openAttachment or saveAttachment, which were removed \
                      in Thunderbird 7. For more information, please refer to \
                      https://bugzilla.mozilla.org/show_bug.cgi?id=657856",
        compatibility_type: CompatibilityType::Error,
        apps: &[(THUNDERBIRD_GUID, "7.0a1", "8.0a1")],
        returns_object: true,
    };

    pub static MSG_SEARCH_SCOPE_TERM_REMOVED: CompatNotice = CompatNotice {
        check: "nsIMsgSearchScopeTerm_removed",
        message: "Removed nsIMsgSearchScopeTerm method in use.",
        description: "This add-on appears to use nsIMsgSearchScopeTerm.mailFile or \
                      nsIMsgSearchScopeTerm.inputStream, both of which have been removed as \
                      part of changes made in Thunderbird 8. For more information, please \
                      refer to https://bugzilla.mozilla.org/show_bug.cgi?id=668700",
        compatibility_type: CompatibilityType::Error,
        apps: &[(THUNDERBIRD_GUID, "8.0a1", "9.0a1")],
        returns_object: true,
    };

    /// Every notice a call can raise.
    pub static ALL: &[&CompatNotice] = &[
        &AMP_RP_BUG660359,
        &NSIDOMFILE_DEPREC,
        &NSIJSON_DEPREC,
        &IMAP_MAIL_FOLDER_SINK_CHANGED,
        &IMAP_PROTOCOL_REMOVED,
        &DOCUMENT_GET_SELECTION,
        &MSG_THREAD_REMOVED,
        &MAIL_ATTACHMENT_API,
        &MSG_SEARCH_SCOPE_TERM_REMOVED,
    ];
}

pub fn compat_notice(notice: &'static CompatNotice) -> ReturnHook {
    Arc::new(move |call: &mut HookCall<'_, '_>| -> Result<Wrapped, HookError> {
        let diagnostic = call
            .traverser
            .diagnostic(notice.rule_id(), Severity::Notice, notice.message)
            .with_description(notice.description)
            .with_compatibility(notice.compatibility())
            .with_tier(COMPAT_TIER);
        call.traverser.emit(diagnostic);

        if notice.returns_object {
            Ok(call.traverser.heap_mut().alloc_object(JsObject::default()))
        } else {
            Ok(Wrapped::unknown())
        }
    })
}

/// Wraps an XPCOM instantiation method (`createInstance`, `QueryInterface`
/// and friends). The first argument names the interface; the instance is an
/// independent copy of its descriptor.
///
/// `extend` copies the parent's members into the new instance. `mutate`
/// rebinds the parent to the new instance. With both, the instance's
/// members are merged into the parent, which is returned.
pub fn xpcom_constructor(method: &'static str, extend: bool, mutate: bool) -> ReturnHook {
    Arc::new(move |call: &mut HookCall<'_, '_>| -> Result<Wrapped, HookError> {
        let interface = call.args.value(0).ok_or(HookError::MissingArgument)?;
        tracing::trace!(method, "building XPCOM instance");

        let name = instance_name(interface, method);
        let entity = call.traverser.xpcom_source(interface).unwrap_or_default();
        let instance = call.traverser.wrap_instance(name, entity);

        if !(extend || mutate) {
            return Ok(instance);
        }
        Ok(merge_with_parent(call, instance, extend, mutate))
    })
}

fn instance_name(interface: &Wrapped, method: &str) -> String {
    match &interface.kind {
        ValueKind::Global(GlobalRef { name, .. }) => {
            name.rsplit('.').next().unwrap_or(name).to_string()
        }
        _ => method.to_string(),
    }
}

fn instance_id(value: &Wrapped) -> Option<InstanceId> {
    match &value.kind {
        ValueKind::Global(GlobalRef {
            target: GlobalTarget::Instance(id),
            ..
        }) => Some(*id),
        _ => None,
    }
}

fn merge_with_parent(
    call: &mut HookCall<'_, '_>,
    instance: Wrapped,
    extend: bool,
    mutate: bool,
) -> Wrapped {
    let Some(instance_id) = instance_id(&instance) else {
        return instance;
    };
    let parent = call.this.clone();
    let parent_target = parent.as_ref().and_then(|parent| match &parent.kind {
        ValueKind::Global(GlobalRef { name, target }) => Some((name.clone(), target.clone())),
        _ => None,
    });

    match parent_target {
        Some((_, GlobalTarget::Instance(parent_id))) => {
            let heap = call.traverser.heap_mut();
            match (extend, mutate) {
                (true, true) => {
                    let added = members_of(&heap.instance(instance_id).entity);
                    heap.instance_mut(parent_id).entity.members_mut().extend(added);
                    parent.unwrap_or(instance)
                }
                (true, false) => {
                    let inherited = members_of(&heap.instance(parent_id).entity);
                    heap.instance_mut(instance_id).entity.members_mut().extend(inherited);
                    instance
                }
                (false, true) => {
                    call.rebind_parent(instance.clone());
                    instance
                }
                (false, false) => instance,
            }
        }
        // Knowledge base nodes are shared and frozen, so the parent is first
        // promoted to an instance of its own.
        Some((name, GlobalTarget::Entity(shared)))
            if shared.members().is_some() && !call.traverser.knowledge_base().is_root(&shared) =>
        {
            match (extend, mutate) {
                (true, true) => {
                    let mut owned = shared.deep_clone();
                    let added = members_of(&call.traverser.heap().instance(instance_id).entity);
                    owned.members_mut().extend(added);
                    let promoted = promote(call, name, owned);
                    call.rebind_parent(promoted.clone());
                    promoted
                }
                (true, false) => {
                    let inherited = members_of(&shared.deep_clone());
                    call.traverser
                        .heap_mut()
                        .instance_mut(instance_id)
                        .entity
                        .members_mut()
                        .extend(inherited);
                    instance
                }
                (false, true) => {
                    call.rebind_parent(instance.clone());
                    instance
                }
                (false, false) => instance,
            }
        }
        // Any other parent is taken to be a wrapped native and simply
        // becomes the instance.
        _ => {
            if mutate {
                call.rebind_parent(instance.clone());
            }
            instance
        }
    }
}

fn members_of(entity: &Entity) -> Vec<(String, Arc<Entity>)> {
    entity
        .members()
        .map(|members| {
            members
                .iter()
                .map(|(name, member)| (name.clone(), member.clone()))
                .collect()
        })
        .unwrap_or_default()
}

fn promote(call: &mut HookCall<'_, '_>, name: String, entity: Entity) -> Wrapped {
    let id = call.traverser.heap_mut().alloc_instance(Instance {
        name: name.clone(),
        entity,
        assigned: Default::default(),
    });
    let mut value = Wrapped::global(name, GlobalTarget::Instance(id));
    value.overwritable = true;
    value
}

fn first_argument_unknown(call: &HookCall<'_, '_>) -> bool {
    call.args.value(0).is_some_and(Wrapped::is_unknown)
}

pub fn string_global(call: &mut HookCall<'_, '_>) -> Result<Wrapped, HookError> {
    if first_argument_unknown(call) {
        return Ok(Wrapped::unknown());
    }
    Ok(Wrapped::string(call.args.string(0)))
}

pub fn array_global(call: &mut HookCall<'_, '_>) -> Result<Wrapped, HookError> {
    let elements = call.args.values().to_vec();
    Ok(call.traverser.heap_mut().alloc_array(elements))
}

/// Unparseable input yields NaN.
pub fn number_global(call: &mut HookCall<'_, '_>) -> Result<Wrapped, HookError> {
    if call.args.is_empty() {
        return Ok(Wrapped::number(0.0));
    }
    Ok(Wrapped::number(call.args.number(0)))
}

pub fn boolean_global(call: &mut HookCall<'_, '_>) -> Result<Wrapped, HookError> {
    if first_argument_unknown(call) {
        return Ok(Wrapped::unknown());
    }
    Ok(Wrapped::boolean(call.args.truthy(0)))
}

/// A one-argument numeric function. A missing argument is `default`.
pub fn math_unary(apply: fn(f64) -> f64, default: f64) -> ReturnHook {
    Arc::new(move |call: &mut HookCall<'_, '_>| -> Result<Wrapped, HookError> {
        if first_argument_unknown(call) {
            return Ok(Wrapped::unknown());
        }
        let x = if call.args.is_empty() { default } else { call.args.number(0) };
        Ok(Wrapped::number(apply(x)))
    })
}

/// A two-argument numeric function with per-position defaults.
pub fn math_binary(apply: fn(f64, f64) -> f64, defaults: (f64, f64)) -> ReturnHook {
    Arc::new(move |call: &mut HookCall<'_, '_>| -> Result<Wrapped, HookError> {
        if call.args.values().iter().take(2).any(Wrapped::is_unknown) {
            return Ok(Wrapped::unknown());
        }
        let x = if call.args.is_empty() { defaults.0 } else { call.args.number(0) };
        let y = if call.args.len() > 1 { call.args.number(1) } else { defaults.1 };
        Ok(Wrapped::number(apply(x, y)))
    })
}

/// `log(0)` is negative infinity; negative input is not modeled.
pub fn math_log(call: &mut HookCall<'_, '_>) -> Result<Wrapped, HookError> {
    if call.args.is_empty() {
        return Ok(Wrapped::number(0.0));
    }
    if first_argument_unknown(call) {
        return Ok(Wrapped::unknown());
    }

    let x = call.args.number(0);
    if x == 0.0 {
        Ok(Wrapped::number(f64::NEG_INFINITY))
    } else if x < 0.0 {
        Ok(Wrapped::unknown())
    } else {
        Ok(Wrapped::number(x.ln()))
    }
}

pub fn math_max(call: &mut HookCall<'_, '_>) -> Result<Wrapped, HookError> {
    fold_numbers(call, f64::NEG_INFINITY, f64::max)
}

pub fn math_min(call: &mut HookCall<'_, '_>) -> Result<Wrapped, HookError> {
    fold_numbers(call, f64::INFINITY, f64::min)
}

fn fold_numbers(
    call: &HookCall<'_, '_>,
    empty: f64,
    pick: fn(f64, f64) -> f64,
) -> Result<Wrapped, HookError> {
    if call.args.values().iter().any(Wrapped::is_unknown) {
        return Ok(Wrapped::unknown());
    }

    let mut result = empty;
    for index in 0..call.args.len() {
        let n = call.args.number(index);
        if n.is_nan() {
            return Ok(Wrapped::number(f64::NAN));
        }
        result = pick(result, n);
    }
    Ok(Wrapped::number(result))
}

/// Always the midpoint, so repeated analysis is deterministic.
pub fn math_random(_call: &mut HookCall<'_, '_>) -> Result<Wrapped, HookError> {
    Ok(Wrapped::number(0.5))
}

/// Rounds half-way values toward positive infinity. Infinities pass through.
pub fn math_round(call: &mut HookCall<'_, '_>) -> Result<Wrapped, HookError> {
    let Some(argument) = call.args.value(0) else {
        return Ok(Wrapped::number(0.0));
    };
    if argument.is_unknown() {
        return Ok(Wrapped::unknown());
    }

    let x = call.args.number(0);
    if x.is_infinite() {
        return Ok(argument.clone());
    }
    Ok(Wrapped::number(round_half_up(x)))
}

fn round_half_up(x: f64) -> f64 {
    let floor = x.floor();
    if x - floor >= 0.5 { floor + 1.0 } else { floor }
}
