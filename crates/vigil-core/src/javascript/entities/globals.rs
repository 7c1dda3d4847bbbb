//! The global table, which doubles as the `window` object.

use std::f64::consts;

use indexmap::IndexMap;

use super::Entity;
use crate::javascript::calls::{self, notices};
use crate::javascript::predicates;
use crate::javascript::value::{Context, Literal};

/// Identifiers and member names that may not be used at all.
pub static BANNED_IDENTIFIERS: &[(&str, &str)] = &[
    (
        "newThread",
        "Creating threads from JavaScript is a common cause of crashes and is \
         unsupported in recent versions of the platform",
    ),
    (
        "processNextEvent",
        "Spinning the event loop with processNextEvent is a common cause of \
         deadlocks, crashes, and other errors due to unintended reentrancy. \
         Please use asynchronous callbacks instead wherever possible",
    ),
];

const WINDOW: &[&str] = &[];

fn readonly_prototype() -> Entity {
    Entity::new().member("prototype", Entity::new().readonly(true))
}

fn number(value: f64) -> Entity {
    Entity::new().constant(Literal::Number(value))
}

pub(super) fn table() -> Vec<(&'static str, Entity)> {
    let mut globals = vec![
        ("window", Entity::new().alias(WINDOW)),
        ("self", Entity::new().alias(WINDOW)),
        ("null", Entity::new().constant(Literal::Null)),
        (
            "Cc",
            Entity::new().readonly(false).alias(&["Components", "classes"]),
        ),
        (
            "Ci",
            Entity::new().readonly(false).alias(&["Components", "interfaces"]),
        ),
        (
            "Cu",
            Entity::new().readonly(false).alias(&["Components", "utils"]),
        ),
        (
            "Services",
            Entity::new()
                .member("scriptloader", Entity::new().dangerous())
                .member(
                    "wm",
                    Entity::new().service("getService", "nsIWindowMediator"),
                )
                .member(
                    "ww",
                    Entity::new().service("getService", "nsIWindowWatcher"),
                ),
        ),
        ("document", document()),
        (
            "setTimeout",
            Entity::new().dangerous_when(predicates::settimeout),
        ),
        (
            "setInterval",
            Entity::new().dangerous_when(predicates::settimeout),
        ),
    ];

    for attachment_fn in [
        "createNewAttachmentInfo",
        "saveAttachment",
        "attachmentIsEmpty",
        "openAttachment",
        "detachAttachment",
        "cloneAttachment",
    ] {
        globals.push((
            attachment_fn,
            Entity::new().returns_hook(calls::compat_notice(&notices::MAIL_ATTACHMENT_API)),
        ));
    }

    for builtin in [
        "encodeURI",
        "decodeURI",
        "encodeURIComponent",
        "decodeURIComponent",
        "escape",
        "unescape",
        "isFinite",
        "isNaN",
        "parseFloat",
        "parseInt",
    ] {
        globals.push((builtin, Entity::new().readonly(true)));
    }

    globals.extend([
        ("eval", Entity::new().dangerous()),
        ("Function", Entity::new().dangerous()),
        (
            "Object",
            readonly_prototype().member("constructor", Entity::new().alias(&["Function"])),
        ),
        ("String", readonly_prototype().returns(calls::string_global)),
        ("Array", readonly_prototype().returns(calls::array_global)),
        (
            "Number",
            readonly_prototype()
                .member("POSITIVE_INFINITY", number(f64::INFINITY))
                .member("NEGATIVE_INFINITY", number(f64::NEG_INFINITY))
                .returns(calls::number_global),
        ),
        ("Boolean", readonly_prototype().returns(calls::boolean_global)),
        ("RegExp", readonly_prototype()),
        ("Date", readonly_prototype()),
        ("Math", math()),
        (
            "netscape",
            Entity::new().member(
                "security",
                Entity::new().member(
                    "PrivilegeManager",
                    Entity::new().member("enablePrivilege", Entity::new().dangerous()),
                ),
            ),
        ),
        (
            "navigator",
            Entity::new()
                .member("wifi", Entity::new().dangerous())
                .member("geolocation", Entity::new().dangerous()),
        ),
        ("Components", components()),
        ("extensions", Entity::new().dangerous()),
        ("xpcnativewrappers", Entity::new().dangerous()),
        (
            "AddonManagerPrivate",
            Entity::new().member(
                "registerProvider",
                Entity::new().returns_hook(calls::compat_notice(&notices::AMP_RP_BUG660359)),
            ),
        ),
        (
            "XMLHttpRequest",
            Entity::new().member("open", Entity::new().dangerous_when(predicates::xhr_open)),
        ),
        (
            "Infinity",
            Entity::new()
                .readonly(true)
                .alias(&["Number", "POSITIVE_INFINITY"]),
        ),
        (
            "NaN",
            Entity::new().readonly(true).constant(Literal::Number(f64::NAN)),
        ),
        (
            "undefined",
            Entity::new().readonly(true).constant(Literal::Undefined),
        ),
        ("innerHeight", Entity::new().readonly(false)),
        ("innerWidth", Entity::new().readonly(false)),
        ("width", Entity::new().readonly(false)),
        ("height", Entity::new().readonly(false)),
        ("top", Entity::new().readonly_when(predicates::readonly_top)),
        (
            "content",
            Entity::new()
                .context(Context::Content)
                .member("document", Entity::new().alias(&["document"])),
        ),
        (
            "contentWindow",
            Entity::new().context(Context::Content).alias(WINDOW),
        ),
        ("_content", Entity::new().alias(&["content"])),
        (
            "gBrowser",
            Entity::new()
                .member(
                    "contentDocument",
                    Entity::new()
                        .context(Context::Content)
                        .alias(&["content", "document"]),
                )
                .member("contentWindow", Entity::new().alias(WINDOW)),
        ),
        ("opener", Entity::new().alias(WINDOW)),
        ("pref", Entity::new().dangerous_when(predicates::create_pref)),
        (
            "user_pref",
            Entity::new().dangerous_when(predicates::create_pref),
        ),
    ]);

    globals
}

fn document() -> Entity {
    Entity::new()
        .member("title", Entity::new().overwritable().readonly(false))
        .member("defaultView", Entity::new().alias(WINDOW))
        .member(
            "createElement",
            Entity::new().dangerous_when(predicates::create_element),
        )
        .member(
            "createElementNS",
            Entity::new().dangerous_when(predicates::create_element_ns),
        )
        .member(
            "getSelection",
            Entity::new().returns_hook(calls::compat_notice(&notices::DOCUMENT_GET_SELECTION)),
        )
        .member(
            "loadOverlay",
            Entity::new().dangerous_when(predicates::load_overlay),
        )
}

fn math() -> Entity {
    Entity::new()
        .member("PI", number(consts::PI))
        .member("E", number(consts::E))
        .member("LN2", number(consts::LN_2))
        .member("LN10", number(consts::LN_10))
        .member("LOG2E", number(consts::LOG2_E))
        .member("LOG10E", number(consts::LOG10_E))
        .member("SQRT2", number(consts::SQRT_2))
        .member("SQRT1_2", number(consts::FRAC_1_SQRT_2))
        .member("abs", Entity::new().returns_hook(calls::math_unary(f64::abs, 0.0)))
        .member("acos", Entity::new().returns_hook(calls::math_unary(f64::acos, 0.0)))
        .member("asin", Entity::new().returns_hook(calls::math_unary(f64::asin, 0.0)))
        .member("atan", Entity::new().returns_hook(calls::math_unary(f64::atan, 0.0)))
        .member(
            "atan2",
            Entity::new().returns_hook(calls::math_binary(f64::atan2, (0.0, 1.0))),
        )
        .member("ceil", Entity::new().returns_hook(calls::math_unary(f64::ceil, 0.0)))
        .member("cos", Entity::new().returns_hook(calls::math_unary(f64::cos, 0.0)))
        .member("exp", Entity::new().returns_hook(calls::math_unary(f64::exp, 0.0)))
        .member("floor", Entity::new().returns_hook(calls::math_unary(f64::floor, 0.0)))
        .member("log", Entity::new().returns(calls::math_log))
        .member("max", Entity::new().returns(calls::math_max))
        .member("min", Entity::new().returns(calls::math_min))
        .member(
            "pow",
            Entity::new().returns_hook(calls::math_binary(f64::powf, (0.0, 0.0))),
        )
        .member("random", Entity::new().returns(calls::math_random))
        .member("round", Entity::new().returns(calls::math_round))
        .member("sin", Entity::new().returns_hook(calls::math_unary(f64::sin, 0.0)))
        .member("sqrt", Entity::new().returns_hook(calls::math_unary(f64::sqrt, 1.0)))
        .member("tan", Entity::new().returns_hook(calls::math_unary(f64::tan, 0.0)))
}

fn components() -> Entity {
    let mut interfaces = Entity::new().member(
        "nsIXMLHttpRequest",
        Entity::new().xpcom_global(&["XMLHttpRequest"]),
    );
    for &name in super::interfaces::NAMES {
        interfaces = interfaces.member(name, Entity::new().xpcom_interface(name));
    }
    for name in [
        "nsIProcess",
        "nsIDOMGeoGeolocation",
        "nsIX509CertDB",
        "mozIJSSubScriptLoader",
    ] {
        interfaces = interfaces.member(name, Entity::new().dangerous());
    }

    Entity::new()
        .readonly(true)
        .member(
            "classes",
            Entity::new()
                .xpcom_wildcard()
                .member(
                    "createInstance",
                    Entity::new().returns_hook(calls::xpcom_constructor("createInstance", false, false)),
                )
                .member(
                    "getService",
                    Entity::new().returns_hook(calls::xpcom_constructor("getService", false, false)),
                ),
        )
        .member(
            "utils",
            Entity::new()
                .member("evalInSandbox", Entity::new().dangerous())
                .member("import", Entity::new().dangerous_when(predicates::import_ctypes)),
        )
        .member("interfaces", interfaces)
}

/// Members reachable on any object.
pub(super) fn universal() -> IndexMap<&'static str, Entity> {
    IndexMap::from([
        (
            "QueryInterface",
            Entity::new().returns_hook(calls::xpcom_constructor("QueryInterface", true, true)),
        ),
        (
            "getInterface",
            Entity::new().returns_hook(calls::xpcom_constructor("getInterface", false, false)),
        ),
    ])
}
