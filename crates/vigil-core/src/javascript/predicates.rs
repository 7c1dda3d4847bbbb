//! Dangerous-usage predicates referenced by the knowledge base tables.
//!
//! A predicate sees the evaluated arguments and the run environment and
//! returns a [`Verdict`]. It never emits diagnostics itself; the dispatcher
//! reports violations under `javascript::called_dangerous_global`.

use std::sync::LazyLock;

use regex::Regex;

use super::calls::COMPAT_TIER;
use super::dispatch::{Arguments, Environment};
use super::entities::Verdict;
use super::traverser::Traverser;
use crate::context::BOOTSTRAP;
use crate::diagnostic::{
    Compatibility, CompatibilityType, FIREFOX_GUID, RuleId, Severity, THUNDERBIRD_GUID,
};

pub const READONLY_TOP: RuleId = RuleId::new("javascript", "readonly_top");

const PREFERENCES_DIR: &str = "defaults/preferences/";
const EXTENSIONS_BRANCH: &str = "extensions.";

/// Preference branches an extension may not touch from its defaults file.
pub static BANNED_PREF_BRANCHES: &[&str] = &[
    "browser.preferences.instantApply",
    "capability.policy.",
    "extensions.alwaysUnpack",
    "extensions.blocklist.",
    "extensions.bootstrappedAddons",
    "extensions.checkCompatibility",
    "extensions.dss.",
    "extensions.getAddons.",
    "extensions.getMoreThemesURL",
    "extensions.installCache",
    "extensions.lastAppVersion",
    "extensions.pendingOperations",
    "extensions.update.",
    "general.useragent.",
    "network.http.",
    "network.websocket.",
];

const UPDATE_PREF_PATTERN: &str = r"extensions\..*\.update\.(url|enabled|interval)";

static UPDATE_PREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{UPDATE_PREF_PATTERN}")).expect("Invalid regex pattern")
});

/// `setTimeout`/`setInterval` with anything but a function is string
/// evaluation. Values of unknown type are flagged too.
pub fn settimeout(args: &Arguments<'_>, _env: &Environment<'_>) -> Verdict {
    Verdict::when(!args.is_empty() && !args.is_function(0))
}

/// `pref()`/`user_pref()` in a defaults file must stay inside the
/// extension's own `extensions.<name>.` branch.
pub fn create_pref(args: &Arguments<'_>, env: &Environment<'_>) -> Verdict {
    if !env.filename.starts_with(PREFERENCES_DIR) || args.is_empty() {
        return Verdict::Safe;
    }
    let name = args.string(0);

    if let Some(branch) = BANNED_PREF_BRANCHES.iter().find(|b| name.starts_with(*b)) {
        return Verdict::message(format!(
            "Extensions should not alter preferences in the '{branch}' preference branch"
        ));
    }

    if UPDATE_PREF.is_match(&name) {
        return Verdict::message(format!(
            "Extensions should not alter preferences matching /{UPDATE_PREF_PATTERN}/"
        ));
    }

    let has_own_branch = name.starts_with(EXTENSIONS_BRANCH)
        && name.rfind('.').is_some_and(|dot| dot >= EXTENSIONS_BRANCH.len());
    if !has_own_branch {
        return Verdict::message(
            "Extensions should not alter preferences outside of the 'extensions.' \
             preference branch. Please make sure that all of your extension's \
             preferences are prefixed with 'extensions.add-on-name.', where \
             'add-on-name' is a distinct string unique to and indicative of your add-on.",
        );
    }

    Verdict::Safe
}

pub fn create_element(args: &Arguments<'_>, _env: &Environment<'_>) -> Verdict {
    Verdict::when(args.is_empty() || args.string(0).to_lowercase() == "script")
}

/// The tag name is the second argument; the first is the namespace.
pub fn create_element_ns(args: &Arguments<'_>, _env: &Environment<'_>) -> Verdict {
    Verdict::when(args.is_empty() || args.string(1).to_lowercase() == "script")
}

pub fn load_overlay(args: &Arguments<'_>, _env: &Environment<'_>) -> Verdict {
    if args.is_empty() {
        return Verdict::Violation;
    }
    let url = args.string(0).to_lowercase();
    Verdict::when(!(url.starts_with("chrome:") || url.starts_with("resource:")))
}

/// Synchronous requests pass a falsy third argument.
pub fn xhr_open(args: &Arguments<'_>, _env: &Environment<'_>) -> Verdict {
    if args.len() >= 3 && !args.truthy(2) {
        Verdict::message(
            "Synchronous HTTP requests can cause serious UI performance problems, \
             especially to users with slow network connections.",
        )
    } else {
        Verdict::Safe
    }
}

pub fn import_ctypes(args: &Arguments<'_>, _env: &Environment<'_>) -> Verdict {
    Verdict::when(!args.is_empty() && args.string(0).contains("ctypes.jsm"))
}

pub fn category_entry(args: &Arguments<'_>, env: &Environment<'_>) -> Verdict {
    if !env.run.is_enabled(BOOTSTRAP) {
        return Verdict::Safe;
    }
    if args.truthy(3) {
        Verdict::message("Bootstrapped add-ons may not create persistent category entries")
    } else {
        Verdict::message(
            "Authors of bootstrapped add-ons must take care to cleanup any added \
             category entries at shutdown",
        )
    }
}

pub fn res_substitution(args: &Arguments<'_>, env: &Environment<'_>) -> Verdict {
    if env.run.is_enabled(BOOTSTRAP) && args.len() > 1 && args.truthy(1) {
        Verdict::message(
            "Authors of bootstrapped add-ons must take care to cleanup any added \
             resource substitutions at shutdown",
        )
    } else {
        Verdict::Safe
    }
}

/// Flags a registration that bootstrapped add-ons must undo on shutdown.
pub fn bootstrap_cleanup(
    message: &'static str,
) -> impl Fn(&Arguments<'_>, &Environment<'_>) -> Verdict + Send + Sync + 'static {
    move |_args, env| {
        if env.run.is_enabled(BOOTSTRAP) {
            Verdict::message(message)
        } else {
            Verdict::Safe
        }
    }
}

/// Writes to `top` are allowed but break on Gecko 6 and later.
pub fn readonly_top(traverser: &mut Traverser<'_>) -> bool {
    let compatibility = Compatibility::new(CompatibilityType::Warning)
        .app(FIREFOX_GUID, "6.0a1", "7.0a1")
        .app(THUNDERBIRD_GUID, "6.0a1", "7.0a1");

    let diagnostic = traverser
        .diagnostic(READONLY_TOP, Severity::Notice, "window.top is a reserved variable")
        .with_description(
            "The 'top' global variable is reserved and cannot be assigned any values \
             starting with Gecko 6. Review your code for any uses of the 'top' global, \
             and refer to https://bugzilla.mozilla.org/show_bug.cgi?id=654137 for more \
             information.",
        )
        .with_compatibility(compatibility)
        .with_tier(COMPAT_TIER);
    traverser.emit(diagnostic);
    false
}
