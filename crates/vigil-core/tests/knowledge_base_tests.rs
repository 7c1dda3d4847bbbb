//! Knowledge base coverage
//!
//! Each dangerous or deprecated entry is shown firing exactly once on a
//! triggering script and staying quiet on a benign one.

use vigil_core::javascript::calls::{COMPAT_TIER, CompatNotice, notices};
use vigil_core::javascript::dispatch::CALLED_DANGEROUS_GLOBAL;
use vigil_core::javascript::traverser::DANGEROUS_GLOBAL;
use vigil_core::{AnalysisEngine, BOOTSTRAP, Diagnostic, RuleId, RunContext};

fn analyze_with(code: &str, run: &RunContext) -> Vec<Diagnostic> {
    AnalysisEngine::new().analyze_source("bootstrap.js", code, run)
}

fn matching(code: &str, run: &RunContext, rule: RuleId) -> Vec<Diagnostic> {
    analyze_with(code, run)
        .into_iter()
        .filter(|d| d.rule_id == rule)
        .collect()
}

fn bootstrapped() -> RunContext {
    RunContext::new().with_resource(BOOTSTRAP, true)
}

fn not_bootstrapped() -> RunContext {
    RunContext::new().with_resource(BOOTSTRAP, false)
}

fn service(contract: &str, interface: &str, call: &str) -> String {
    format!("var svc = Cc['{contract}'].getService(Ci.{interface});\nsvc.{call};\n")
}

/// Asserts that `code` raises one cleanup warning containing `fragment` in a
/// bootstrapped add-on and none otherwise.
fn assert_cleanup(code: &str, fragment: &str) {
    let flagged = matching(code, &bootstrapped(), CALLED_DANGEROUS_GLOBAL);
    assert_eq!(flagged.len(), 1, "{flagged:?}");
    assert!(flagged[0].message.contains(fragment), "{}", flagged[0].message);
    assert_eq!(flagged[0].line, 2);

    assert!(matching(code, &not_bootstrapped(), CALLED_DANGEROUS_GLOBAL).is_empty());
    assert!(matching(code, &RunContext::new(), CALLED_DANGEROUS_GLOBAL).is_empty());
}

fn assert_dangerous_access(code: &str) {
    let flagged = matching(code, &RunContext::new(), DANGEROUS_GLOBAL);
    assert_eq!(flagged.len(), 1, "{code}: {flagged:?}");
}

fn assert_quiet(code: &str, rule: RuleId) {
    let flagged = matching(code, &bootstrapped(), rule);
    assert!(flagged.is_empty(), "{code}: {flagged:?}");
}

fn assert_notice(code: &str, notice: &CompatNotice) {
    let flagged = matching(code, &RunContext::new(), notice.rule_id());
    assert_eq!(flagged.len(), 1, "{code}: {flagged:?}");
    assert_eq!(flagged[0].message, notice.message);
    assert_eq!(flagged[0].tier, Some(COMPAT_TIER));
}

#[test]
fn component_registration_needs_cleanup() {
    let registrar = |call: &str| service("@mozilla.org/registrar;1", "nsIComponentRegistrar", call);

    assert_cleanup(&registrar("autoRegister(manifest)"), "chrome manifest");
    assert_cleanup(&registrar("registerFactory(cid, 'x', contract, factory)"), "component registrations");
    assert_quiet(&registrar("isCIDRegistered(cid)"), CALLED_DANGEROUS_GLOBAL);
}

#[test]
fn string_bundles_need_cleanup() {
    let bundles = |call: &str| service("@mozilla.org/intl/stringbundle;1", "nsIStringBundleService", call);

    assert_cleanup(&bundles("createStringBundle(url)"), "string bundle cache");
    assert_cleanup(&bundles("createExtensibleBundle('x')"), "string bundle cache");
    assert_quiet(&bundles("flushBundles()"), CALLED_DANGEROUS_GLOBAL);
}

#[test]
fn stylesheets_need_cleanup() {
    let sheets = |call: &str| service("@mozilla.org/content/style-sheet-service;1", "nsIStyleSheetService", call);

    assert_cleanup(&sheets("loadAndRegisterSheet(uri, 2)"), "registered stylesheets");
    assert_quiet(&sheets("sheetRegistered(uri, 0)"), CALLED_DANGEROUS_GLOBAL);
}

#[test]
fn prebuilt_window_services_need_cleanup() {
    assert_cleanup("var l = {};\nServices.wm.registerNotification(l);\n", "added observers");
    assert_cleanup("var l = {};\nServices.ww.addListener(l);\n", "added observers");
    assert_quiet(
        "var w = Services.wm.getMostRecentWindow('navigator:browser');",
        CALLED_DANGEROUS_GLOBAL,
    );
}

#[test]
fn accessibility_retrieval_is_reported_when_instantiated() {
    let code = "var acc = Cc['@mozilla.org/accessibleRetrieval;1'].getService(Ci.nsIAccessibleRetrieval);";

    let flagged = matching(code, &RunContext::new(), DANGEROUS_GLOBAL);
    assert_eq!(flagged.len(), 1, "{flagged:?}");
    assert!(flagged[0].message.contains("performance degradation"), "{}", flagged[0].message);

    assert_quiet(
        "var json = Cc['@mozilla.org/dom/json;1'].getService(Ci.nsIJSON);",
        DANGEROUS_GLOBAL,
    );
}

#[test]
fn privileged_apis_are_reported_on_access() {
    assert_dangerous_access("Cu.evalInSandbox(code, sandbox);");
    assert_dangerous_access("Components.utils.evalInSandbox(code, sandbox);");
    assert_dangerous_access("netscape.security.PrivilegeManager.enablePrivilege('UniversalXPConnect');");
    assert_dangerous_access("var p = Cc['@mozilla.org/process/util;1'].createInstance(Ci.nsIProcess);");
    assert_dangerous_access("navigator.geolocation.getCurrentPosition(found);");

    assert_quiet("Cu.reportError(e);", DANGEROUS_GLOBAL);
    assert_quiet("var pm = netscape.security.PrivilegeManager;", DANGEROUS_GLOBAL);
    assert_quiet(
        "var os = Cc['@mozilla.org/observer-service;1'].getService(Ci.nsIObserverService);",
        DANGEROUS_GLOBAL,
    );
    assert_quiet("var agent = navigator.userAgent;", DANGEROUS_GLOBAL);
}

#[test]
fn removed_dom_file_methods_raise_notices() {
    for method in ["getAsBinary", "getAsDataURL", "getAsText"] {
        let code = format!(
            "var f = Cc['@mozilla.org/file;1'].createInstance(Ci.nsIDOMFile);\nf.{method}('utf-8');"
        );
        assert_notice(&code, &notices::NSIDOMFILE_DEPREC);
    }

    assert_quiet(
        "var f = Cc['@mozilla.org/file;1'].createInstance(Ci.nsIDOMFile);\nvar n = f.name;",
        notices::NSIDOMFILE_DEPREC.rule_id(),
    );
}

#[test]
fn removed_message_thread_method_raises_a_notice() {
    let code = |call: &str| {
        format!("var t = Cc['@mozilla.org/thread;1'].createInstance(Ci.nsIMsgThread);\nt.{call};")
    };

    assert_notice(&code("GetChildAt(0)"), &notices::MSG_THREAD_REMOVED);
    assert_quiet(&code("GetChildHdrAt(0)"), notices::MSG_THREAD_REMOVED.rule_id());
}

#[test]
fn removed_attachment_globals_raise_notices_when_called() {
    for global in [
        "createNewAttachmentInfo",
        "saveAttachment",
        "attachmentIsEmpty",
        "openAttachment",
        "detachAttachment",
        "cloneAttachment",
    ] {
        assert_notice(&format!("{global}(attachment);"), &notices::MAIL_ATTACHMENT_API);
        assert_quiet(
            &format!("var f = {global};"),
            notices::MAIL_ATTACHMENT_API.rule_id(),
        );
    }
}

#[test]
fn custom_addon_providers_raise_a_notice() {
    assert_notice(
        "AddonManagerPrivate.registerProvider(provider, types);",
        &notices::AMP_RP_BUG660359,
    );
    assert_quiet(
        "AddonManagerPrivate.callAddonListeners('onEnabled', addon);",
        notices::AMP_RP_BUG660359.rule_id(),
    );
}
