//! XPCOM interface descriptors, instantiated through `createInstance`,
//! `getService` and friends.

use indexmap::IndexMap;

use super::Entity;
use crate::javascript::calls::{self, notices};
use crate::javascript::predicates::{self, bootstrap_cleanup};

/// Interfaces exposed under `Components.interfaces`.
pub(super) const NAMES: &[&str] = &[
    "nsIAccessibleRetrieval",
    "nsICategoryManager",
    "nsIComponentRegistrar",
    "nsIDOMFile",
    "nsIJSON",
    "nsIImapMailFolderSink",
    "nsIImapProtocol",
    "nsIMsgSearchScopeTerm",
    "nsIMsgThread",
    "nsIObserverService",
    "nsIResProtocolHandler",
    "nsIStringBundleService",
    "nsIStyleSheetService",
    "nsIWindowMediator",
    "nsIWindowWatcher",
];

fn notice_methods(methods: &[&str], notice: &'static calls::CompatNotice) -> Entity {
    methods.iter().fold(Entity::new(), |entity, method| {
        entity.member(method, Entity::new().returns_hook(calls::compat_notice(notice)))
    })
}

fn cleanup(message: &'static str) -> Entity {
    Entity::new().dangerous_when(bootstrap_cleanup(message))
}

pub(super) fn table() -> IndexMap<&'static str, Entity> {
    IndexMap::from([
        (
            "nsICategoryManager",
            Entity::new().member(
                "addCategoryEntry",
                Entity::new().dangerous_when(predicates::category_entry),
            ),
        ),
        (
            "nsIAccessibleRetrieval",
            Entity::new().dangerous_message(
                "Using the nsIAccessibleRetrieval interface causes significant \
                 performance degradation in Firefox. It should only be used in \
                 accessibility-related add-ons.",
            ),
        ),
        (
            "nsIComponentRegistrar",
            Entity::new()
                .member(
                    "autoRegister",
                    cleanup("Bootstrapped add-ons may not register chrome manifest files"),
                )
                .member(
                    "registerFactory",
                    cleanup(
                        "Authors of bootstrapped add-ons must take care to cleanup any \
                         component registrations at shutdown",
                    ),
                ),
        ),
        (
            "nsIDOMFile",
            notice_methods(
                &["getAsBinary", "getAsDataURL", "getAsText"],
                &notices::NSIDOMFILE_DEPREC,
            ),
        ),
        (
            "nsIJSON",
            notice_methods(&["encode", "decode"], &notices::NSIJSON_DEPREC),
        ),
        (
            "nsIImapMailFolderSink",
            notice_methods(&["setUrlState"], &notices::IMAP_MAIL_FOLDER_SINK_CHANGED),
        ),
        (
            "nsIImapProtocol",
            notice_methods(&["NotifyHdrsToDownload"], &notices::IMAP_PROTOCOL_REMOVED),
        ),
        (
            "nsIMsgSearchScopeTerm",
            notice_methods(
                &["mailFile", "inputStream"],
                &notices::MSG_SEARCH_SCOPE_TERM_REMOVED,
            ),
        ),
        (
            "nsIMsgThread",
            notice_methods(&["GetChildAt"], &notices::MSG_THREAD_REMOVED),
        ),
        (
            "nsIObserverService",
            Entity::new().member(
                "addObserver",
                cleanup(
                    "Authors of bootstrapped add-ons must take care to remove any \
                     added observers at shutdown",
                ),
            ),
        ),
        (
            "nsIResProtocolHandler",
            Entity::new().member(
                "setSubstitution",
                Entity::new().dangerous_when(predicates::res_substitution),
            ),
        ),
        (
            "nsIStringBundleService",
            Entity::new()
                .member(
                    "createStringBundle",
                    cleanup(
                        "Authors of bootstrapped add-ons must take care to flush the \
                         string bundle cache at shutdown",
                    ),
                )
                .member(
                    "createExtensibleBundle",
                    cleanup(
                        "Authors of bootstrapped add-ons must take care to flush the \
                         string bundle cache at shutdown",
                    ),
                ),
        ),
        (
            "nsIStyleSheetService",
            Entity::new().member(
                "loadAndRegisterSheet",
                cleanup(
                    "Authors of bootstrapped add-ons must take care to unregister any \
                     registered stylesheets at shutdown",
                ),
            ),
        ),
        (
            "nsIWindowMediator",
            Entity::new().member(
                "registerNotification",
                cleanup(
                    "Authors of bootstrapped add-ons must take care to remove any \
                     added observers at shutdown",
                ),
            ),
        ),
        (
            "nsIWindowWatcher",
            Entity::new().member(
                "addListener",
                cleanup(
                    "Authors of bootstrapped add-ons must take care to remove any \
                     added observers at shutdown",
                ),
            ),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_exposed_name_has_a_descriptor() {
        let table = table();

        for name in NAMES {
            assert!(table.contains_key(name), "missing descriptor for {name}");
        }
    }
}
