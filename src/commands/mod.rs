//! Command surface.
//!
//! Every console operation is a named command taking up to two loose JSON
//! arguments (`arg0`, `arg1`) and answering `Result<Value, String>`. The
//! host sends the name over the bridge; `invoke` routes it.

use serde_json::{json, Value};

use crate::error::AdminError;
use crate::events::EVENT_SESSION_EXPIRED;
use crate::AppState;

pub mod assets;
pub mod auth;
pub mod dashboard;
pub mod diagnostics;
pub mod menu;
pub mod orders;
pub mod push;
pub mod resources;
pub mod runtime;
pub mod settings;

/// Commands that only read or edit local view state. The bridge runs these
/// in receipt order rather than concurrently.
const INLINE_COMMANDS: &[&str] = &[
    "auth_get_session",
    "orders_get_page",
    "orders_set_query",
    "orders_sort_by",
    "orders_set_page",
    "orders_get_statuses",
    "home_layout_move",
    "restaurant_menu_get",
    "notifications_get_prefs",
    "notifications_set_sound",
    "notifications_set_permission",
    "toasts_list",
    "toast_dismiss",
    "live_get_status",
];

pub fn runs_inline(cmd: &str) -> bool {
    INLINE_COMMANDS.contains(&cmd)
}

/// Turn an error into the command's error string. Auth failures also tell
/// the host to route to login.
pub(crate) fn command_error(state: &AppState, err: AdminError) -> String {
    if err.is_auth_failure() {
        state
            .emitter
            .emit(EVENT_SESSION_EXPIRED, json!({ "reason": err.to_string() }));
    }
    err.to_string()
}

/// Like [`command_error`], but also raises an error toast unless the
/// failure is a form validation problem (those are shown inline).
pub(crate) fn toast_error(state: &AppState, context: &str, err: AdminError) -> String {
    if !matches!(err, AdminError::Validation(_)) {
        state.toasts.error(format!("{context}: {err}"));
    }
    command_error(state, err)
}

/// Route guard for commands that need a signed-in admin.
pub(crate) fn require_session(state: &AppState) -> Result<(), String> {
    crate::auth::require_session(state.tokens().as_ref())
        .map(|_| ())
        .map_err(|e| command_error(state, e))
}

pub async fn invoke(
    state: &AppState,
    cmd: &str,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    match cmd {
        // Auth
        "auth_login" => auth::auth_login(state, arg0, arg1).await,
        "auth_logout" => auth::auth_logout(state).await,
        "auth_get_session" => auth::auth_get_session(state),
        "auth_require_session" => auth::auth_require_session(state),
        // Orders
        "orders_mount" => orders::orders_mount(state),
        "orders_unmount" => orders::orders_unmount(state).await,
        "orders_refresh" => orders::orders_refresh(state).await,
        "orders_get_page" => orders::orders_get_page(state),
        "orders_set_query" => orders::orders_set_query(state, arg0, arg1),
        "orders_sort_by" => orders::orders_sort_by(state, arg0),
        "orders_set_page" => orders::orders_set_page(state, arg0),
        "orders_get_statuses" => orders::orders_get_statuses(),
        "order_update_status" => orders::order_update_status(state, arg0, arg1).await,
        "orders_user_history" => orders::orders_user_history(state, arg0, arg1).await,
        "orders_restaurant_history" => {
            orders::orders_restaurant_history(state, arg0, arg1).await
        }
        // Dashboard
        "dashboard_get" => dashboard::dashboard_get(state).await,
        // Resources
        "resource_list" => resources::resource_list(state, arg0).await,
        "resource_create" => resources::resource_create(state, arg0, arg1).await,
        "resource_update" => resources::resource_update(state, arg0, arg1).await,
        "resource_toggle_status" => resources::resource_toggle_status(state, arg0, arg1).await,
        "resource_delete" => resources::resource_delete(state, arg0, arg1).await,
        "home_layout_load" => resources::home_layout_load(state).await,
        "home_layout_move" => resources::home_layout_move(state, arg0, arg1),
        "home_layout_commit" => resources::home_layout_commit(state).await,
        "home_layout_toggle_section" => {
            resources::home_layout_toggle_section(state, arg0, arg1).await
        }
        // Restaurant menu
        "restaurant_menu_load" => menu::restaurant_menu_load(state, arg0).await,
        "restaurant_menu_get" => menu::restaurant_menu_get(state),
        "restaurant_menu_mount" => menu::restaurant_menu_mount(state),
        "restaurant_menu_unmount" => menu::restaurant_menu_unmount(state),
        // Notifications, toasts, local settings
        "notifications_get_prefs" => settings::notifications_get_prefs(state),
        "notifications_set_sound" => settings::notifications_set_sound(state, arg0),
        "notifications_set_permission" => settings::notifications_set_permission(state, arg0),
        "toasts_list" => settings::toasts_list(state),
        "toast_dismiss" => settings::toast_dismiss(state, arg0),
        "settings_get_local" => settings::settings_get_local(state),
        "settings_set_local" => settings::settings_set_local(state, arg0, arg1),
        "settings_delete_local" => settings::settings_delete_local(state, arg0),
        // Push
        "push_get_status" => push::push_get_status(state),
        "push_subscribe" => push::push_subscribe(state, arg0).await,
        // Offline assets
        "assets_install" => assets::assets_install(state, arg0).await,
        "assets_activate" => assets::assets_activate(state),
        "assets_serve" => assets::assets_serve(state, arg0, arg1).await,
        // Live channel
        "live_start" => runtime::live_start(state),
        "live_stop" => runtime::live_stop(state).await,
        "live_get_status" => runtime::live_get_status(state),
        // Diagnostics
        "diagnostics_get_about" => diagnostics::diagnostics_get_about(),
        "diagnostics_get_health" => diagnostics::diagnostics_get_health(state),
        other => Err(format!("Unknown command: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TokenStore;
    use crate::test_support::state_with_token;

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let (state, _) = state_with_token(None);
        let err = invoke(&state, "orders_delete_everything", None, None)
            .await
            .unwrap_err();
        assert_eq!(err, "Unknown command: orders_delete_everything");
    }

    #[tokio::test]
    async fn guarded_commands_expire_the_session() {
        let (state, emitter) = state_with_token(None);
        let err = invoke(&state, "orders_mount", None, None).await.unwrap_err();
        assert_eq!(err, AdminError::Unauthorized.to_string());
        assert_eq!(emitter.names(), vec![EVENT_SESSION_EXPIRED]);
        assert!(!state.board_mounted());
    }

    #[test]
    fn only_local_view_commands_run_inline() {
        assert!(runs_inline("orders_set_page"));
        assert!(runs_inline("orders_set_query"));
        assert!(!runs_inline("orders_refresh"));
        assert!(!runs_inline("order_update_status"));
        assert!(!runs_inline("no_such_command"));
    }

    #[test]
    fn forbidden_keeps_the_session() {
        let (state, emitter) = state_with_token(Some("tok"));
        let msg = command_error(
            &state,
            AdminError::Http {
                status: 403,
                message: "Not allowed for this admin account".into(),
            },
        );
        assert_eq!(msg, "Not allowed for this admin account (HTTP 403)");
        assert!(emitter.names().is_empty());
        assert!(require_session(&state).is_ok());
        assert_eq!(state.tokens().load().as_deref(), Some("tok"));
    }

    #[test]
    fn validation_errors_do_not_toast() {
        let (state, emitter) = state_with_token(None);
        let msg = toast_error(&state, "Save", AdminError::Validation("Please fill in: name".into()));
        assert_eq!(msg, "Please fill in: name");
        assert!(emitter.names().is_empty());

        toast_error(&state, "Save", AdminError::Timeout("x".into()));
        assert_eq!(emitter.names(), vec!["toast"]);
    }
}
