use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use dioxus::core::{Runtime, RuntimeGuard};
use dioxus::prelude::*;

use crate::api::*;
use crate::components::audio_manager::{
    candidates_from, missing_references, platform_backend, LinkedAudio, MediaSignal,
    PlatformBackend, PlaybackDescriptor, PlaybackErrorKind, PlaybackSessionManager,
    PlaybackStateChanged, SessionKey, SessionState, SharedOrigin, SignalSink, ToggleOutcome,
};
use crate::components::ordered_collection::{
    OrderedCollectionController, RefreshOutcome, ReorderError, ReorderEvent, ReorderOutcome,
};
use crate::components::{raise_notice, NoticeCenter, NoticeTone};
use crate::db::ConsoleSettings;

type Manager = Rc<RefCell<PlaybackSessionManager<PlatformBackend>>>;
type Controller = Rc<OrderedCollectionController<AdminClient>>;

#[derive(Debug, Clone, Copy, PartialEq)]
struct RowStatus {
    state: SessionState,
    error: Option<PlaybackErrorKind>,
}

/// Runs `f` after the current handler returns, inside the Dioxus runtime.
fn defer_signal_update<F>(runtime: Rc<Runtime>, f: F)
where
    F: FnOnce() + 'static,
{
    #[cfg(target_arch = "wasm32")]
    wasm_bindgen_futures::spawn_local(async move {
        gloo_timers::future::TimeoutFuture::new(0).await;
        let _guard = RuntimeGuard::new(runtime);
        f();
    });
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _guard = RuntimeGuard::new(runtime);
        spawn(async move {
            f();
        });
    }
}

/// Feeds backend signals back into the manager once it is no longer borrowed.
fn deferred_sink(
    runtime: Rc<Runtime>,
    slot: Rc<RefCell<Weak<RefCell<PlaybackSessionManager<PlatformBackend>>>>>,
) -> SignalSink {
    Rc::new(move |key: SessionKey, signal: MediaSignal| {
        let slot = slot.clone();
        defer_signal_update(runtime.clone(), move || {
            let manager = slot.borrow().upgrade();
            if let Some(manager) = manager {
                manager.borrow_mut().handle_signal(&key, signal);
            }
        });
    })
}

fn side_load_references(client: AdminClient, manager: Manager, missing: Vec<String>) {
    for id in missing {
        let client = client.clone();
        let manager = manager.clone();
        spawn(async move {
            match client.resolve_reference(&id).await {
                Ok(payload) => {
                    manager
                        .borrow_mut()
                        .extend_candidates([LinkedAudio::from_payload(&id, &payload)]);
                }
                Err(err) => tracing::warn!("[resources] could not resolve linked audio {id}: {err}"),
            }
        });
    }
}

fn status_label(status: Option<RowStatus>) -> &'static str {
    match status.map(|status| status.state) {
        Some(SessionState::Loading) => "Loading",
        Some(SessionState::Playing) => "Playing",
        Some(SessionState::Error) => "Error",
        _ => "",
    }
}

#[component]
pub fn ResourcesView() -> Element {
    let settings = use_context::<Signal<ConsoleSettings>>();
    let notices = use_context::<Signal<NoticeCenter>>();
    let origin = use_context::<SharedOrigin>();

    let records = use_signal(Vec::<ResourceRecord>::new);
    let is_pending = use_signal(|| false);
    let loading = use_signal(|| true);
    let row_status = use_signal(HashMap::<SessionKey, RowStatus>::new);
    let mut drag_source = use_signal(|| None::<String>);
    let mut filter = use_signal(|| settings.peek().default_filter.clone());
    let ttl = settings.peek().notice_ttl_secs;

    let client = use_hook(|| AdminClient::new(&settings.peek().api_base_url));

    let manager: Manager = use_hook(|| {
        let slot = Rc::new(RefCell::new(Weak::new()));
        let sink = deferred_sink(Runtime::current(), slot.clone());
        let manager = Rc::new(RefCell::new(PlaybackSessionManager::new(
            platform_backend(sink),
            Rc::new(origin.clone()),
        )));
        *slot.borrow_mut() = Rc::downgrade(&manager);

        manager.borrow_mut().on_state_changed(Rc::new(move |change: &PlaybackStateChanged| {
            let mut row_status = row_status;
            let status = RowStatus {
                state: change.state,
                error: change.error_kind,
            };
            row_status.with_mut(|rows| {
                rows.insert(change.key.clone(), status);
            });
        }));
        manager
    });

    let controller: Controller = use_hook(|| {
        let controller = Rc::new(OrderedCollectionController::new(
            client.clone(),
            filter.peek().clone(),
        ));
        let weak = Rc::downgrade(&controller);
        let client = client.clone();
        let manager = manager.clone();
        controller.on_event(move |event| {
            let (mut records, mut is_pending) = (records, is_pending);
            if let Some(controller) = weak.upgrade() {
                let view = controller.view();
                records.set(view.records);
                is_pending.set(view.is_pending);
            }
            match event {
                ReorderEvent::Failed(reason) => raise_notice(
                    notices,
                    format!("Failed to save order: {reason}"),
                    NoticeTone::Error,
                    ttl,
                ),
                ReorderEvent::Reloaded(list) => {
                    let missing = {
                        let mut manager = manager.borrow_mut();
                        let pruned = manager.prune(list);
                        if !pruned.is_empty() {
                            tracing::debug!("[resources] pruned {} sessions", pruned.len());
                        }
                        manager.set_candidates(candidates_from(list));
                        missing_references(list, manager.candidates())
                    };
                    side_load_references(client.clone(), manager.clone(), missing);
                }
                ReorderEvent::Pending(ids) => {
                    tracing::debug!("[resources] saving order of {} resources", ids.len());
                }
                ReorderEvent::Committed(ids) => {
                    tracing::debug!("[resources] order saved: {}", ids.join(","));
                }
            }
        });
        controller
    });

    let refresh = {
        let controller = controller.clone();
        move || {
            let (controller, mut loading) = (controller.clone(), loading);
            spawn(async move {
                loading.set(true);
                match controller.refresh().await {
                    Ok(RefreshOutcome::Reloaded(list)) => {
                        tracing::debug!("[resources] loaded {} resources", list.len());
                    }
                    Ok(RefreshOutcome::Deferred) => {
                        tracing::debug!("[resources] refresh deferred until the order is saved");
                    }
                    Err(err) => raise_notice(
                        notices,
                        format!("Failed to load resources: {err}"),
                        NoticeTone::Error,
                        ttl,
                    ),
                }
                loading.set(false);
            });
        }
    };

    use_hook({
        let refresh = refresh.clone();
        move || refresh()
    });

    use_drop({
        let manager = manager.clone();
        move || manager.borrow_mut().teardown()
    });

    let on_drop_row = {
        let controller = controller.clone();
        move |target_id: String| {
            let Some(dragged_id) = drag_source() else {
                return;
            };
            drag_source.set(None);
            let controller = controller.clone();
            spawn(async move {
                // Persistence failures arrive as `ReorderEvent::Failed`.
                match controller.commit_reorder(&dragged_id, &target_id).await {
                    Ok(ReorderOutcome::Committed(list)) => {
                        let slot = list.iter().position(|record| record.id == dragged_id);
                        tracing::debug!("[resources] {dragged_id} moved to slot {slot:?}");
                    }
                    Ok(ReorderOutcome::Queued) => {
                        tracing::debug!("[resources] drop of {dragged_id} queued");
                    }
                    Err(ReorderError::Validation(err)) => {
                        tracing::debug!("[resources] ignored drop: {err}");
                    }
                    Err(ReorderError::Persistence { reloaded, .. }) => {
                        if !reloaded {
                            tracing::warn!("[resources] showing the last confirmed order");
                        }
                    }
                }
            });
        }
    };

    let on_toggle = {
        let manager = manager.clone();
        let client = client.clone();
        move |record: ResourceRecord| {
            let Some(key) = SessionKey::for_record(&record) else {
                return;
            };
            let descriptor = PlaybackDescriptor::for_record(&record);
            let position = manager.borrow().handle_position(&key);
            let result = manager.borrow_mut().toggle(key.clone(), &descriptor);
            match result {
                Ok(ToggleOutcome::Started { probe }) => {
                    let manager = manager.clone();
                    let client = client.clone();
                    spawn(async move {
                        let reachable = client.probe(&probe.url).await;
                        manager.borrow_mut().report_probe(&probe, reachable);
                    });
                }
                Ok(ToggleOutcome::Stopped) => {
                    tracing::debug!("[resources] stopped {key} at {:.1}s", position.unwrap_or_default());
                }
                Err(err) => raise_notice(notices, err.to_string(), NoticeTone::Error, ttl),
            }
        }
    };

    let on_filter_kind = {
        let controller = controller.clone();
        let refresh = refresh.clone();
        move |evt: FormEvent| {
            let kind = match evt.value().as_str() {
                "image" => Some(ResourceKind::Image),
                "audio" => Some(ResourceKind::Audio),
                _ => None,
            };
            filter.with_mut(|filter| filter.kind = kind);
            controller.set_filter(filter.peek().clone());
            refresh();
        }
    };

    let on_filter_active = {
        let controller = controller.clone();
        let refresh = refresh.clone();
        move |evt: FormEvent| {
            filter.with_mut(|filter| filter.active_only = evt.checked());
            controller.set_filter(filter.peek().clone());
            refresh();
        }
    };

    let list = records();
    let statuses = row_status();
    let now_playing = manager.try_borrow().ok().and_then(|manager| {
        let key = manager.active_sessions().into_iter().next()?;
        manager.session(&key).map(|session| session.title.clone())
    });
    let kind_value = filter().kind.map(ResourceKind::as_query_value).unwrap_or("all");

    rsx! {
        section { class: "flex flex-col gap-4",
            div { class: "flex flex-wrap items-center justify-between gap-3",
                div { class: "flex items-center gap-3",
                    h1 { class: "text-xl font-semibold text-white", "Resources" }
                    if is_pending() {
                        span { class: "text-xs uppercase tracking-wider text-amber-300", "saving order…" }
                    }
                    if let Some(title) = now_playing {
                        span { class: "text-xs text-emerald-300 truncate max-w-xs", "♪ {title}" }
                    }
                }
                div { class: "flex items-center gap-3 text-sm",
                    select {
                        class: "bg-zinc-900 border border-zinc-700 rounded-lg px-2 py-1",
                        value: "{kind_value}",
                        onchange: on_filter_kind,
                        option { value: "all", "All kinds" }
                        option { value: "image", "Images" }
                        option { value: "audio", "Audio" }
                    }
                    label { class: "flex items-center gap-2 text-zinc-300",
                        input {
                            r#type: "checkbox",
                            checked: filter().active_only,
                            onchange: on_filter_active,
                        }
                        "Active only"
                    }
                    button {
                        class: "px-3 py-1 rounded-lg bg-zinc-800 hover:bg-zinc-700 text-zinc-200",
                        disabled: loading(),
                        onclick: {
                            let refresh = refresh.clone();
                            move |_| refresh()
                        },
                        "Refresh"
                    }
                }
            }

            if loading() && list.is_empty() {
                p { class: "text-zinc-500 text-sm", "Loading resources…" }
            } else if list.is_empty() {
                p { class: "text-zinc-500 text-sm", "No resources match this filter." }
            }

            div { class: "flex flex-col gap-2",
                for record in list {
                    {
                        let session_key = SessionKey::for_record(&record);
                        let status = session_key.as_ref().and_then(|key| statuses.get(key).copied());
                        let live = status.is_some_and(|status| status.state.is_live());
                        let error = status.and_then(|status| status.error).map(PlaybackErrorKind::message);
                        let playable = record.is_playable();
                        let row_class = if drag_source().as_deref() == Some(record.id.as_str()) {
                            "flex items-center gap-3 p-3 rounded-lg bg-emerald-500/12 border border-emerald-500/45 opacity-85 select-none"
                        } else {
                            "flex items-center gap-3 p-3 rounded-lg bg-zinc-900/60 border border-zinc-800 select-none"
                        };
                        let dragged_id = record.id.clone();
                        let target_id = record.id.clone();
                        let toggle_record = record.clone();
                        let mut on_drop_row = on_drop_row.clone();
                        let on_toggle = on_toggle.clone();
                        rsx! {
                            div {
                                key: "{record.id}",
                                class: "{row_class}",
                                draggable: true,
                                ondragstart: move |_| drag_source.set(Some(dragged_id.clone())),
                                ondragend: move |_| drag_source.set(None),
                                ondragover: move |evt| evt.prevent_default(),
                                ondrop: move |evt| {
                                    evt.prevent_default();
                                    on_drop_row(target_id.clone());
                                },
                                span { class: "text-zinc-600 cursor-grab", "⠿" }
                                span { class: "w-8 text-right text-xs text-zinc-500", "{record.order}" }
                                div { class: "flex-1 min-w-0",
                                    p { class: "text-sm text-white truncate", "{record.title}" }
                                    p { class: "text-xs text-zinc-500",
                                        "{record.kind.label()}"
                                        if !record.is_active {
                                            " · inactive"
                                        }
                                    }
                                    if let Some(error) = error {
                                        p { class: "text-xs text-red-300", "{error}" }
                                    }
                                }
                                span { class: "text-xs text-emerald-300", "{status_label(status)}" }
                                if playable {
                                    button {
                                        class: "px-3 py-1 rounded-lg bg-emerald-600/80 hover:bg-emerald-500 text-white text-sm",
                                        onclick: move |_| on_toggle(toggle_record.clone()),
                                        if live { "Stop" } else { "Play" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
