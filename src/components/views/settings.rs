use dioxus::prelude::*;

use crate::components::{raise_notice, NoticeCenter, NoticeTone};
use crate::db::{save_settings, ConsoleSettings};

#[component]
pub fn SettingsView() -> Element {
    let mut settings = use_context::<Signal<ConsoleSettings>>();
    let notices = use_context::<Signal<NoticeCenter>>();

    let current = settings.peek().clone();
    let mut api_base_url = use_signal(|| current.api_base_url.clone());
    let mut origin_override = use_signal(|| current.origin_override.clone().unwrap_or_default());
    let mut notice_ttl = use_signal(|| current.notice_ttl_secs.to_string());

    let on_save = move |_| {
        let url = api_base_url().trim().trim_end_matches('/').to_string();
        if url.is_empty() {
            return;
        }
        let origin = origin_override().trim().to_string();
        let mut next = settings();
        next.api_base_url = url;
        next.origin_override = (!origin.is_empty()).then_some(origin);
        next.notice_ttl_secs = notice_ttl().trim().parse().unwrap_or(next.notice_ttl_secs).max(1);
        settings.set(next.clone());

        let ttl = next.notice_ttl_secs;
        spawn(async move {
            match save_settings(next).await {
                Ok(()) => raise_notice(notices, "Settings saved", NoticeTone::Info, ttl),
                Err(err) => raise_notice(
                    notices,
                    format!("Failed to save settings: {err}"),
                    NoticeTone::Error,
                    ttl,
                ),
            }
        });
    };

    rsx! {
        section { class: "flex flex-col gap-4 max-w-xl",
            h1 { class: "text-xl font-semibold text-white", "Settings" }
            label { class: "flex flex-col gap-1 text-sm text-zinc-300",
                "Admin API base URL"
                input {
                    class: "bg-zinc-900 border border-zinc-700 rounded-lg px-3 py-2 text-white",
                    value: "{api_base_url}",
                    oninput: move |evt| api_base_url.set(evt.value()),
                }
            }
            label { class: "flex flex-col gap-1 text-sm text-zinc-300",
                "Media origin override"
                input {
                    class: "bg-zinc-900 border border-zinc-700 rounded-lg px-3 py-2 text-white",
                    placeholder: "Leave empty to use the page origin",
                    value: "{origin_override}",
                    oninput: move |evt| origin_override.set(evt.value()),
                }
            }
            label { class: "flex flex-col gap-1 text-sm text-zinc-300",
                "Notice duration (seconds)"
                input {
                    class: "bg-zinc-900 border border-zinc-700 rounded-lg px-3 py-2 text-white w-24",
                    r#type: "number",
                    min: "1",
                    value: "{notice_ttl}",
                    oninput: move |evt| notice_ttl.set(evt.value()),
                }
            }
            button {
                class: "self-start px-4 py-2 rounded-lg bg-emerald-600 hover:bg-emerald-500 text-white text-sm",
                onclick: on_save,
                "Save"
            }
        }
    }
}
