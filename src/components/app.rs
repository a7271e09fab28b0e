use crate::components::audio_manager::SharedOrigin;
use crate::components::{view_label, AppView, NoticeCenter, NoticeTray};
use crate::db::{initialize_database, load_settings, ConsoleSettings};
use dioxus::prelude::*;

#[component]
pub fn AppShell() -> Element {
    let mut settings = use_signal(ConsoleSettings::default);
    let notices = use_signal(NoticeCenter::default);
    let mut settings_loaded = use_signal(|| false);
    let origin = use_hook(SharedOrigin::default);

    use_context_provider(|| settings);
    use_context_provider(|| notices);
    use_context_provider(|| origin.clone());

    // Load saved settings on mount
    use_effect(move || {
        spawn(async move {
            if let Err(err) = initialize_database().await {
                tracing::warn!("[settings] failed to initialize database: {err}");
            }
            match load_settings().await {
                Ok(saved) => settings.set(saved),
                Err(err) => tracing::warn!("[settings] using defaults: {err}"),
            }
            settings_loaded.set(true);
        });
    });

    // Relative media URLs follow the configured origin
    use_effect({
        let origin = origin.clone();
        move || {
            let media_origin = settings().media_origin().unwrap_or_default();
            origin.set(media_origin);
        }
    });

    let view = use_route::<AppView>();

    rsx! {
        div { class: "app-container min-h-screen bg-zinc-950 text-white",
            header { class: "border-b border-zinc-800/60 bg-zinc-950/80 backdrop-blur-xl",
                div { class: "flex items-center justify-between px-6 py-3",
                    div { class: "flex flex-col",
                        span { class: "text-xs uppercase tracking-widest text-zinc-500", "mediadesk" }
                        span { class: "text-sm font-semibold text-white", "{view_label(&view)}" }
                    }
                    nav { class: "flex items-center gap-4 text-sm text-zinc-300",
                        Link { to: AppView::ResourcesView {}, "Resources" }
                        Link { to: AppView::SettingsView {}, "Settings" }
                    }
                }
            }

            main { class: "px-6 py-6",
                if settings_loaded() {
                    Outlet::<AppView> {}
                } else {
                    p { class: "text-sm text-zinc-500", "Loading settings…" }
                }
            }

            NoticeTray {}
        }
    }
}
