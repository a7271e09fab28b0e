use chrono::{DateTime, Utc};
use dioxus::prelude::*;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeTone {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub id: Uuid,
    pub message: String,
    pub tone: NoticeTone,
    pub raised_at: DateTime<Utc>,
}

/// Transient messages shown above the list. Repeats of the newest message are collapsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoticeCenter {
    notices: Vec<Notice>,
}

const MAX_NOTICES: usize = 4;

impl NoticeCenter {
    pub fn push(&mut self, message: impl Into<String>, tone: NoticeTone) -> Option<Uuid> {
        let message = message.into();
        if self
            .notices
            .last()
            .is_some_and(|last| last.message == message && last.tone == tone)
        {
            return None;
        }
        let notice = Notice {
            id: Uuid::new_v4(),
            message,
            tone,
            raised_at: Utc::now(),
        };
        let id = notice.id;
        self.notices.push(notice);
        if self.notices.len() > MAX_NOTICES {
            self.notices.remove(0);
        }
        Some(id)
    }

    pub fn dismiss(&mut self, id: Uuid) {
        self.notices.retain(|notice| notice.id != id);
    }

    /// Drops notices raised more than `ttl_secs` before `now`.
    pub fn expire(&mut self, now: DateTime<Utc>, ttl_secs: u32) {
        let ttl = chrono::Duration::seconds(i64::from(ttl_secs));
        self.notices.retain(|notice| now - notice.raised_at < ttl);
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }
}

#[cfg(not(target_arch = "wasm32"))]
async fn notice_delay_ms(ms: u64) {
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
}

#[cfg(target_arch = "wasm32")]
async fn notice_delay_ms(ms: u64) {
    gloo_timers::future::TimeoutFuture::new(ms as u32).await;
}

/// Raises a notice and schedules its dismissal.
pub fn raise_notice(mut center: Signal<NoticeCenter>, message: impl Into<String>, tone: NoticeTone, ttl_secs: u32) {
    let Some(id) = center.with_mut(|center| center.push(message, tone)) else {
        return;
    };
    spawn(async move {
        notice_delay_ms(u64::from(ttl_secs) * 1000).await;
        center.with_mut(|center| {
            center.dismiss(id);
            center.expire(Utc::now(), ttl_secs);
        });
    });
}

#[component]
pub fn NoticeTray() -> Element {
    let mut center = use_context::<Signal<NoticeCenter>>();
    let notices = center.read().notices().to_vec();

    rsx! {
        div { class: "fixed bottom-4 right-4 z-50 flex flex-col gap-2 max-w-sm",
            for notice in notices {
                div {
                    key: "{notice.id}",
                    class: match notice.tone {
                        NoticeTone::Info => "rounded-lg border border-emerald-500/40 bg-emerald-500/10 px-4 py-3 text-sm text-emerald-200",
                        NoticeTone::Error => "rounded-lg border border-red-500/40 bg-red-500/10 px-4 py-3 text-sm text-red-200",
                    },
                    div { class: "flex items-start justify-between gap-3",
                        span { "{notice.message}" }
                        button {
                            class: "text-xs text-zinc-400 hover:text-white",
                            onclick: move |_| center.with_mut(|center| center.dismiss(notice.id)),
                            "Dismiss"
                        }
                    }
                }
            }
        }
    }
}
