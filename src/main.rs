use dioxus::prelude::*;

mod api;
mod components;
mod db;
mod diagnostics;

use components::AppView;

fn main() {
    dioxus::launch(App);
}

#[component]
fn App() -> Element {
    rsx! {
        document::Title { "mediadesk" }
        document::Meta { name: "theme-color", content: "#09090b" }
        Router::<AppView> {}
    }
}
