use dioxus::prelude::*;
use std::time::Duration;

mod api;
mod contact;
mod controller;
mod conversation;
mod error;
mod logging;
mod session;
mod settings;
mod ui;

use crate::api::HttpBackend;
use crate::error::ClientResult;
use crate::session::SessionStore;
use crate::settings::Settings;
use crate::ui::{ChatPage, LandingPage, Page};

const MAIN_CSS: Asset = asset!("/assets/main.css");

/// Shared by every page of one app session.
#[derive(Clone)]
pub struct AppContext {
    pub backend: HttpBackend,
    pub session: SessionStore,
    pub timeout: Option<Duration>,
}

impl AppContext {
    fn init() -> ClientResult<Self> {
        let settings = Settings::load()?;
        Ok(Self {
            backend: HttpBackend::new(&settings)?,
            session: SessionStore::open()?,
            timeout: settings.request_timeout(),
        })
    }
}

fn main() {
    logging::configure_logging();

    let context = match AppContext::init() {
        Ok(context) => context,
        Err(e) => {
            tracing::error!("Failed to start: {e}");
            std::process::exit(1);
        }
    };

    dioxus::LaunchBuilder::new().with_context(context).launch(App);
}

/* ================= APP ================= */

#[component]
fn App() -> Element {
    let mut page = use_context_provider(|| Signal::new(Page::Home));

    let nav_class = move |target: Page| {
        if page() == target {
            "nav-btn active"
        } else {
            "nav-btn"
        }
    };

    rsx! {
        document::Link { rel: "stylesheet", href: MAIN_CSS }

        div { class: "outer-wrapper",
            header { class: "site-header",
                h1 { class: "logo", "Aura" }
                nav { class: "nav",
                    button {
                        class: nav_class(Page::Home),
                        onclick: move |_| page.set(Page::Home),
                        "Home"
                    }
                    button {
                        class: nav_class(Page::Chat),
                        onclick: move |_| page.set(Page::Chat),
                        "Chat"
                    }
                }
            }

            {match page() {
                Page::Home => rsx! { LandingPage {} },
                Page::Chat => rsx! { ChatPage {} },
            }}
        }
    }
}
