use dioxus::prelude::*;
use std::rc::Rc;

use crate::api::{ContactForm, PickedFile};
use crate::contact::{send_contact, ContactOutcome};
use crate::controller::ChatController;
use crate::conversation::Origin;
use crate::session::{stage_handoff, SearchOutcome, SessionStore, EMPTY_QUERY_NOTICE};
use crate::AppContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    Home,
    Chat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelVariant {
    FullPage,
    Popup,
}

impl PanelVariant {
    // each panel needs its own id so the attach label targets the right control
    fn file_input_id(self) -> &'static str {
        match self {
            PanelVariant::FullPage => "chat-file-input",
            PanelVariant::Popup => "popup-file-input",
        }
    }

    fn class(self) -> &'static str {
        match self {
            PanelVariant::FullPage => "chat-window",
            PanelVariant::Popup => "chat-window popup",
        }
    }
}

/* ================= CHAT PANEL ================= */

#[component]
pub fn ChatPanel(variant: PanelVariant, open: bool) -> Element {
    let app = use_context::<AppContext>();
    let revision = use_signal(|| 0_u64);

    // one controller per mounted panel, rebuilt on every page load
    let controller = use_hook(|| {
        let controller = Rc::new(ChatController::new(app.backend.clone(), app.timeout));
        // the request scope may release after the panel unmounted
        controller.set_on_change(move || {
            let mut revision = revision;
            if let Ok(mut value) = revision.try_write() {
                *value += 1;
            };
        });
        controller
    });

    use_hook(|| {
        if variant == PanelVariant::FullPage {
            let controller = controller.clone();
            let session = app.session.clone();
            spawn(async move {
                controller.start(&session).await;
            });
        }
    });

    let mut input_el = use_signal(|| Option::<Rc<MountedData>>::None);
    let mut anchor_el = use_signal(|| Option::<Rc<MountedData>>::None);
    let mut seen_focus = use_signal(|| 0_u64);
    let mut seen_tail = use_signal(|| 0_usize);
    let mut save_to_default = use_signal(|| false);

    // popup takes focus whenever it is opened
    {
        let controller = controller.clone();
        use_effect(use_reactive!(|(open,)| {
            if open && variant == PanelVariant::Popup {
                controller.request_focus();
            }
        }));
    }

    // apply focus requests and keep the newest entry in view
    {
        to_owned![controller];
        use_effect(move || {
            let _ = revision();
            let (focus, tail) = controller.with_state(|s| {
                (
                    s.focus_requests,
                    s.view.len() * 2 + usize::from(s.view.is_typing()),
                )
            });

            // requests made before the element mounted are applied once it does
            if focus != *seen_focus.peek() {
                if let Some(el) = input_el.cloned() {
                    seen_focus.set(focus);
                    spawn(async move {
                        if let Err(e) = el.set_focus(true).await {
                            tracing::debug!("Could not focus chat input: {e:?}");
                        }
                    });
                }
            }

            if tail != *seen_tail.peek() {
                if let Some(el) = anchor_el.cloned() {
                    seen_tail.set(tail);
                    spawn(async move {
                        if let Err(e) = el.scroll_to(ScrollBehavior::Smooth).await {
                            tracing::debug!("Could not scroll chat to the newest entry: {e:?}");
                        }
                    });
                }
            }
        });
    }

    let on_input = {
        to_owned![controller];
        move |e: FormEvent| controller.set_input(e.value())
    };

    let on_keydown = {
        to_owned![controller];
        move |e: KeyboardEvent| {
            if e.key() == Key::Enter {
                let controller = controller.clone();
                spawn(async move {
                    controller.submit_current_input().await;
                });
            }
        }
    };

    let on_send = {
        to_owned![controller];
        move |_| {
            let controller = controller.clone();
            spawn(async move {
                controller.submit_current_input().await;
            });
        }
    };

    let on_file = {
        to_owned![controller];
        move |evt: FormEvent| {
            let files = evt.files();
            let save = save_to_default();
            let controller = controller.clone();
            spawn(async move {
                let picked = match files.into_iter().next() {
                    Some(file) => {
                        let name = file.name();
                        match file.read_bytes().await {
                            Ok(bytes) => Some(PickedFile {
                                name,
                                bytes: bytes.to_vec(),
                            }),
                            Err(e) => {
                                tracing::error!("Failed to read {name}: {e}");
                                controller.reset_file_control();
                                return;
                            }
                        }
                    }
                    None => None,
                };
                controller.submit_file(picked, save).await;
            });
        }
    };

    let on_clear = {
        to_owned![controller];
        move |_| controller.request_clear_history()
    };

    let on_answer = {
        to_owned![controller];
        move |accepted: bool| {
            let controller = controller.clone();
            spawn(async move {
                controller.answer_clear_history(accepted).await;
            });
        }
    };

    let _ = revision();
    let state = controller.snapshot();
    let messages = controller.messages();

    rsx! {
        div { class: variant.class(),
            div { class: "chat-messages",
                for message in messages.iter() {
                    MessageBubble {
                        key: "{message.id}",
                        origin: message.origin,
                        text: message.text.clone()
                    }
                }

                if controller.typing_visible() {
                    div { class: "typing-indicator",
                        div { class: "typing-dot" }
                        div { class: "typing-dot" }
                        div { class: "typing-dot" }
                    }
                }

                div {
                    class: "scroll-anchor",
                    onmounted: move |e: MountedEvent| anchor_el.set(Some(e.data())),
                }
            }

            div { class: "chat-input-area",
                label {
                    class: "upload-btn",
                    r#for: variant.file_input_id(),
                    title: "Attach a file",
                    "📎"
                }
                // a fresh key recreates the control empty so the same file can be picked again
                {std::iter::once(state.file_control_epoch).map(|epoch| rsx! {
                    input {
                        key: "{epoch}",
                        id: variant.file_input_id(),
                        class: "file-input",
                        r#type: "file",
                        onchange: on_file.clone(),
                    }
                })}
                label { class: "save-default",
                    input {
                        r#type: "checkbox",
                        checked: save_to_default(),
                        onchange: move |e: FormEvent| save_to_default.set(e.checked()),
                    }
                    "Save to knowledge base"
                }

                input {
                    class: "chat-input",
                    placeholder: "Type your message...",
                    value: "{state.input}",
                    oninput: on_input,
                    onkeydown: on_keydown,
                    onmounted: move |e: MountedEvent| input_el.set(Some(e.data())),
                }

                button {
                    class: "send-button big",
                    disabled: !controller.send_enabled(),
                    onclick: on_send,
                    "➤ Send"
                }

                if variant == PanelVariant::FullPage {
                    button { class: "clear-btn", onclick: on_clear, "Clear history" }
                }
            }

            {state.confirm_prompt.map(|prompt| rsx! {
                ConfirmModal { prompt: prompt, on_answer: on_answer }
            })}
        }
    }
}

/* ================= MESSAGE ================= */

#[component]
fn MessageBubble(origin: Origin, text: String) -> Element {
    // text nodes are escaped by the renderer, markup is never interpreted
    rsx! {
        div { class: origin.css_class(),
            p { class: "dim-text", "{text}" }
        }
    }
}

/* ================= CONFIRM MODAL ================= */

#[component]
fn ConfirmModal(prompt: &'static str, on_answer: EventHandler<bool>) -> Element {
    rsx! {
        div { class: "settings-overlay",
            div { class: "settings-modal",
                p { "{prompt}" }
                div { class: "modal-actions",
                    button { class: "delete-all", onclick: move |_| on_answer.call(true), "Yes" }
                    button { onclick: move |_| on_answer.call(false), "Cancel" }
                }
            }
        }
    }
}

/* ================= LANDING PAGE ================= */

fn run_search(
    session: &SessionStore,
    query: &str,
    mut page: Signal<Page>,
    mut notice: Signal<Option<&'static str>>,
) {
    match stage_handoff(session, query) {
        Ok(SearchOutcome::Staged) => {
            notice.set(None);
            page.set(Page::Chat);
        }
        Ok(SearchOutcome::Empty) => notice.set(Some(EMPTY_QUERY_NOTICE)),
        Err(e) => tracing::error!("Failed to stage search query: {e}"),
    }
}

#[component]
pub fn LandingPage() -> Element {
    let app = use_context::<AppContext>();
    let page = use_context::<Signal<Page>>();
    let mut query = use_signal(String::new);
    let notice = use_signal(|| Option::<&'static str>::None);
    let mut popup_open = use_signal(|| false);

    let on_search = {
        let session = app.session.clone();
        move |_| run_search(&session, &query(), page, notice)
    };

    let on_search_key = {
        let session = app.session.clone();
        move |e: KeyboardEvent| {
            if e.key() == Key::Enter {
                run_search(&session, &query(), page, notice);
            }
        }
    };

    rsx! {
        div { class: "landing",
            section { class: "hero",
                h2 { "Ask Aura anything" }
                div { class: "search-row",
                    input {
                        class: "input search-input",
                        placeholder: "Type your question...",
                        value: "{query}",
                        oninput: move |e: FormEvent| query.set(e.value()),
                        onkeydown: on_search_key,
                    }
                    button { class: "send-button big", onclick: on_search, "Ask" }
                }
                {notice().map(|text| rsx! {
                    p { class: "dim-text warning-text", "{text}" }
                })}
            }

            ContactSection {}

            button {
                class: "chat-button",
                onclick: move |_| popup_open.set(!popup_open()),
                "💬"
            }

            div { class: if popup_open() { "chat-container active" } else { "chat-container" },
                div { class: "chat-header",
                    h2 { "Aura" }
                    button {
                        class: "chat-close",
                        onclick: move |_| popup_open.set(false),
                        "✕"
                    }
                }
                ChatPanel { variant: PanelVariant::Popup, open: popup_open() }
            }
        }
    }
}

/* ================= CONTACT ================= */

#[component]
fn ContactSection() -> Element {
    let app = use_context::<AppContext>();
    let mut name = use_signal(String::new);
    let mut email = use_signal(String::new);
    let mut message = use_signal(String::new);
    let mut notice = use_signal(|| Option::<String>::None);

    let on_submit = move |evt: FormEvent| {
        evt.prevent_default();
        let form = ContactForm {
            name: name(),
            email: email(),
            message: message(),
        };
        let backend = app.backend.clone();
        let timeout = app.timeout;

        spawn(async move {
            let outcome = send_contact(&backend, &form, timeout).await;
            if let ContactOutcome::Sent(_) = outcome {
                name.set(String::new());
                email.set(String::new());
                message.set(String::new());
            }
            notice.set(Some(outcome.notice().to_string()));
        });
    };

    rsx! {
        section { class: "contact",
            h3 { "Contact us" }
            form { onsubmit: on_submit,
                label { "Name" }
                input {
                    class: "input",
                    value: "{name}",
                    oninput: move |e: FormEvent| name.set(e.value()),
                }
                label { "Email" }
                input {
                    class: "input",
                    r#type: "email",
                    value: "{email}",
                    oninput: move |e: FormEvent| email.set(e.value()),
                }
                label { "Message" }
                textarea {
                    class: "textarea",
                    value: "{message}",
                    oninput: move |e: FormEvent| message.set(e.value()),
                }
                button { class: "send-button big", r#type: "submit", "Send" }
            }
            {notice().map(|text| rsx! {
                p { class: "dim-text", "{text}" }
            })}
        }
    }
}

/* ================= CHAT PAGE ================= */

#[component]
pub fn ChatPage() -> Element {
    rsx! {
        div { class: "chat-page",
            div { class: "chat-header",
                h2 { "Aura" }
                p { class: "model-indicator", "Ask about our products and services" }
            }
            ChatPanel { variant: PanelVariant::FullPage, open: true }
        }
    }
}
