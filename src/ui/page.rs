//! The single chat page.

use crate::config::PersonaConfig;
use crate::controller::ExchangeNotice;
use crate::session::{DisplayEntry, DisplayRole};

use super::markdown::{escape_html, render_markdown};

/// Everything needed to render one view of the chat page.
#[derive(Debug)]
pub struct ChatPage<'a> {
    pub persona: &'a PersonaConfig,
    pub messages: &'a [DisplayEntry],
    /// Failure annotation for the exchange that produced this view.
    pub notice: Option<&'a ExchangeNotice>,
}

impl ChatPage<'_> {
    /// Render the full HTML document.
    #[must_use]
    pub fn render(&self) -> String {
        let mut content = String::new();
        content.push_str(r#"<section id="messages" class="messages" aria-live="polite" aria-label="Chat messages">"#);
        for entry in self.messages {
            content.push_str(&message_bubble(entry));
        }
        if let Some(notice) = self.notice {
            content.push_str(&notice_block(notice));
        }
        content.push_str("</section>");
        content.push_str(&input_form(self.persona));

        html_shell(self.persona, &content)
    }
}

fn message_bubble(entry: &DisplayEntry) -> String {
    let (class, label, body) = match entry.role {
        DisplayRole::User => (
            "message user",
            "You",
            format!("<p>{}</p>", escape_html(&entry.text)),
        ),
        DisplayRole::Assistant => ("message assistant", "Assistant", render_markdown(&entry.text)),
    };

    format!(
        r#"<article class="{class}" data-role="{role}"><header>{label}</header><div class="body">{body}</div></article>"#,
        role = entry.role.as_str()
    )
}

fn notice_block(notice: &ExchangeNotice) -> String {
    format!(
        r#"<div class="notice" role="alert" data-kind="{kind}"><p>{message}</p><p class="hint">{hint}</p></div>"#,
        kind = notice.kind,
        message = escape_html(&notice.message),
        hint = escape_html(notice.hint),
    )
}

fn input_form(persona: &PersonaConfig) -> String {
    format!(
        r#"<form id="chat-form" class="composer" method="post" action="/">
    <input type="text" name="message" autocomplete="off" autofocus required placeholder="{placeholder}">
    <button type="submit">Send</button>
</form>
<p id="busy" class="busy" hidden>{busy}</p>"#,
        placeholder = escape_html(&persona.placeholder),
        busy = escape_html(&persona.busy_label),
    )
}

/// Generate the HTML shell for the page.
fn html_shell(persona: &PersonaConfig, content: &str) -> String {
    let title = escape_html(&persona.title);
    let intro = escape_html(&persona.intro);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; margin: 0; background: #f5f5f4; color: #1c1917; }}
        main {{ max-width: 48rem; margin: 0 auto; padding: 1.5rem 1rem 6rem; }}
        h1 {{ font-size: 1.5rem; margin: 0 0 .25rem; }}
        .intro {{ color: #57534e; margin: 0 0 1.5rem; }}
        .messages {{ display: flex; flex-direction: column; gap: .75rem; }}
        .message {{ padding: .75rem 1rem; border-radius: 1rem; background: #fff; box-shadow: 0 1px 2px rgba(0,0,0,.06); }}
        .message.user {{ align-self: flex-end; background: #dbeafe; }}
        .message header {{ font-size: .75rem; font-weight: 600; color: #78716c; margin-bottom: .25rem; }}
        .message .body > :first-child {{ margin-top: 0; }}
        .message .body > :last-child {{ margin-bottom: 0; }}
        .notice {{ padding: .75rem 1rem; border-radius: 1rem; background: #fee2e2; color: #991b1b; }}
        .notice .hint {{ font-size: .875rem; margin-bottom: 0; }}
        .composer {{ position: fixed; bottom: 0; left: 0; right: 0; display: flex; gap: .5rem; padding: 1rem; background: #fafaf9; border-top: 1px solid #e7e5e4; }}
        .composer input {{ flex: 1; padding: .75rem 1rem; border-radius: .75rem; border: 1px solid #d6d3d1; font-size: 1rem; }}
        .composer button {{ padding: .75rem 1.25rem; border-radius: .75rem; border: 0; background: #2563eb; color: #fff; font-size: 1rem; }}
        .composer button:disabled {{ opacity: .5; }}
        .busy {{ position: fixed; bottom: 4.5rem; left: 0; right: 0; text-align: center; color: #57534e; }}
    </style>
</head>
<body>
    <main>
        <h1>{title}</h1>
        <p class="intro">{intro}</p>
        {content}
    </main>
    <script>
        window.scrollTo(0, document.body.scrollHeight);
        document.getElementById("chat-form").addEventListener("submit", function (event) {{
            var input = this.querySelector("input[name=message]");
            if (!input.value.trim()) {{ event.preventDefault(); return; }}
            this.querySelector("button").disabled = true;
            input.readOnly = true;
            document.getElementById("busy").hidden = false;
        }});
    </script>
</body>
</html>"#
    )
}
