use axum::extract::State;
use axum::response::Html;
use axum::Json;
use panel_core::registry::Registry;
use panel_core::ActionSummary;

use crate::state::AppState;

/// GET /: plain HTML page with one button per action.
pub async fn index(State(app): State<AppState>) -> Html<String> {
    Html(render(&app.panel.snapshot().registry))
}

/// GET /api/actions: every configured action, without webhook secrets.
pub async fn list_actions(State(app): State<AppState>) -> Json<Vec<ActionSummary>> {
    let snapshot = app.panel.snapshot();
    Json(snapshot.registry.actions().map(|a| a.summary()).collect())
}

fn render(registry: &Registry) -> String {
    let mut html = String::from(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Control panel</title></head>\
         <body style=\"font-family:sans-serif;padding:2rem\"><h1>Services</h1>",
    );

    for service in registry.services() {
        html.push_str(&format!("<h2>{}</h2>", escape_html(&service.name)));
        for action in service.actions.values() {
            html.push_str(&format!(
                "<form method=\"post\" action=\"/control\" style=\"display:inline\">\
                 <input type=\"hidden\" name=\"service\" value=\"{service}\">\
                 <input type=\"hidden\" name=\"action\" value=\"{action}\">\
                 <button type=\"submit\">{action}</button></form> ",
                service = escape_html(action.service()),
                action = escape_html(action.name()),
            ));
        }
    }

    let mut webhooks = registry.webhooks().peekable();
    if webhooks.peek().is_some() {
        html.push_str("<h1>Webhooks</h1><ul>");
        for (secret, action) in webhooks {
            html.push_str(&format!(
                "<li>{}: <code>/webhook/{}</code></li>",
                escape_html(action.identity()),
                escape_html(secret)
            ));
        }
        html.push_str("</ul>");
    }

    html.push_str("<p><a href=\"/reload\">Reload configuration</a></p></body></html>");
    html
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
