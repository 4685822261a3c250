//! HTML pages served to people going through verification

use crate::logging::LogEntry;

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn layout(title: &str, gradient: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            min-height: 100vh;
            margin: 0;
            background: {gradient};
        }}
        .container {{
            background: white;
            padding: 40px;
            border-radius: 16px;
            box-shadow: 0 10px 40px rgba(0,0,0,0.2);
            text-align: center;
            max-width: 520px;
        }}
        .icon {{
            font-size: 60px;
            margin-bottom: 20px;
        }}
        .note {{
            color: #888;
            font-size: 14px;
        }}
        .message {{
            background: #fff5f5;
            padding: 15px;
            border-radius: 8px;
            color: #c53030;
            margin: 20px 0;
        }}
        .logs {{
            text-align: left;
            font-family: monospace;
            font-size: 11px;
            background: #f5f5f5;
            padding: 10px;
            border-radius: 8px;
            max-height: 240px;
            overflow-y: auto;
        }}
    </style>
</head>
<body>
    <div class="container">
{body}
    </div>
</body>
</html>"#,
        title = title,
        gradient = gradient,
        body = body
    )
}

/// Landing page at `/`
pub fn status_page(verified_count: usize, recent_logs: &[LogEntry]) -> String {
    let logs = recent_logs
        .iter()
        .map(|entry| format!("<div>{}</div>", escape_html(&entry.format())))
        .collect::<Vec<_>>()
        .join("\n");

    let body = format!(
        r#"        <div class="icon">🛡️</div>
        <h1>Verification System</h1>
        <p style="color: #11998e; font-weight: bold;">ONLINE</p>
        <p class="note">{verified_count} verifications on record</p>
        <div class="logs">{logs}</div>"#,
        verified_count = verified_count,
        logs = logs
    );

    layout(
        "Verification System",
        "linear-gradient(135deg, #1a1a2e 0%, #16213e 100%)",
        &body,
    )
}

pub fn success_page(username: &str, role_granted: bool) -> String {
    let role_line = if role_granted {
        "Verified role assigned!"
    } else {
        "Your verification was recorded. The role will be applied shortly."
    };

    let body = format!(
        r#"        <div class="icon">✓</div>
        <h1 style="color: #11998e;">Verification Complete!</h1>
        <p>Welcome, <strong>{username}</strong>!</p>
        <p>{role_line}</p>
        <p class="note">You can close this window now.</p>"#,
        username = escape_html(username),
        role_line = role_line
    );

    layout(
        "Verification Complete",
        "linear-gradient(135deg, #11998e 0%, #38ef7d 100%)",
        &body,
    )
}

pub fn error_page(message: &str) -> String {
    let body = format!(
        r#"        <div class="icon">✕</div>
        <h1 style="color: #f5576c;">Verification Failed</h1>
        <div class="message">{message}</div>
        <p class="note">Please try again or contact an administrator.</p>"#,
        message = escape_html(message)
    );

    layout(
        "Verification Error",
        "linear-gradient(135deg, #f093fb 0%, #f5576c 100%)",
        &body,
    )
}
