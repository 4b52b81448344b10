//! Destination normalization and welcome text rendering.

/// Keep ASCII digits only. `"+55 (11) 98765-4321"` becomes `"5511987654321"`.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Body sent in text mode.
pub fn render_fallback_text(name: &str, group_link: Option<&str>) -> String {
    let name = name.trim();
    let greeting = if name.is_empty() {
        "Olá!".to_string()
    } else {
        format!("Olá {}!", name)
    };

    match group_link.map(str::trim).filter(|l| !l.is_empty()) {
        Some(link) => format!(
            "{} Seja muito bem-vindo(a) à nossa igreja. Entre no nosso grupo: {}",
            greeting, link
        ),
        None => format!(
            "{} Seja muito bem-vindo(a) à nossa igreja. Em breve entraremos em contato.",
            greeting
        ),
    }
}
