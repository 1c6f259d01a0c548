//! Small text helpers: filename sanitization, greetings, and elapsed
//! time rendering for user-facing messages.

/// Strip accents and non-filename characters, producing a string safe
/// to embed in artifact filenames.
///
/// Accented Latin letters fold to their base letter (Portuguese input:
/// `ã`, `ç`, `é`, ...); anything outside `[A-Za-z0-9 ._-]` is dropped,
/// and runs of whitespace collapse to a single underscore.
pub fn format_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;

    for ch in input.chars().map(fold_accent) {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            if pending_space {
                out.push('_');
                pending_space = false;
            }
            out.push(ch);
        }
    }

    out
}

fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}

/// Time-of-day greeting for notification messages, from a 0-23 hour.
pub fn saudacao(hour: u32) -> &'static str {
    match hour {
        0..=11 => "Bom dia",
        12..=17 => "Boa tarde",
        _ => "Boa noite",
    }
}

/// Humanized elapsed time for summary messages, e.g.
/// `"1 hora, 2 minutos e 5 segundos"`.
pub fn format_elapsed(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(plural(hours, "hora", "horas"));
    }
    if minutes > 0 {
        parts.push(plural(minutes, "minuto", "minutos"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(plural(seconds, "segundo", "segundos"));
    }

    match parts.len() {
        1 => parts.remove(0),
        2 => format!("{} e {}", parts[0], parts[1]),
        _ => format!("{}, {} e {}", parts[0], parts[1], parts[2]),
    }
}

fn plural(n: u64, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("1 {singular}")
    } else {
        format!("{n} {plural}")
    }
}
