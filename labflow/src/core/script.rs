//! Cleanup of generated text into executable scripts and parseable JSON.

/// Line prefixes that mark model commentary rather than commands.
const COMMENTARY_PREFIXES: [&str; 3] = ["**", "Looking", "Let me"];

/// Return the body of the first fenced block, or the trimmed input when unfenced.
///
/// The language tag after the opening fence is dropped. An unterminated fence
/// yields everything after it.
pub fn unwrap_fenced(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[open + 3..];
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(after_open.len());
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Turn a generator reply into an executable script.
///
/// Unwraps fencing and drops commentary lines. Returns an empty string when
/// nothing executable remains.
pub fn clean_script(raw: &str) -> String {
    unwrap_fenced(raw)
        .lines()
        .filter(|line| {
            let line = line.trim_start();
            !COMMENTARY_PREFIXES
                .iter()
                .any(|prefix| line.starts_with(prefix))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
