//! JSON-extraction utility shared by every component that parses an LLM response:
//! strip markdown fences, then trim to the outermost balanced `{}` or `[]`.

/// Strips a leading/trailing ```` ```json ```` or ```` ``` ```` fence, if present, then trims
/// the result to the outermost balanced brace or bracket pair before handing it to a JSON
/// parser. Tolerates commentary the model added before or after the JSON payload.
pub fn extract_json(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text = text.trim();

    let open_candidates = [('{', '}'), ('[', ']')];
    let mut best: Option<(usize, usize)> = None;
    for (open, close) in open_candidates {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if end > start {
                let span = end - start;
                if best.map(|(_, bspan)| span > bspan).unwrap_or(true) {
                    best = Some((start, span));
                }
            }
        }
    }

    match best {
        Some((start, span)) => &text[start..=start + span],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n[{\"callee\": \"Save\"}]\n```";
        assert_eq!(extract_json(raw), "[{\"callee\": \"Save\"}]");
    }

    #[test]
    fn strips_bare_fence() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw), "{\"a\": 1}");
    }

    #[test]
    fn trims_surrounding_commentary() {
        let raw = "Sure, here's the array:\n[{\"callee\": \"Save\"}]\nLet me know if you need more.";
        assert_eq!(extract_json(raw), "[{\"callee\": \"Save\"}]");
    }

    #[test]
    fn passes_through_plain_json() {
        assert_eq!(extract_json("{\"x\": true}"), "{\"x\": true}");
    }
}
