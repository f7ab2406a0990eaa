//! Default instructions sent with each slide image.
//!
//! Centralising prompts here keeps one source of truth: ingestion stamps
//! [`DEFAULT_ANALYSIS_PROMPT`] onto every new slide, and the session falls
//! back to it when neither the caller nor the slide supplies a prompt.

/// Instruction used when no per-slide or per-call prompt is available.
pub const DEFAULT_ANALYSIS_PROMPT: &str = r#"You are a patient teaching assistant. The image is one slide from a lecture or presentation.

Explain this slide so that a student who missed the lecture understands it:

1. Start with one sentence stating what the slide is about.
2. Walk through every point, formula, diagram and table on the slide, in reading order.
3. Define any technical term the first time it appears.
4. For formulas, say what each symbol means and what the formula is used for.
5. For diagrams and charts, describe what is shown and the conclusion to draw.
6. Finish with the key takeaway in one or two sentences.

Write in clear Markdown. Do not invent content that is not supported by the slide.
If the slide is blank or decorative only, say so briefly."#;

/// Pick the prompt for one analysis call.
///
/// Precedence: the caller's override, then the prompt stored on the slide,
/// then `default`. Blank strings count as absent.
pub fn resolve_prompt<'a>(
    override_prompt: Option<&'a str>,
    slide_prompt: Option<&'a str>,
    default: &'a str,
) -> &'a str {
    [override_prompt, slide_prompt]
        .into_iter()
        .flatten()
        .find(|p| !p.trim().is_empty())
        .unwrap_or(default)
}
