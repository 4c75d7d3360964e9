//! System prompt for vision-model page transcription.
//!
//! The vision backend is only a recogniser: it must return the page text as
//! faithfully as a classical OCR engine would, laid out so that the
//! normaliser and extractor can read it. Field extraction stays in Rust.
//!
//! Callers can override the prompt via
//! [`crate::config::ExtractionConfig::system_prompt`].

/// Default transcription prompt for one statement page.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a precise OCR engine for bank and custody statements. Transcribe the page image into plain text.

Follow these rules precisely:

1. TEXT PRESERVATION
   - Transcribe ALL visible text in reading order
   - Copy numbers, ISINs, dates and currency codes exactly as printed
   - Do NOT reformat numbers: keep the original thousands and decimal separators
   - Do NOT correct, round, translate or infer values that are not printed

2. TABLES
   - Write each table row on ONE line, cells separated by single spaces
   - Keep the column order of the printed table
   - Do NOT draw table borders, pipes or alignment markers
   - Skip column headers only if they are illegible

3. LABELS
   - Keep labels next to their values on the same line
     (e.g. "Total Portfolio Value 1,234,567.89 USD")

4. OUTPUT FORMAT
   - Output ONLY the transcribed text
   - No Markdown, no code fences, no commentary
   - If the page is blank, output nothing"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_forbids_reformatting_numbers() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("Do NOT reformat numbers"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("ONE line"));
    }
}
