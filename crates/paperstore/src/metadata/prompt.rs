/// Instruction sent ahead of the extracted page text.
pub const EXTRACTION_PROMPT: &str = "\
You are given the text of the first pages of a research paper. \
Extract its bibliographic metadata and answer with a single JSON object \
with exactly these keys:
- \"title\": the paper title as a string, or null
- \"authors\": an array of author full names, in the order printed
- \"date\": the publication date as YYYY, YYYY-MM or YYYY-MM-DD, or null
- \"abstract\": the abstract text as a string, or null
Return nothing except the JSON object.";

/// Builds the full prompt for one paper.
pub fn build_prompt(page_text: &str) -> String {
    format!("{}\n\n{}", EXTRACTION_PROMPT, page_text.trim())
}
