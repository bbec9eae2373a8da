//! Prompts for metadata extraction.

use covenant_core::metadata::DOCUMENT_TYPES;

pub const SYSTEM_PROMPT: &str = "You are a senior legal documentation analyst. \
Extract the requested metadata from the first page of a filing exhibit. \
Output must follow the provided schema and be grounded strictly in the text. \
If a value is unknown, return null. Dates must be YYYY-MM-DD. \
Only infer when strongly supported; otherwise prefer null and lower confidence.";

/// User message carrying the truncated document text.
pub fn user_prompt(snippet: &str) -> String {
    format!(
        "Allowed values:\n\
         - document_type: {}. A contract is the agreement itself, not a letter or memo referring to one.\n\
         - contract_category: a short label for the kind of agreement as named in the document \
         (e.g. Master Agreement, Credit Support Annex, Repurchase Agreement).\n\n\
         Document first-page text (truncated):\n\
         {snippet}\n\n\
         Now extract the metadata.",
        DOCUMENT_TYPES.join(" | ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prompt_embeds_snippet_and_allowed_values() {
        let p = user_prompt("ISDA 2002 MASTER AGREEMENT dated as of March 15, 2021");
        assert!(p.contains("contract | confirmation | other"));
        assert!(p.contains("\nISDA 2002 MASTER AGREEMENT dated as of March 15, 2021\n"));
        assert!(p.ends_with("Now extract the metadata."));
    }
}
