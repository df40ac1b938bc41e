//! Prompt templates. `{text}` is replaced with the extracted document text.

pub const FRAUD: &str = "INSTRUCTIONS: You are an assistant that detects fraudulent or suspicious sentences in documents. \
Identify sentences that contain fraudulent content, scams, illegal requests, or suspicious clauses. \
Return ONLY the fraudulent sentences separated by semicolons (;). If no fraud is detected, return an empty string.

TEXT FOR ANALYSIS:
{text}

RESPONSE FORMAT: sentence1; sentence2; sentence3";

pub const SPELLING: &str = "INSTRUCTIONS: You are an assistant that finds spelling problems in the text and returns the list of words that have problems. \
Return ONLY the misspelled words separated by semicolons (;). If no mistakes are found, return an empty string.

TEXT FOR ANALYSIS:
{text}

RESPONSE FORMAT: word1; word2; word3";

pub const CLASSIFICATION: &str = "INSTRUCTIONS: You are an assistant that determines the type of a document. \
Classify the document as a contract, agreement, act, specification, invoice, or another appropriate document type. \
Return ONLY the document type name.

DOCUMENT:
{text}

RESPONSE FORMAT: A single word or short phrase naming the document type";

pub const SUMMARY: &str = "INSTRUCTIONS: You are an assistant that summarizes documents. \
Write a short neutral summary (at most five sentences) of the document: its purpose, the parties involved and key amounts or dates. \
Return ONLY the summary.

DOCUMENT:
{text}";

pub const CHAT_PREAMBLE: &str = "You are an expert assistant helping with document review.";

pub const CHAT_GUIDANCE: &str = "Use the above context to answer user questions, explain risks, suggest corrections, \
and provide concise, actionable guidance.
Answers should be clear and to the point. Maximum 200 characters.";

/// Separates the chat context from the user's question.
pub const USER_QUESTION: &str = "\n\nUser question: ";

pub fn render(template: &str, text: &str) -> String {
    template.replace("{text}", text)
}
