// Shared prompt fragments. Gateway-specific prompts live next to the gateway
// in resume/prompts.rs.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Keeps generated content tied to the repository data in the prompt.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Every statement must be supported by the repository data provided \
    (file tree, dependencies, pull requests, commits, README). \
    Do NOT invent features, metrics, or technologies that the data does not show.";
