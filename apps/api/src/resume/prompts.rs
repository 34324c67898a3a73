// Prompt constants for the generative and evaluative gateways.
// Cross-cutting fragments come from llm_client::prompts.

/// System prompt for draft generation.
pub const GENERATION_SYSTEM: &str = "You are an IT resume writer. \
    You turn repository activity into concise project entries for a developer resume. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Generation prompt. Replace every `{placeholder}` before sending.
pub const GENERATION_PROMPT_TEMPLATE: &str = r#"Write resume project entries for a {position} position{company_clause}.

{grounding_instruction}

RULES:
1. tech_stack: 5-8 items per project. Languages, frameworks, databases, infrastructure only.
   Exclude utilities (dotenv, lombok, pydantic), dev tools (eslint, prettier, jest, pytest),
   AI service names and package managers.
2. description: 5-8 bullet points, each line starting with "- ".
3. Bullets describe what was built and how. No trivial work (typo fixes, README edits, dependency bumps).
4. Output exactly {project_count} projects, one per input project, in input order.
5. repo_url must be copied verbatim from the URLs list.
{feedback_section}
## GitHub stats
{user_stats}

## Repository context
{repo_contexts}

## Projects
{project_info}

## URLs
{repo_urls}

Return a JSON object with this EXACT schema:
{
  "tech_stack": ["consolidated stack across all projects"],
  "projects": [
    {
      "name": "project name",
      "repo_url": "https://github.com/owner/repo",
      "tech_stack": ["5-8 items"],
      "description": "- bullet 1\n- bullet 2\n- bullet 3\n- bullet 4\n- bullet 5"
    }
  ]
}"#;

/// Inserted into the generation prompt on a retry.
pub const FEEDBACK_SECTION_TEMPLATE: &str = r#"
## Reviewer feedback on the previous draft (MUST FIX)
{feedback}
"#;

/// System prompt for the quality gate. Replace `{position}` before sending.
/// `JSON_ONLY_SYSTEM` is appended by the evaluator.
pub const EVALUATION_SYSTEM_TEMPLATE: &str = "You are a strict technical recruiter reviewing \
    {position} resumes.";

/// Evaluation prompt. Replace every `{placeholder}` before sending.
pub const EVALUATION_PROMPT_TEMPLATE: &str = r#"Evaluate this {position} resume draft. FAIL it if any rule is broken.

Rule 1: every project has 5-8 tech_stack items.
Rule 2: no utilities, dev tools, AI service names, package managers or version-control tools in tech_stack.
Rule 3: tech_stack fits a {position} role.
Rule 4: every description has 5-8 lines, each starting with "- ".
Rule 5: no trivial content (typo fixes, README edits, package installs).

Resume:
{resume_json}

Return a JSON object with this EXACT schema:
{"result": "pass" | "fail", "violated_rule": <rule number or null>, "violated_item": <offending text or null>, "feedback": "<one or two sentences>"}"#;
