// Community report prompt.

/// Template for one community report. `{max_report_length}` and
/// `{input_text}` are substituted by [`community_report_prompt`].
pub const COMMUNITY_REPORT_TEMPLATE: &str = r#"You are an analyst writing a report about one community of a knowledge graph.
The community is described by the tables below: entities, claims about them,
the relationships between them, and possibly summaries of sub-communities.

Write a report with:
- "title": a short, specific name for the community built from its key entities.
- "summary": an executive summary of the community's structure and how its
  entities relate.
- "rating": a float from 0 to 10 scoring how significant the community is.
- "rating_explanation": one sentence justifying the rating.
- "findings": 5 to 10 key insights, each an object with "summary" (one line)
  and "explanation" (a few grounded paragraphs referencing table ids).

Keep the report under {max_report_length} words. Use only facts supported by
the tables. Respond with a single JSON object and nothing else:

{
  "title": "...",
  "summary": "...",
  "rating": 5.0,
  "rating_explanation": "...",
  "findings": [{"summary": "...", "explanation": "..."}]
}

Tables:

{input_text}
"#;

/// Render the report prompt for one community context.
pub fn community_report_prompt(context: &str, max_report_length: usize) -> String {
    COMMUNITY_REPORT_TEMPLATE
        .replace("{max_report_length}", &max_report_length.to_string())
        .replace("{input_text}", context)
}
