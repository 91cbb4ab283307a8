//! AI suggestions and insights over ideas.
//!
//! The model is reached through [`GenerativeClient`]. Whatever comes back is
//! searched for a JSON object; if the call fails or the object is missing or
//! malformed, a deterministic local substitute is returned instead and the
//! [`Assessment`] is flagged as a fallback with a warning.

mod gemini;

pub use gemini::{GeminiClient, GenerationConfig};

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::quadrant::Quadrant;
use crate::store::Idea;

static JSON_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("JSON object regex is valid"));

/// Sends a prompt, returns the model's free-text reply.
pub trait GenerativeClient {
    fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestionKind {
    #[serde(rename = "impact")]
    Impact,
    #[serde(rename = "effort")]
    Effort,
    #[serde(rename = "tags")]
    Tags,
    #[serde(rename = "actionPlan")]
    ActionPlan,
    #[serde(rename = "proscons")]
    ProsCons,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SuggestionContent {
    Text(String),
    Steps(Vec<String>),
    ProsCons { pros: Vec<String>, cons: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub title: String,
    pub content: SuggestionContent,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Pattern,
    Recommendation,
    Trend,
    Opportunity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    #[serde(default)]
    pub actionable: bool,
}

/// A result that may have come from the local fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment<T> {
    pub items: Vec<T>,
    pub from_fallback: bool,
    pub warning: Option<String>,
}

impl<T> Assessment<T> {
    fn generated(items: Vec<T>) -> Self {
        Assessment {
            items,
            from_fallback: false,
            warning: None,
        }
    }

    fn fallback(items: Vec<T>, cause: &Error) -> Self {
        Assessment {
            items,
            from_fallback: true,
            warning: Some(format!(
                "AI suggestions are unavailable ({cause}); showing a basic analysis instead."
            )),
        }
    }
}

#[derive(Deserialize)]
struct SuggestionReply {
    #[serde(default)]
    suggestions: Vec<Suggestion>,
}

#[derive(Deserialize)]
struct InsightReply {
    #[serde(default)]
    insights: Vec<Insight>,
}

/// Parse the first-`{` to last-`}` span of `reply` as `T`.
fn parse_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let json = JSON_OBJECT_RE
        .find(reply)
        .ok_or_else(|| Error::AiService("no JSON object in reply".into()))?;
    serde_json::from_str(json.as_str())
        .map_err(|e| Error::AiService(format!("malformed JSON in reply: {e}")))
}

/// Suggestion and insight generation with a deterministic fallback.
pub struct AiService {
    client: Option<Box<dyn GenerativeClient>>,
}

impl AiService {
    pub fn new(client: Box<dyn GenerativeClient>) -> Self {
        AiService {
            client: Some(client),
        }
    }

    /// A service that always answers from the fallback.
    pub fn offline() -> Self {
        AiService { client: None }
    }

    fn ask(&self, prompt: &str) -> Result<String> {
        match &self.client {
            Some(client) => client.generate(prompt),
            None => Err(Error::AiService("no AI client configured".into())),
        }
    }

    pub fn suggestions(&self, idea: &Idea) -> Assessment<Suggestion> {
        let reply = self
            .ask(&suggestion_prompt(idea))
            .and_then(|text| parse_reply::<SuggestionReply>(&text));
        match reply {
            Ok(reply) => Assessment::generated(reply.suggestions),
            Err(e) => {
                tracing::warn!("suggestions for idea {} fell back: {e}", idea.id);
                Assessment::fallback(fallback_suggestions(idea), &e)
            }
        }
    }

    pub fn insights(&self, ideas: &[Idea]) -> Assessment<Insight> {
        if ideas.is_empty() {
            return Assessment::generated(Vec::new());
        }
        let reply = self
            .ask(&insight_prompt(ideas))
            .and_then(|text| parse_reply::<InsightReply>(&text));
        match reply {
            Ok(reply) => Assessment::generated(reply.insights),
            Err(e) => {
                tracing::warn!("insights over {} ideas fell back: {e}", ideas.len());
                Assessment::fallback(fallback_insights(ideas), &e)
            }
        }
    }
}

fn suggestion_prompt(idea: &Idea) -> String {
    format!(
        r#"Analyze this idea and answer with a single JSON object.

Title: "{title}"
Description: "{description}"
Current impact: {impact}/5
Current effort: {effort}/5

Shape:
{{
  "suggestions": [
    {{"type": "impact", "title": "...", "content": "suggested score and why", "confidence": 0.0-1.0, "reasoning": "..."}},
    {{"type": "effort", "title": "...", "content": "suggested score and why", "confidence": 0.0-1.0, "reasoning": "..."}},
    {{"type": "actionPlan", "title": "...", "content": ["step", "..."], "confidence": 0.0-1.0}},
    {{"type": "proscons", "title": "...", "content": {{"pros": ["..."], "cons": ["..."]}}, "confidence": 0.0-1.0}}
  ]
}}

Keep it practical: market viability, technical feasibility, resources needed."#,
        title = idea.title,
        description = idea.description.as_deref().unwrap_or("No description provided"),
        impact = idea.impact(),
        effort = idea.effort(),
    )
}

fn insight_prompt(ideas: &[Idea]) -> String {
    let listing = ideas
        .iter()
        .enumerate()
        .map(|(i, idea)| {
            format!(
                "{}. \"{}\" (impact {}/5, effort {}/5, quadrant {})",
                i + 1,
                idea.title,
                idea.impact(),
                idea.effort(),
                idea.quadrant().as_str()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"Look for patterns, trends and priorities across these {count} ideas:

{listing}

Answer with a single JSON object:
{{
  "insights": [
    {{"type": "pattern" | "recommendation" | "trend" | "opportunity", "title": "...", "description": "...", "confidence": 0.0-1.0, "actionable": true | false}}
  ]
}}

Cover the impact/effort distribution, what to prioritise, recurring themes, and quick wins."#,
        count = ideas.len(),
    )
}

const FALLBACK_REASONING: &str = "AI unavailable; based on the current scores";

/// Local substitute: nudge impact up and effort down one step each.
pub fn fallback_suggestions(idea: &Idea) -> Vec<Suggestion> {
    vec![
        Suggestion {
            kind: SuggestionKind::Impact,
            title: "Impact Score Suggestion".into(),
            content: SuggestionContent::Text(format!(
                "Suggested impact: {}/5",
                idea.impact().raised()
            )),
            confidence: 0.75,
            reasoning: Some(FALLBACK_REASONING.into()),
        },
        Suggestion {
            kind: SuggestionKind::Effort,
            title: "Effort Estimation".into(),
            content: SuggestionContent::Text(format!(
                "Estimated effort: {}/5",
                idea.effort().lowered()
            )),
            confidence: 0.7,
            reasoning: Some(FALLBACK_REASONING.into()),
        },
        Suggestion {
            kind: SuggestionKind::ActionPlan,
            title: "Basic Action Plan".into(),
            content: SuggestionContent::Steps(
                [
                    "Research and validate the concept",
                    "Outline the project in detail",
                    "Identify the resources you need",
                    "Build a prototype or MVP",
                    "Test it and gather feedback",
                    "Iterate",
                ]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            ),
            confidence: 0.8,
            reasoning: None,
        },
        Suggestion {
            kind: SuggestionKind::ProsCons,
            title: "General Analysis".into(),
            content: SuggestionContent::ProsCons {
                pros: vec![
                    "Addresses a potential need".into(),
                    "Could provide value to users".into(),
                    "A chance to learn".into(),
                ],
                cons: vec![
                    "Takes time".into(),
                    "May face competition".into(),
                    "Success is not guaranteed".into(),
                ],
            },
            confidence: 0.65,
            reasoning: None,
        },
    ]
}

/// Local substitute computed from the scores and tags. `ideas` is non-empty.
pub fn fallback_insights(ideas: &[Idea]) -> Vec<Insight> {
    let total = ideas.len();
    let high_impact = ideas.iter().filter(|i| i.impact().get() >= 4).count();
    let low_effort = ideas.iter().filter(|i| i.effort().get() <= 2).count();
    let quick_wins = ideas
        .iter()
        .filter(|i| i.quadrant() == Quadrant::Q2)
        .count();
    let categories = ideas
        .iter()
        .flat_map(|i| i.tags.iter())
        .collect::<HashSet<_>>()
        .len();
    let share = (high_impact as f64 * 100.0 / total.max(1) as f64).round();

    let focus = if low_effort > 0 {
        format!("Consider starting with {low_effort} low-effort ideas to build momentum.")
    } else {
        "Break high-effort ideas down into smaller tasks.".to_string()
    };

    vec![
        Insight {
            kind: InsightKind::Pattern,
            title: "Idea Distribution".into(),
            description: format!(
                "You have {total} ideas, {high_impact} of them high-impact ({share}%)."
            ),
            confidence: 0.9,
            actionable: false,
        },
        Insight {
            kind: InsightKind::Opportunity,
            title: "Quick Wins Available".into(),
            description: format!(
                "{quick_wins} ideas sit in \"{}\": high impact for low effort.",
                Quadrant::Q2.title()
            ),
            confidence: 0.85,
            actionable: true,
        },
        Insight {
            kind: InsightKind::Recommendation,
            title: "Focus Recommendation".into(),
            description: focus,
            confidence: 0.8,
            actionable: true,
        },
        Insight {
            kind: InsightKind::Trend,
            title: "Creativity Trend".into(),
            description: format!("Your ideas span {categories} different tags."),
            confidence: 0.75,
            actionable: false,
        },
    ]
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use chrono::Utc;

    use super::*;
    use crate::quadrant::Score;
    use crate::store::{IdeaStatus, TagSet};

    struct Scripted {
        reply: Result<String>,
        calls: Rc<Cell<usize>>,
    }

    impl GenerativeClient for Scripted {
        fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(Error::AiService(e.to_string())),
            }
        }
    }

    fn service(reply: Result<String>) -> (AiService, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let client = Scripted {
            reply,
            calls: Rc::clone(&calls),
        };
        (AiService::new(Box::new(client)), calls)
    }

    fn idea(impact: u8, effort: u8) -> Idea {
        let now = Utc::now();
        Idea::new(
            "i".into(),
            "Idea".into(),
            None,
            TagSet::from(["tech".to_string()]),
            Score::new(impact).unwrap(),
            Score::new(effort).unwrap(),
            IdeaStatus::Active,
            now,
            now,
        )
    }

    #[test]
    fn parses_json_embedded_in_prose() {
        let reply = r#"Sure! Here you go:
```json
{"suggestions": [{"type": "actionPlan", "title": "Plan", "content": ["a", "b"], "confidence": 0.9}]}
```
Good luck."#;
        let (ai, _) = service(Ok(reply.into()));
        let out = ai.suggestions(&idea(3, 3));
        assert!(!out.from_fallback);
        assert!(out.warning.is_none());
        assert_eq!(out.items.len(), 1);
        assert_eq!(
            out.items[0].content,
            SuggestionContent::Steps(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn missing_json_falls_back_with_warning() {
        let (ai, _) = service(Ok("I cannot help with that.".into()));
        let out = ai.suggestions(&idea(3, 3));
        assert!(out.from_fallback);
        assert!(out.warning.is_some());
        assert_eq!(out.items.len(), 4);
    }

    #[test]
    fn transport_failure_falls_back() {
        let (ai, _) = service(Err(Error::AiService("timeout".into())));
        let out = ai.insights(&[idea(4, 2)]);
        assert!(out.from_fallback);
        assert_eq!(out.items.len(), 4);
        assert!(out.items[1].description.starts_with("1 ideas"));
    }

    #[test]
    fn fallback_nudges_are_deterministic_and_clamped() {
        let out = fallback_suggestions(&idea(5, 1));
        assert_eq!(out[0].content, SuggestionContent::Text("Suggested impact: 5/5".into()));
        assert_eq!(out[1].content, SuggestionContent::Text("Estimated effort: 1/5".into()));

        let out = fallback_suggestions(&idea(3, 3));
        assert_eq!(out[0].content, SuggestionContent::Text("Suggested impact: 4/5".into()));
        assert_eq!(out[1].content, SuggestionContent::Text("Estimated effort: 2/5".into()));
    }

    #[test]
    fn no_ideas_means_no_insights_and_no_call() {
        let (ai, calls) = service(Ok("{}".into()));
        let out = ai.insights(&[]);
        assert!(out.items.is_empty());
        assert!(!out.from_fallback);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn offline_service_always_falls_back() {
        let out = AiService::offline().suggestions(&idea(2, 2));
        assert!(out.from_fallback);
    }

    #[test]
    fn pros_cons_content_parses() {
        let reply = r#"{"suggestions":[{"type":"proscons","title":"t","content":{"pros":["p"],"cons":[]},"confidence":0.5}]}"#;
        let parsed: SuggestionReply = parse_reply(reply).unwrap();
        assert!(matches!(parsed.suggestions[0].content, SuggestionContent::ProsCons { .. }));
    }
}
