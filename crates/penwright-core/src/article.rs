//! Article plan, written article and publication metadata.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{PenwrightError, Result};

/// Front-matter fields every published report must carry.
pub const REQUIRED_FRONTMATTER_FIELDS: &[&str] = &["title", "date", "description"];

/// Layout the writer is asked to reproduce.
pub const SAMPLE_ARTICLE_JSON: &str = r#"{
  "metadata": {
    "title": "A catchy, SEO-friendly title (under 60 characters)",
    "author": "Optional author name or organization",
    "description": "A 1-2 sentence meta description (under 160 characters) summarizing key points for SEO.",
    "date": "YYYY-MM-DD",
    "tags": ["primary-tag", "secondary-tag", "tertiary-tag"],
    "word_count": "Optional estimated word count"
  },
  "content": {
    "introduction": {
      "hook": "A compelling opening sentence/question/statistic to grab attention.",
      "context": "Brief background (1-2 sentences) explaining why the topic matters.",
      "thesis": "Clear statement of the article's purpose or main argument."
    },
    "main_content": [
      {
        "heading": "H2 Header: Key Topic or Argument",
        "content": "Markdown-formatted paragraph(s) with **bold key terms**, [hyperlinks](https://example.com), bullet points and short paragraphs.",
        "subsections": [
          {
            "subheading": "H3 Subheader: Supporting Detail",
            "content": "Data, examples, or analysis. Tables, `code snippets` or embedded media where useful."
          }
        ]
      }
    ],
    "conclusion": {
      "summary": "Concise recap of key points (bullet points or 1-2 sentences).",
      "call_to_action": "Optional question/prompt or further reading suggestion."
    }
  },
  "references": {
    "sources": [
      {
        "citation": "APA-style citation (e.g., Author, A. (Year). *Title*. Publisher).",
        "url": "https://example.com"
      }
    ],
    "additional_resources": [
      {
        "title": "Optional related articles/books",
        "url": "https://example.com"
      }
    ]
  }
}"#;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArticleMetadata {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "string_or_number"
    )]
    pub word_count: Option<String>,
}

// Models answer `"word_count": 1200` as often as `"1200"`.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Outline produced by the editor. Intro and conclusion stay free-form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArticlePlan {
    pub metadata: ArticleMetadata,
    pub content: PlanContent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanContent {
    #[serde(default)]
    pub introduction: Value,
    #[serde(default)]
    pub main_content: Vec<PlanSection>,
    #[serde(default)]
    pub conclusion: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanSection {
    pub heading: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub subsections: Vec<PlanSubsection>,
}

impl PlanSection {
    pub fn new(heading: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanSubsection {
    #[serde(default, alias = "subheading")]
    pub heading: String,
}

/// Validated writer output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub metadata: ArticleMetadata,
    pub content: ArticleContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<References>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticleContent {
    pub introduction: Introduction,
    pub main_content: Vec<ArticleSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<Conclusion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Introduction {
    pub hook: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub thesis: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticleSection {
    pub heading: String,
    pub content: String,
    #[serde(default)]
    pub subsections: Vec<ArticleSubsection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticleSubsection {
    pub subheading: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Conclusion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_to_action: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct References {
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub additional_resources: Vec<Resource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub citation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Article {
    /// Check the top-level shape, then deserialize into the typed model.
    pub fn from_value(value: Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| PenwrightError::InvalidArticle("expected a JSON object".into()))?;
        for key in ["metadata", "content"] {
            if !obj.contains_key(key) {
                return Err(PenwrightError::InvalidArticle(format!(
                    "'{key}' is a required property"
                )));
            }
        }
        serde_json::from_value(value).map_err(|e| PenwrightError::InvalidArticle(e.to_string()))
    }
}

/// Front-matter headers of the published report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Headers {
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl Headers {
    /// Names of required front-matter fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        REQUIRED_FRONTMATTER_FIELDS
            .iter()
            .copied()
            .filter(|field| match *field {
                "title" => self.title.trim().is_empty(),
                "date" => self.date.trim().is_empty(),
                "description" => self.description.trim().is_empty(),
                _ => false,
            })
            .collect()
    }
}

/// Search-engine metadata produced by the SEO pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SeoMetadata {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub focus_keyword: String,
    #[serde(default)]
    pub secondary_keywords: Vec<String>,
    #[serde(default)]
    pub meta_title: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub schema_type: String,
    #[serde(default)]
    pub internal_links: Vec<String>,
    #[serde(default)]
    pub alt_texts: Vec<String>,
}
