//! Rubric compilation
//!
//! Assignment texts list their requirements as markdown bullets or numbered
//! items, grouped under headings that become the requirement category. When
//! no such item exists the generator is asked to enumerate them instead.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::generator::TextGenerator;
use crate::models::InferenceResult;

pub const DEFAULT_CATEGORY: &str = "General";

/// Words that make a requirement critical
const CRITICAL_MARKERS: &[&str] = &["must", "required", "critical", "mandatory"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub description: String,
    /// Share of the total score; the weights of a rubric sum to 1
    pub weight: f32,
    pub critical: bool,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRubric {
    pub requirements: Vec<Requirement>,
    /// Generator output, present when the template found nothing
    pub raw_response: Option<String>,
}

/// Text following a list marker (`-`, `*`, `+`, `1.` or `1)`), if any.
fn list_item(line: &str) -> Option<&str> {
    let line = line.trim_start();
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest);
        }
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") "))
}

fn heading(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if line.starts_with('#') {
        Some(line.trim_start_matches('#').trim())
    } else {
        None
    }
}

fn is_critical(description: &str) -> bool {
    let lower = description.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| CRITICAL_MARKERS.contains(&word))
}

fn build(items: Vec<(String, String)>) -> Vec<Requirement> {
    let weight = 1.0 / items.len().max(1) as f32;
    items
        .into_iter()
        .enumerate()
        .map(|(i, (category, description))| Requirement {
            id: format!("R{}", i + 1),
            critical: is_critical(&description),
            description,
            weight,
            category,
        })
        .collect()
}

/// Requirements written as list items, categorized by the nearest heading above.
pub fn parse_requirements(text: &str) -> Vec<Requirement> {
    let mut category = DEFAULT_CATEGORY.to_string();
    let mut items = Vec::new();

    for line in text.lines() {
        if let Some(title) = heading(line) {
            if !title.is_empty() {
                category = title.to_string();
            }
            continue;
        }
        if let Some(item) = list_item(line) {
            let description = item.trim();
            if !description.is_empty() {
                items.push((category.clone(), description.to_string()));
            }
        }
    }

    build(items)
}

/// Every non-empty, non-heading line, with list markers removed.
fn parse_lines(text: &str) -> Vec<Requirement> {
    let items = text
        .lines()
        .filter(|line| heading(line).is_none())
        .map(|line| list_item(line).unwrap_or(line).trim())
        .filter(|line| !line.is_empty())
        .map(|line| (DEFAULT_CATEGORY.to_string(), line.to_string()))
        .collect();
    build(items)
}

fn rubric_prompt(assignment_text: &str) -> String {
    format!(
        "List the requirements a student must complete for this assignment, one per line:\n\n{}",
        assignment_text.trim()
    )
}

/// Compile `assignment_text` into a weighted rubric.
///
/// An empty result means no requirement could be found, even with the
/// generator's help. Blank text never reaches the generator.
pub fn compile_rubric(
    assignment_text: &str,
    generator: &TextGenerator,
    seed: Option<u64>,
) -> InferenceResult<CompiledRubric> {
    let requirements = parse_requirements(assignment_text);
    if !requirements.is_empty() || assignment_text.trim().is_empty() {
        debug!("Template matched {} requirements", requirements.len());
        return Ok(CompiledRubric {
            requirements,
            raw_response: None,
        });
    }

    info!("📝 No requirement list found, asking the generator");
    let raw = generator.generate(&rubric_prompt(assignment_text), seed)?;
    Ok(CompiledRubric {
        requirements: parse_lines(&raw),
        raw_response: Some(raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::fake_context;

    const ASSIGNMENT: &str = "\
# Homework 3

Use the provided dataset.

## Data preparation
- Load the CSV file with pandas
- Drop rows with missing values

## Modeling
1. Train a logistic regression model
2) You must report accuracy on the test split
* Plot the confusion matrix
";

    #[test]
    fn test_parses_list_items_under_headings() {
        let rubric = parse_requirements(ASSIGNMENT);

        let descriptions: Vec<&str> = rubric.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(
            descriptions,
            vec![
                "Load the CSV file with pandas",
                "Drop rows with missing values",
                "Train a logistic regression model",
                "You must report accuracy on the test split",
                "Plot the confusion matrix",
            ]
        );
        assert_eq!(rubric[0].category, "Data preparation");
        assert_eq!(rubric[2].category, "Modeling");
        assert_eq!(rubric[4].id, "R5");
    }

    #[test]
    fn test_weights_sum_to_one() {
        let rubric = parse_requirements(ASSIGNMENT);
        let total: f32 = rubric.iter().map(|r| r.weight).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_critical_markers() {
        let rubric = parse_requirements(ASSIGNMENT);
        let critical: Vec<&str> = rubric
            .iter()
            .filter(|r| r.critical)
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(critical, vec!["R4"]);

        // Whole words only
        assert!(!is_critical("Summarize the mustard dataset"));
    }

    #[test]
    fn test_items_before_any_heading_are_general() {
        let rubric = parse_requirements("- Write a README\n- Add tests");
        assert_eq!(rubric.len(), 2);
        assert!(rubric.iter().all(|r| r.category == DEFAULT_CATEGORY));
    }

    #[test]
    fn test_plain_prose_has_no_template_items() {
        assert!(parse_requirements("Write a short essay about rivers.\n2024 was a year.").is_empty());
        assert!(parse_requirements("-not a bullet\n#").is_empty());
    }

    #[test]
    fn test_template_result_skips_generator() {
        let context = fake_context();
        let rubric = compile_rubric(ASSIGNMENT, context.generator(), Some(1)).unwrap();
        assert_eq!(rubric.requirements.len(), 5);
        assert_eq!(rubric.raw_response, None);
    }

    #[test]
    fn test_prose_falls_back_to_generator() {
        let context = fake_context();
        let rubric =
            compile_rubric("Write a short essay about rivers.", context.generator(), Some(4)).unwrap();

        let raw = rubric.raw_response.unwrap();
        assert!(!raw.is_empty());
        assert_eq!(rubric.requirements.len(), 1);
        assert_eq!(rubric.requirements[0].description, raw);
        assert_eq!(rubric.requirements[0].weight, 1.0);
    }

    #[test]
    fn test_blank_text_gives_empty_rubric() {
        let context = fake_context();
        let rubric = compile_rubric("  \n\n", context.generator(), None).unwrap();
        assert!(rubric.requirements.is_empty());
        assert_eq!(rubric.raw_response, None);
    }
}
