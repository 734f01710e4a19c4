//! Syllabus metadata extraction.
//!
//! [`parse_with_regex`] is a fast heuristic pass that always succeeds.
//! [`SyllabusParser`] asks a chat model for structured JSON and uses the
//! heuristic result to fill gaps, or in full when the model is unavailable.

use anyhow::{anyhow, Result};
use providers::ProviderRouter;
use regex::Regex;
use serde_json::Value;
use shared::agent_api::ChatMessage;
use shared::course::{AssignmentItem, SyllabusData};
use std::sync::{Arc, LazyLock};

/// Characters of syllabus text sent to the model.
pub const LLM_INPUT_CHARS: usize = 12_000;

const MAX_ASSIGNMENTS: usize = 50;

static CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{2,4})[ -]?(\d{3,4}[A-Z]?)\b").unwrap());
/// Upper-case words that look like a course prefix next to a number but
/// never are one ("FALL 2024", "ROOM 1234").
const NOT_COURSE_PREFIXES: &[&str] = &["FALL", "ROOM", "YEAR", "WEEK", "PAGE", "UNIT", "RM"];

static TERM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(Fall|Spring|Summer|Winter)\s+(\d{4})\b").unwrap());
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static TITLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:course\s+title|course\s+name|title)\s*[:\-]\s*(.+?)\s*$").unwrap()
});
static INSTRUCTOR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:instructor|professor|lecturer|taught\s+by)\s*[:\-]?\s*(.+?)\s*$").unwrap()
});
static DOCTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:Dr|Prof)\.\s+[A-Z][A-Za-z'\-]+(?:\s+[A-Z][A-Za-z'\-]+)?)").unwrap()
});
static UNIVERSITY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[^\n]*\b(?:University|College|Institute)\b[^\n]*$").unwrap()
});
static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\.?\s+\d{1,2}\b|\b\d{1,2}/\d{1,2}(?:/\d{2,4})?\b",
    )
    .unwrap()
});
static ASSIGNMENT_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:due|exam|quiz|assignment|homework|hw|project|midterm|final|paper|lab)\b").unwrap()
});

/// Heuristic extraction. Fields that cannot be found are left empty.
pub fn parse_with_regex(text: &str) -> SyllabusData {
    let mut data = SyllabusData::default();

    let code = CODE
        .captures_iter(text)
        .find(|caps| !NOT_COURSE_PREFIXES.contains(&&caps[1]));
    if let Some(caps) = code {
        data.class_code = format!("{} {}", &caps[1], &caps[2]);
        data.class_name = TITLE_LINE
            .captures(text)
            .map(|c| clean_field(&c[1]))
            .unwrap_or_else(|| name_after_code(text, caps.get(0).map_or(0, |m| m.end())));
    } else if let Some(c) = TITLE_LINE.captures(text) {
        data.class_name = clean_field(&c[1]);
    }

    data.instructor = INSTRUCTOR_LINE
        .captures(text)
        .map(|c| instructor_name(&c[1]))
        .filter(|n| !n.is_empty())
        .or_else(|| DOCTOR.captures(text).map(|c| c[1].to_string()))
        .unwrap_or_default();

    data.instructor_email = EMAIL
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    data.university = UNIVERSITY_LINE
        .find(text)
        .map(|m| clean_field(m.as_str()))
        .filter(|u| u.chars().count() <= 100)
        .unwrap_or_default();

    data.term = TERM
        .captures(text)
        .map(|c| format!("{} {}", capitalize(&c[1]), &c[2]))
        .unwrap_or_default();

    data.assignments = text
        .lines()
        .filter(|line| ASSIGNMENT_WORD.is_match(line))
        .filter_map(|line| {
            let date = DATE.find(line)?;
            let title = clean_field(line.trim_start_matches(['-', '*', '•', ' ', '\t']));
            Some(AssignmentItem {
                title,
                due_date: Some(date.as_str().to_string()),
            })
        })
        .take(MAX_ASSIGNMENTS)
        .collect();

    data
}

/// Rest of the line holding the course code, e.g. "CS 101: Intro to Programming".
fn name_after_code(text: &str, code_end: usize) -> String {
    let rest = text[code_end..].lines().next().unwrap_or("");
    let rest = TERM.replace_all(rest, "");
    clean_field(rest.trim_start_matches(|c: char| c == ':' || c == '-' || c == '–' || c.is_whitespace()))
}

fn instructor_name(raw: &str) -> String {
    let without_email = EMAIL.replace_all(raw, "");
    let name = without_email
        .split([',', '|', ';', '('])
        .next()
        .unwrap_or("")
        .trim();
    let name = name
        .strip_suffix("Email:")
        .or_else(|| name.strip_suffix("email:"))
        .unwrap_or(name);
    clean_field(name)
}

fn clean_field(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == ':' || c == '-' || c == ',' || c == '|')
        .trim()
        .to_string()
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// First `max` characters of `text`, on a char boundary.
fn head(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// The outermost `{...}` block of a model reply, tolerating code fences and
/// surrounding prose.
pub fn extract_json_block(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

fn str_of(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null") && !s.eq_ignore_ascii_case("unknown"))
        .unwrap_or("")
        .to_string()
}

/// Lenient mapping of the model's JSON: nulls, snake_case keys and missing
/// fields are all accepted.
pub fn syllabus_from_json(value: &Value) -> SyllabusData {
    let assignments = value
        .get("assignments")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let title = str_of(item, &["title", "name"]);
                    if title.is_empty() {
                        return None;
                    }
                    let due = str_of(item, &["dueDate", "due_date", "date"]);
                    Some(AssignmentItem {
                        title,
                        due_date: (!due.is_empty()).then_some(due),
                    })
                })
                .take(MAX_ASSIGNMENTS)
                .collect()
        })
        .unwrap_or_default();

    SyllabusData {
        class_code: str_of(value, &["classCode", "class_code", "courseCode"]),
        class_name: str_of(value, &["className", "class_name", "courseName"]),
        instructor: str_of(value, &["instructor", "professor"]),
        instructor_email: str_of(value, &["instructorEmail", "instructor_email", "email"]),
        university: str_of(value, &["university", "school"]),
        term: str_of(value, &["term", "semester"]),
        assignments,
    }
}

fn extraction_prompt(text: &str) -> String {
    format!(
        "Extract the course information from this syllabus. Respond with ONLY a JSON object \
         with these keys: classCode, className, instructor, instructorEmail, university, term, \
         assignments (an array of objects with title and dueDate). Use an empty string for \
         anything you cannot find.\n\nSyllabus:\n{}",
        head(text, LLM_INPUT_CHARS)
    )
}

/// Model-backed parser with heuristic fallback.
pub struct SyllabusParser {
    router: Arc<ProviderRouter>,
}

impl SyllabusParser {
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self { router }
    }

    /// Never fails: any model problem degrades to the regex result.
    pub async fn parse(&self, text: &str) -> SyllabusData {
        let heuristic = parse_with_regex(text);
        match self.parse_with_model(text).await {
            Ok(mut data) => {
                data.fill_from(&heuristic);
                data
            }
            Err(e) => {
                tracing::warn!("syllabus model parse failed, using regex result: {}", e);
                heuristic
            }
        }
    }

    async fn parse_with_model(&self, text: &str) -> Result<SyllabusData> {
        if text.trim().is_empty() {
            return Err(anyhow!("empty syllabus text"));
        }
        let messages = vec![
            ChatMessage::system("You extract structured data from course syllabi and reply with JSON only."),
            ChatMessage::user(extraction_prompt(text)),
        ];
        let generation = self.router.generate(messages).await?;
        let block = extract_json_block(&generation.text)
            .ok_or_else(|| anyhow!("{} reply had no JSON object", generation.provider))?;
        let value: Value = serde_json::from_str(block)?;
        Ok(syllabus_from_json(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use providers::ChatProvider;

    const SAMPLE: &str = "State University\n\
        Department of Computer Science\n\
        CS 201: Data Structures and Algorithms\n\
        Fall 2024\n\
        Instructor: Dr. Jane Smith, jsmith@state.edu\n\
        Office hours: Tue 2-4pm\n\
        \n\
        Schedule\n\
        - Homework 1 due Sep 12\n\
        - Midterm exam October 17\n\
        - Final project due 12/10\n\
        - Reading week, no class\n";

    #[test]
    fn regex_extracts_core_fields() {
        let data = parse_with_regex(SAMPLE);
        assert_eq!(data.class_code, "CS 201");
        assert_eq!(data.class_name, "Data Structures and Algorithms");
        assert_eq!(data.instructor, "Dr. Jane Smith");
        assert_eq!(data.instructor_email, "jsmith@state.edu");
        assert_eq!(data.university, "State University");
        assert_eq!(data.term, "Fall 2024");
    }

    #[test]
    fn regex_extracts_dated_assignments() {
        let data = parse_with_regex(SAMPLE);
        let titles: Vec<&str> = data.assignments.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles.len(), 3);
        assert!(titles[0].starts_with("Homework 1"));
        assert_eq!(data.assignments[1].due_date.as_deref(), Some("October 17"));
        assert_eq!(data.assignments[2].due_date.as_deref(), Some("12/10"));
    }

    #[test]
    fn title_line_wins_over_code_line() {
        let data = parse_with_regex("MATH 221\nCourse Title: Linear Algebra\nspring 2025");
        assert_eq!(data.class_code, "MATH 221");
        assert_eq!(data.class_name, "Linear Algebra");
        assert_eq!(data.term, "Spring 2025");
    }

    #[test]
    fn term_and_room_are_not_course_codes() {
        let data = parse_with_regex("FALL 2024\nROOM 1234\nCS 101 Intro to Programming\n");
        assert_eq!(data.class_code, "CS 101");
        assert_eq!(data.class_name, "Intro to Programming");
        assert_eq!(data.term, "Fall 2024");

        assert!(parse_with_regex("FALL 2024, ROOM 1234").class_code.is_empty());
    }

    #[test]
    fn nothing_found_is_empty() {
        assert!(parse_with_regex("just some notes").is_empty());
    }

    #[test]
    fn json_block_survives_fences() {
        let reply = "Sure!\n```json\n{\"classCode\": \"BIO 110\", \"term\": null}\n```";
        let value: Value = serde_json::from_str(extract_json_block(reply).unwrap()).unwrap();
        let data = syllabus_from_json(&value);
        assert_eq!(data.class_code, "BIO 110");
        assert_eq!(data.term, "");
        assert!(extract_json_block("no json here").is_none());
    }

    #[test]
    fn head_respects_char_boundaries() {
        assert_eq!(head("héllo", 2), "hé");
        assert_eq!(head("hi", 10), "hi");
    }

    struct Canned(&'static str);

    #[async_trait]
    impl ChatProvider for Canned {
        fn id(&self) -> &str {
            "local"
        }
        fn model(&self) -> &str {
            "test"
        }
        async fn generate(&self, _messages: Vec<ChatMessage>) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn model_result_is_filled_from_regex() {
        let router = ProviderRouter::new(vec![Arc::new(Canned(
            r#"{"classCode":"CS 201","className":"Data Structures","instructor":"","term":"Fall 2024"}"#,
        ))]);
        let data = SyllabusParser::new(Arc::new(router)).parse(SAMPLE).await;
        assert_eq!(data.class_name, "Data Structures");
        assert_eq!(data.instructor, "Dr. Jane Smith");
        assert_eq!(data.university, "State University");
    }

    #[tokio::test]
    async fn no_model_falls_back_to_regex() {
        let parser = SyllabusParser::new(Arc::new(ProviderRouter::new(vec![])));
        assert_eq!(parser.parse(SAMPLE).await, parse_with_regex(SAMPLE));
    }

    #[tokio::test]
    async fn garbage_reply_falls_back_to_regex() {
        let router = ProviderRouter::new(vec![Arc::new(Canned("I could not read that."))]);
        let data = SyllabusParser::new(Arc::new(router)).parse(SAMPLE).await;
        assert_eq!(data.class_code, "CS 201");
    }
}
