//! Weighted similarity between a parsed syllabus and existing class groups.
//!
//! Scores are out of 100: course code 40, name overlap up to 30, university
//! 20, term 10. Empty fields never contribute.

use shared::course::{ClassGroup, ClassMatch, SyllabusData};
use std::collections::HashSet;

pub const CODE_WEIGHT: u32 = 40;
pub const NAME_WEIGHT: u32 = 30;
pub const UNIVERSITY_WEIGHT: u32 = 20;
pub const TERM_WEIGHT: u32 = 10;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "into", "from", "intro", "introduction", "course", "class",
    "section",
];

/// Upper-case with spaces and hyphens removed, so "cs-101" equals "CS 101".
pub fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

fn name_tokens(name: &str) -> HashSet<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2 && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

fn same_text(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && !b.is_empty() && a.eq_ignore_ascii_case(b)
}

/// Score of `candidate` against `syllabus`, 0..=100.
pub fn score(syllabus: &SyllabusData, candidate: &ClassGroup) -> u32 {
    let mut total = 0;

    let code = normalize_code(&syllabus.class_code);
    if !code.is_empty() && code == normalize_code(&candidate.class_code) {
        total += CODE_WEIGHT;
    }

    let ours = name_tokens(&syllabus.class_name);
    let theirs = name_tokens(&candidate.class_name);
    let larger = ours.len().max(theirs.len());
    if larger > 0 {
        let overlap = ours.intersection(&theirs).count();
        total += (overlap as u32 * NAME_WEIGHT) / larger as u32;
    }

    if same_text(&syllabus.university, &candidate.university) {
        total += UNIVERSITY_WEIGHT;
    }
    if same_text(&syllabus.term, &candidate.term) {
        total += TERM_WEIGHT;
    }
    total
}

/// Public groups scoring at least `threshold`, best first.
pub fn find_matches(syllabus: &SyllabusData, groups: &[ClassGroup], threshold: u32) -> Vec<ClassMatch> {
    let mut matches: Vec<ClassMatch> = groups
        .iter()
        .filter(|g| g.is_public)
        .filter_map(|g| {
            let score = score(syllabus, g);
            (score > 0 && score >= threshold).then(|| ClassMatch {
                group_id: g.id.clone(),
                class_code: g.class_code.clone(),
                class_name: g.class_name.clone(),
                score,
            })
        })
        .collect();
    // stable sort keeps the store's ordering among equal scores
    matches.sort_by(|a, b| b.score.cmp(&a.score));
    matches
}
