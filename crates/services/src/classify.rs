//! Keyword classification of student questions by subject and complexity.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Mathematics,
    Science,
    ComputerScience,
    History,
    Literature,
    Languages,
    Business,
    General,
}

impl Subject {
    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Mathematics => "mathematics",
            Subject::Science => "science",
            Subject::ComputerScience => "computer_science",
            Subject::History => "history",
            Subject::Literature => "literature",
            Subject::Languages => "languages",
            Subject::Business => "business",
            Subject::General => "general",
        }
    }

    /// How the tutor should frame answers in this subject.
    fn guidance(self) -> &'static str {
        match self {
            Subject::Mathematics => {
                "Show each step of the working, state the rule being applied, and finish with the final answer."
            }
            Subject::Science => {
                "Explain the underlying concept first, then connect it to an example or experiment."
            }
            Subject::ComputerScience => {
                "Use short code examples where helpful and explain what each part does."
            }
            Subject::History => "Give dates, causes, and consequences, and mention differing interpretations.",
            Subject::Literature => "Refer to themes, characters, and textual evidence.",
            Subject::Languages => "Give example sentences and point out common mistakes.",
            Subject::Business => "Use real-world examples and define any terms of art.",
            Subject::General => "Answer clearly and check the student's understanding.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Basic,
    Intermediate,
    Advanced,
}

impl Complexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Basic => "basic",
            Complexity::Intermediate => "intermediate",
            Complexity::Advanced => "advanced",
        }
    }
}

// Order matters: the subject with the most hits wins, ties go to the earlier entry.
const SUBJECT_KEYWORDS: &[(Subject, &[&str])] = &[
    (
        Subject::Mathematics,
        &[
            "math", "algebra", "calculus", "equation", "derivative", "integral", "geometry",
            "trigonometry", "statistics", "probability", "matrix", "theorem", "polynomial",
            "logarithm", "fraction",
        ],
    ),
    (
        Subject::ComputerScience,
        &[
            "code", "coding", "program", "algorithm", "python", "java", "javascript", "rust",
            "function", "variable", "database", "compiler", "recursion", "data structure",
            "software", "debug",
        ],
    ),
    (
        Subject::Science,
        &[
            "biology", "chemistry", "physics", "molecule", "atom", "cell", "energy", "force",
            "reaction", "evolution", "photosynthesis", "gravity", "experiment", "organism",
            "element",
        ],
    ),
    (
        Subject::History,
        &[
            "history", "war", "revolution", "empire", "century", "ancient", "civilization",
            "dynasty", "treaty", "president", "historical",
        ],
    ),
    (
        Subject::Literature,
        &[
            "novel", "poem", "poetry", "literature", "shakespeare", "author", "character",
            "theme", "metaphor", "essay", "narrative",
        ],
    ),
    (
        Subject::Languages,
        &[
            "spanish", "french", "german", "grammar", "vocabulary", "translate", "conjugate",
            "pronunciation", "verb", "language",
        ],
    ),
    (
        Subject::Business,
        &[
            "business", "marketing", "finance", "economics", "accounting", "management",
            "revenue", "profit", "market", "investment",
        ],
    ),
];

const ADVANCED_WORDS: &[&str] = &[
    "prove", "derive", "analyze", "analyse", "evaluate", "critique", "synthesize",
    "optimize", "complexity", "rigorous", "theoretical",
];

const BASIC_WORDS: &[&str] = &["what is", "define", "definition", "meaning of", "who was", "simple"];

pub fn classify_subject(question: &str) -> Subject {
    let q = question.to_lowercase();
    let mut best = (Subject::General, 0);
    for (subject, keywords) in SUBJECT_KEYWORDS {
        let hits = keywords.iter().filter(|k| q.contains(*k)).count();
        if hits > best.1 {
            best = (*subject, hits);
        }
    }
    best.0
}

pub fn classify_complexity(question: &str) -> Complexity {
    let q = question.to_lowercase();
    if ADVANCED_WORDS.iter().any(|w| q.contains(w)) {
        return Complexity::Advanced;
    }
    let words = q.split_whitespace().count();
    if BASIC_WORDS.iter().any(|w| q.contains(w)) && words <= 15 {
        return Complexity::Basic;
    }
    match words {
        0..=8 => Complexity::Basic,
        9..=40 => Complexity::Intermediate,
        _ => Complexity::Advanced,
    }
}

/// System prompt for the tutor, tuned to subject and level.
pub fn tutor_system_prompt(subject: Subject, complexity: Complexity, course_context: Option<&str>) -> String {
    let mut prompt = format!(
        "You are CourseConnect AI, a friendly and patient study tutor for college students. \
         The question is about {} at a {} level. {} \
         Encourage understanding rather than just giving answers, and keep replies focused.",
        subject.as_str().replace('_', " "),
        complexity.as_str(),
        subject.guidance(),
    );
    if let Some(ctx) = course_context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\n\nCourse context:\n");
        prompt.push_str(ctx);
    }
    prompt
}
