//! Canned answers used when no provider could be reached.
//!
//! Chosen by simple keyword matching on the student's question so the chat
//! still says something sensible while the AI services are down.

const GREETING: &str = "Hi there! I'm your CourseConnect study assistant. The AI service is \
taking a short break, but I'm still here. Ask me about your course, and try again in a moment \
for a full answer.";

const THANKS: &str = "You're welcome! Good luck with your studies, and come back any time you \
have another question.";

const HELP: &str = "I can help you understand course material, review for exams, plan \
assignments, and work through practice problems. The AI service is unavailable right now, so \
please try your question again in a moment.";

const MATH: &str = "I can't reach the AI service right now, but here's a tip for math \
problems: write down what is given and what you need to find, work one step at a time, and \
check your answer by plugging it back in. Try again shortly for a worked solution.";

const WRITING: &str = "I can't reach the AI service right now. For writing assignments, start \
with a clear thesis, outline your main points, and support each with evidence. Try again \
shortly for detailed feedback.";

const SCIENCE: &str = "I can't reach the AI service right now. For science topics, try \
explaining the concept in your own words and connecting it to an example from lecture. Try \
again shortly for a full explanation.";

const STUDY: &str = "I can't reach the AI service right now, but a good study plan helps: \
review your syllabus for upcoming deadlines, space out practice sessions, and test yourself \
instead of rereading. Try again shortly for more help.";

const DEFAULT: &str = "I'm having trouble connecting to the AI service right now. Please try \
again in a moment. Your question has not been lost; just send it again.";

/// Pick the canned reply for `question`. Never empty.
pub fn canned_response(question: &str) -> &'static str {
    let q = question.to_lowercase();
    let words: Vec<&str> = q
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has_word = |list: &[&str]| words.iter().any(|w| list.contains(w));
    let has_phrase = |list: &[&str]| list.iter().any(|p| q.contains(p));

    if has_word(&["thanks", "thank", "thx"]) {
        return THANKS;
    }
    if has_word(&["hello", "hi", "hey", "greetings"]) || has_phrase(&["good morning", "good evening"]) {
        return GREETING;
    }
    if has_word(&["help"]) || has_phrase(&["what can you do"]) {
        return HELP;
    }
    if has_word(&["math", "equation", "solve", "algebra", "calculus", "derivative", "integral"]) {
        return MATH;
    }
    if has_word(&["essay", "write", "writing", "thesis", "paper"]) {
        return WRITING;
    }
    if has_word(&["science", "biology", "chemistry", "physics", "experiment"]) {
        return SCIENCE;
    }
    if has_word(&["study", "exam", "test", "quiz", "midterm", "final", "review"]) {
        return STUDY;
    }
    DEFAULT
}
