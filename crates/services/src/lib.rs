//! Study-tool services: everything between the HTTP layer and the model
//! providers or the database.

pub mod classify;
pub mod content_filter;
pub mod matching;
pub mod pdf;
pub mod rooms;
pub mod store;
pub mod syllabus;
pub mod tutor;
pub mod username;
pub mod vision;
