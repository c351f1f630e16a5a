//! Scoring engine: turns an aggregated report into a score, grade and risk level

mod category;
mod engine;

pub use category::Category;
pub use engine::{
    grade_for, next_grade, score, CategoryScore, Penalty, PenaltyRule, RiskLevel, ScoreBreakdown,
};
