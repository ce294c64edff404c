//! Score report types.

use serde::{Deserialize, Serialize};

use super::open_source::OpenSourceVerdict;

/// Letter grade derived from the total score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl Grade {
    /// Fixed thresholds: 90 / 75 / 60 / 40
    pub fn from_score(score: u32) -> Self {
        match score {
            90.. => Grade::Excellent,
            75..=89 => Grade::Good,
            60..=74 => Grade::Fair,
            40..=59 => Grade::Poor,
            _ => Grade::Critical,
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Grade::Excellent => write!(f, "Excellent"),
            Grade::Good => write!(f, "Good"),
            Grade::Fair => write!(f, "Fair"),
            Grade::Poor => write!(f, "Poor"),
            Grade::Critical => write!(f, "Critical"),
        }
    }
}

/// The five scored categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Performance,
    BundleStrategy,
    NetworkImpact,
    Transparency,
    UserExperience,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Performance,
        Category::BundleStrategy,
        Category::NetworkImpact,
        Category::Transparency,
        Category::UserExperience,
    ];

    /// Fixed weights; they sum to 1.0
    pub fn weight(&self) -> f64 {
        match self {
            Category::Performance => 0.40,
            Category::BundleStrategy => 0.25,
            Category::NetworkImpact => 0.20,
            Category::Transparency => 0.10,
            Category::UserExperience => 0.05,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Performance => "Performance",
            Category::BundleStrategy => "Bundle Strategy",
            Category::NetworkImpact => "Network Impact",
            Category::Transparency => "Transparency",
            Category::UserExperience => "User Experience",
        }
    }
}

/// Points awarded for one sub-metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubMetricScore {
    pub name: String,
    /// Measured value; `None` when the metric was never reported
    pub value: Option<f64>,
    pub unit: String,
    pub points: f64,
    pub max_points: f64,
    pub reason: String,
}

/// Score for one category, out of 100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScore {
    pub category: Category,
    pub score: f64,
    pub max_score: f64,
    pub weight: f64,
    pub details: Vec<SubMetricScore>,
}

impl CategoryScore {
    pub fn new(category: Category, details: Vec<SubMetricScore>) -> Self {
        let max: f64 = details.iter().map(|d| d.max_points).sum();
        let points: f64 = details.iter().map(|d| d.points).sum();
        let score = if max > 0.0 {
            (points / max * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            category,
            score,
            max_score: 100.0,
            weight: category.weight(),
            details,
        }
    }

    /// Contribution to the total score
    pub fn weighted(&self) -> f64 {
        self.score * self.weight
    }
}

/// Final scoring artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    pub app_name: String,
    pub is_baseline: bool,
    pub total_score: u32,
    pub grade: Grade,
    pub categories: Vec<CategoryScore>,
    pub open_source: OpenSourceVerdict,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
}

impl ScoreReport {
    pub fn category(&self, category: Category) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.category == category)
    }
}
