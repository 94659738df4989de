use rep_leaderboard::{
    Category, IdentitySignature, RankedEntry, Submission, TransitionPlan, ViewPhase,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LeaderboardPayload {
    pub(crate) category: Category,
    pub(crate) phase: ViewPhase,
    pub(crate) entries: Vec<RankedEntry>,
    pub(crate) last_plan: Option<TransitionPlan>,
    pub(crate) ts: u64,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ViewStatusPayload {
    pub(crate) category: Category,
    pub(crate) phase: ViewPhase,
    pub(crate) pending_updates: usize,
    pub(crate) records: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshPayload {
    pub(crate) refreshed: bool,
    pub(crate) rows: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmissionAccepted {
    pub(crate) signature: IdentitySignature,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HintsHiddenPayload {
    pub(crate) version: u64,
}

#[derive(Deserialize)]
pub(crate) struct CategoryRequest {
    #[serde(alias = "gender")]
    pub(crate) category: String,
}

#[derive(Deserialize)]
pub(crate) struct LeaderboardParams {
    pub(crate) category: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct RefreshParams {
    pub(crate) force: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmissionRequest {
    pub(crate) name: Option<String>,
    pub(crate) first_name: Option<String>,
    #[serde(alias = "familyName")]
    pub(crate) last_name: Option<String>,
    #[serde(alias = "count")]
    pub(crate) score: i64,
    #[serde(alias = "gender")]
    pub(crate) category: Option<String>,
}

impl SubmissionRequest {
    pub(crate) fn into_submission(self) -> Result<Submission, String> {
        if self.score < 0 {
            return Err("score must not be negative".to_string());
        }
        let category = self.category.as_deref().and_then(Category::parse);
        let submission = match (self.first_name, self.name) {
            (Some(first_name), _) if !first_name.trim().is_empty() => Submission {
                first_name: first_name.trim().to_string(),
                last_name: self.last_name.unwrap_or_default().trim().to_string(),
                score: self.score,
                category,
            },
            (_, Some(name)) => Submission::from_display_name(&name, self.score, category),
            _ => return Err("name or firstName is required".to_string()),
        };
        if submission.first_name.is_empty() {
            return Err("name must not be blank".to_string());
        }
        Ok(submission)
    }
}
