//! Remote job model: status, progress, results.

use serde::{Deserialize, Serialize};

/// Returned by a successful batch submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    #[serde(alias = "task_id")]
    pub job_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub failed: u32,
}

impl JobProgress {
    pub fn new(total: u32, completed: u32, failed: u32) -> Self {
        Self {
            total,
            completed,
            failed,
        }
    }

    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            0
        } else {
            ((self.completed as u64 * 100) / self.total as u64) as u32
        }
    }
}

/// One `poll_status` answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub progress: JobProgress,
}

impl JobSnapshot {
    pub fn new(status: JobStatus, progress: JobProgress) -> Self {
        Self { status, progress }
    }
}

/// Client-side view of one outstanding submission.
#[derive(Debug, Clone)]
pub struct RemoteJob {
    pub id: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub polls: u32,
    pub items: usize,
}

impl RemoteJob {
    pub fn new(id: impl Into<String>, items: usize) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            polls: 0,
            items,
        }
    }

    /// Record a poll answer. Counters never move backwards; a regression
    /// reported by the gateway is clamped and `true` is returned.
    pub fn observe(&mut self, snapshot: &JobSnapshot) -> bool {
        self.polls += 1;
        self.status = snapshot.status;
        let regressed = snapshot.progress.completed < self.progress.completed
            || snapshot.progress.failed < self.progress.failed;
        self.progress = JobProgress {
            total: snapshot.progress.total,
            completed: self.progress.completed.max(snapshot.progress.completed),
            failed: self.progress.failed.max(snapshot.progress.failed),
        };
        regressed
    }
}

/// Per-item entry of a finished job, as the analysis backend reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub success: bool,
    #[serde(default)]
    pub question_text: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub question_type: Option<String>,
    #[serde(default)]
    pub preliminary_answer: Option<String>,
    #[serde(default)]
    pub answer_reason: Option<String>,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub ocr_time: f64,
    #[serde(default)]
    pub ai_time: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl ItemResult {
    pub fn ok(question_text: impl Into<String>) -> Self {
        Self {
            success: true,
            question_text: Some(question_text.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Answer of `fetch_result`. `items` is `None` when the gateway returned no
/// per-item list at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOutcome {
    pub success: bool,
    pub items: Option<Vec<ItemResult>>,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn completed(items: Vec<ItemResult>) -> Self {
        Self {
            success: true,
            items: Some(items),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            items: None,
            error: Some(error.into()),
        }
    }
}

pub const UNRECOGNIZED_QUESTION: &str = "unrecognized question";
pub const UNKNOWN_QUESTION_TYPE: &str = "UNKNOWN";

/// Normalized success record delivered to `on_success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionContent {
    pub question_text: String,
    pub options: Vec<String>,
    pub question_type: String,
    pub raw_text: String,
    pub preliminary_answer: Option<String>,
    pub answer_reason: Option<String>,
    pub ocr_time: f64,
    pub ai_time: f64,
}

impl QuestionContent {
    pub fn is_recognized(&self) -> bool {
        self.question_text != UNRECOGNIZED_QUESTION
    }
}

impl From<ItemResult> for QuestionContent {
    fn from(r: ItemResult) -> Self {
        let non_blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        Self {
            question_text: non_blank(r.question_text)
                .unwrap_or_else(|| UNRECOGNIZED_QUESTION.to_string()),
            options: r.options.unwrap_or_default(),
            question_type: non_blank(r.question_type)
                .unwrap_or_else(|| UNKNOWN_QUESTION_TYPE.to_string()),
            raw_text: r.raw_text.unwrap_or_default(),
            preliminary_answer: non_blank(r.preliminary_answer),
            answer_reason: non_blank(r.answer_reason),
            ocr_time: r.ocr_time,
            ai_time: r.ai_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!("Processing".parse::<JobStatus>(), Ok(JobStatus::Processing));
        assert!("queued".parse::<JobStatus>().is_err());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn test_observe_clamps_regressions() {
        let mut job = RemoteJob::new("job-1", 4);
        let regressed = job.observe(&JobSnapshot::new(
            JobStatus::Processing,
            JobProgress::new(4, 3, 0),
        ));
        assert!(!regressed);
        let regressed = job.observe(&JobSnapshot::new(
            JobStatus::Processing,
            JobProgress::new(4, 1, 0),
        ));
        assert!(regressed);
        assert_eq!(job.progress.completed, 3);
        assert_eq!(job.polls, 2);
    }

    #[test]
    fn test_normalization_defaults() {
        let content = QuestionContent::from(ItemResult {
            success: true,
            question_text: Some("   ".into()),
            ..Default::default()
        });
        assert_eq!(content.question_text, UNRECOGNIZED_QUESTION);
        assert_eq!(content.question_type, UNKNOWN_QUESTION_TYPE);
        assert!(content.options.is_empty());
        assert!(!content.is_recognized());
    }

    #[test]
    fn test_item_result_wire_shape() {
        let json = r#"{"success":true,"question_text":"2+2=?","options":["3","4"],"ocr_time":0.4}"#;
        let r: ItemResult = serde_json::from_str(json).unwrap();
        let content = QuestionContent::from(r);
        assert_eq!(content.question_text, "2+2=?");
        assert_eq!(content.options, vec!["3", "4"]);
        assert_eq!(content.ocr_time, 0.4);
    }
}
