use serde::{Deserialize, Serialize};

use super::task::TaskContext;

/// A code change handed to the supervisor by the git-event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChangeDescription {
    /// Repository root on disk
    pub repo_root: String,

    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub commit_hash: Option<String>,

    #[serde(default)]
    pub pr_number: Option<u64>,

    /// Paths of changed files, relative to the repository root
    #[serde(default)]
    pub files: Vec<String>,

    /// Added plus removed lines
    #[serde(default)]
    pub lines_changed: u64,

    #[serde(default)]
    pub diff: Option<String>,
}

impl ChangeDescription {
    pub fn new(repo_root: impl Into<String>, files: Vec<String>, lines_changed: u64) -> Self {
        Self {
            repo_root: repo_root.into(),
            files,
            lines_changed,
            ..Default::default()
        }
    }

    pub fn files_changed(&self) -> usize {
        self.files.len()
    }

    /// Task context derived from this change
    pub fn task_context(&self) -> TaskContext {
        TaskContext {
            repo_root: self.repo_root.clone(),
            diff: self.diff.clone(),
            commit_hash: self.commit_hash.clone(),
            branch: self.branch.clone(),
            pr_number: self.pr_number,
        }
    }
}

/// Attributes of a change that routing rules can test.
///
/// Produced by the change analyzer; the matched path lists feed the
/// routing trace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ChangeAttributes {
    pub lines_changed: u64,
    pub files_changed: u64,
    pub lockfile_touched: bool,
    pub api_touched: bool,
    pub security_touched: bool,
    pub docs_touched: bool,
    pub config_touched: bool,
    pub tests_touched: bool,
    pub security_files: Vec<String>,
    pub api_files: Vec<String>,
    pub docs_files: Vec<String>,
    pub config_files: Vec<String>,
    pub lockfiles: Vec<String>,
}
