//! Inbound push event payload

use serde::Deserialize;

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// The subset of a push event the gateway relies on
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// Commit sha after the push
    #[serde(default)]
    pub after: Option<String>,

    pub repository: Repository,

    #[serde(default)]
    pub head_commit: Option<HeadCommit>,

    #[serde(default)]
    pub pusher: Option<Pusher>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,

    #[serde(default)]
    pub full_name: Option<String>,

    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadCommit {
    pub id: String,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub author: Option<CommitAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitAuthor {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pusher {
    pub name: String,
}

impl PushEvent {
    /// Parse a raw request body
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Branch name for `refs/heads/*` refs; `None` for tags and other refs
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix(BRANCH_REF_PREFIX)
    }

    /// Head commit sha, falling back to `after`
    pub fn commit_sha(&self) -> &str {
        self.head_commit
            .as_ref()
            .map(|c| c.id.as_str())
            .or(self.after.as_deref())
            .unwrap_or("unknown")
    }

    pub fn commit_message(&self) -> Option<&str> {
        self.head_commit.as_ref().map(|c| c.message.as_str())
    }

    pub fn author(&self) -> Option<&str> {
        self.head_commit
            .as_ref()
            .and_then(|c| c.author.as_ref())
            .map(|a| a.name.as_str())
            .or_else(|| self.pusher.as_ref().map(|p| p.name.as_str()))
    }
}
