//! Core data structures shared across the crawl pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle of a frontier URL record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl UrlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlStatus::Pending => "pending",
            UrlStatus::Processing => "processing",
            UrlStatus::Completed => "completed",
            UrlStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(UrlStatus::Pending),
            "processing" => Some(UrlStatus::Processing),
            "completed" => Some(UrlStatus::Completed),
            "failed" => Some(UrlStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "in_progress" => Some(JobStatus::InProgress),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frontier entry: one URL known-to-crawl with its retry state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRecord {
    pub id: Uuid,

    /// Normalized URL; the sole identity for page-level records
    pub url: String,

    pub parent_url: Option<String>,
    pub depth: i32,

    /// Larger = claimed sooner
    pub priority: i32,

    pub job_id: Option<Uuid>,
    pub status: UrlStatus,

    /// Incremented atomically with every claim; capped at 3
    pub attempts: i32,

    pub created_at: DateTime<Utc>,

    /// Earliest time the record is eligible for claiming
    pub scheduled_at: DateTime<Utc>,

    pub error_message: Option<String>,
}

/// A crawl request submitted by the operator: seed URL plus traversal bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: Uuid,
    pub url: String,
    pub status: JobStatus,
    pub priority: i32,
    pub depth: i32,
    pub max_depth: i32,

    /// Allowed apex/suffix domains; empty means unrestricted
    pub domain_filter: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub pages_crawled: i32,
    pub pages_indexed: i32,
}

/// Persistent record of a successfully crawled page; the recency oracle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledPage {
    pub id: Uuid,
    pub url: String,
    pub title: Option<String>,

    /// SHA-256 hex of the cleaned content; the change-detection key
    pub content_hash: Option<String>,

    pub last_crawled: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub status_code: Option<i32>,
    pub content_type: Option<String>,
    pub word_count: Option<i32>,
    pub domain: Option<String>,
    pub indexed: bool,
    pub error_count: i32,
}

/// Cached robots.txt for one host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotsRecord {
    pub domain: String,
    pub robots_txt: String,
    pub crawl_delay: i32,
    pub last_updated: DateTime<Utc>,
}

/// An outbound link discovered on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub url: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Document submitted to the full-text index
///
/// The id is a deterministic function of the URL so re-crawls overwrite
/// rather than duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub keywords: Vec<String>,
    pub domain: String,
    pub crawl_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: String,
    pub language: String,
    pub word_count: u32,
    pub content_hash: String,
    pub links: Vec<PageLink>,
    pub metadata: HashMap<String, String>,
}

/// Deterministic document id: lowercase SHA-256 hex of the normalized URL
pub fn document_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 hex digest of arbitrary content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
