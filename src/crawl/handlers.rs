//! Fetch handlers.
//!
//! One handler per job type. All three share the same preamble: call the
//! upstream, then publish the rate snapshot and a request-log entry for
//! every call that produced a response (success or failure) before
//! acting on the outcome. Telemetry failures are logged and swallowed;
//! they never fail a job.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cache::{ObservabilityCache, RateClass, RequestEntry};
use crate::github::{effective_page, Fetched, FetchError, GithubClient, Issue};
use crate::store::Store;
use crate::types::{IssueRef, RepoId};

use super::payload::{IssuePage, JobPayload, RepoPage, UserPage};
use super::enqueue_job;

/// Executes fetch jobs: calls the upstream, persists results and emits
/// follow-up jobs as the crawl discovers more pages and issues.
pub struct Crawler {
    store: Store,
    cache: Arc<ObservabilityCache>,
    github: GithubClient,
    cancel: CancellationToken,
}

impl Crawler {
    pub fn new(
        store: Store,
        cache: Arc<ObservabilityCache>,
        github: GithubClient,
        cancel: CancellationToken,
    ) -> Self {
        Crawler {
            store,
            cache,
            github,
            cancel,
        }
    }

    /// Dispatches a decoded payload to its handler.
    pub async fn handle(&self, payload: &JobPayload) -> Result<(), FetchError> {
        match payload {
            JobPayload::Repo(page) => self.repo_page(page).await,
            JobPayload::User(page) => self.user_page(page).await,
            JobPayload::Issue(page) => self.issue_page(page).await,
        }
    }

    /// Crawls one page of a repository's issue listing.
    async fn repo_page(&self, job: &RepoPage) -> Result<(), FetchError> {
        let repo = RepoId::new(&job.owner, &job.name);
        let fetched = self
            .github
            .list_repo_issues(&repo, job.page, &self.cancel)
            .await;
        self.publish(
            RateClass::Core,
            format!("list {repo} issues"),
            job.page,
            &fetched,
        )
        .await;

        let page = fetched.outcome?;
        self.walk_issues(&page.items).await?;

        self.enqueue_successor(page.next_page, job.page, |next| {
            JobPayload::Repo(RepoPage {
                owner: job.owner.clone(),
                name: job.name.clone(),
                page: next,
            })
        })
        .await
    }

    /// Crawls one page of the issues a user has commented on.
    async fn user_page(&self, job: &UserPage) -> Result<(), FetchError> {
        let fetched = self
            .github
            .search_commenter_issues(&job.login, job.page, &self.cancel)
            .await;
        self.publish(
            RateClass::Search,
            format!("search issues commented by {}", job.login),
            job.page,
            &fetched,
        )
        .await;

        let page = fetched.outcome?;
        self.walk_issues(&page.items).await?;

        self.enqueue_successor(page.next_page, job.page, |next| {
            JobPayload::User(UserPage {
                login: job.login.clone(),
                page: next,
            })
        })
        .await
    }

    /// Crawls one page of a single issue's comments.
    async fn issue_page(&self, job: &IssuePage) -> Result<(), FetchError> {
        let issue =
            IssueRef::parse(&job.url).map_err(|e| FetchError::permanent(e.to_string()))?;

        let fetched = self
            .github
            .list_issue_comments(&issue, job.page, &self.cancel)
            .await;
        self.publish(
            RateClass::Core,
            format!("list {issue} comments"),
            job.page,
            &fetched,
        )
        .await;

        let page = fetched.outcome?;
        let repo = issue.repo.to_string();
        for comment in &page.items {
            self.store.insert_comment(comment, &repo).await?;
        }

        self.enqueue_successor(page.next_page, job.page, |next| {
            JobPayload::Issue(IssuePage {
                url: job.url.clone(),
                page: next,
            })
        })
        .await
    }

    /// Persists fresh issues and spawns a comment job per changed issue,
    /// preserving upstream page order.
    async fn walk_issues(&self, issues: &[Issue]) -> Result<(), FetchError> {
        for issue in issues {
            if self.store.is_up_to_date(issue).await? {
                continue;
            }

            self.store.insert_issue(issue).await?;
            enqueue_job(
                &self.store,
                &self.cache,
                &JobPayload::Issue(IssuePage {
                    url: issue.url.clone(),
                    page: 1,
                }),
            )
            .await?;
        }
        Ok(())
    }

    /// Enqueues the next page of the same listing iff the upstream says
    /// there is one beyond the page just fetched.
    async fn enqueue_successor(
        &self,
        next_page: Option<u32>,
        current: u32,
        make: impl FnOnce(u32) -> JobPayload,
    ) -> Result<(), FetchError> {
        if let Some(next) = next_page {
            if next > effective_page(current) {
                enqueue_job(&self.store, &self.cache, &make(next)).await?;
            }
        }
        Ok(())
    }

    /// Publishes rate and request telemetry for a call that produced a
    /// response. Best effort: failures degrade the UI, not the job.
    async fn publish<T>(
        &self,
        class: RateClass,
        message: String,
        page: u32,
        fetched: &Fetched<T>,
    ) {
        let Some(status) = fetched.report.status else {
            return;
        };

        if let Some(rate) = &fetched.report.rate {
            if let Err(e) = self.cache.update_rate(class, rate).await {
                warn!(error = %e, "failed to publish rate snapshot");
            }
        }

        let last_page = fetched.outcome.as_ref().ok().and_then(|p| p.last_page);
        let entry = RequestEntry::new(message, page, last_page, status, fetched.report.duration);
        if let Err(e) = self.cache.append_request(entry).await {
            warn!(error = %e, "failed to append request log entry");
        }
    }
}
