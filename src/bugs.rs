use std::time::{Duration, Instant};

use crate::api::{ApiClient, BugQuery};
use crate::error::Result;
use crate::models::{Bug, BugPriority, BugStatus, SessionUser, UserRole};
use crate::workflow;

pub const PAGE_SIZE: usize = 10;
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Client-side filter over the fetched bug set. Free text matches
/// case-insensitively against title and id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BugFilter {
    pub status: Option<BugStatus>,
    pub priority: Option<BugPriority>,
    pub search: String,
}

impl BugFilter {
    fn matches(&self, bug: &Bug) -> bool {
        if let Some(status) = self.status {
            if bug.status != status {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if bug.priority != priority {
                return false;
            }
        }
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        bug.title.to_lowercase().contains(&needle) || bug.id.to_lowercase().contains(&needle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Created,
    Updated,
    Priority,
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" => Ok(SortField::Created),
            "updated" => Ok(SortField::Updated),
            "priority" => Ok(SortField::Priority),
            other => Err(format!("unknown sort field {other:?} (created|updated|priority)")),
        }
    }
}

/// Trailing-edge debounce: the latest value wins, and it is only released
/// after `delay` of caller inactivity.
#[derive(Debug)]
pub struct Debounce {
    delay: Duration,
    pending: Option<(String, Instant)>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Debounce { delay, pending: None }
    }

    pub fn input(&mut self, value: String, now: Instant) {
        self.pending = Some((value, now));
    }

    pub fn poll(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((_, at)) if now.duration_since(*at) >= self.delay => {
                self.pending.take().map(|(v, _)| v)
            }
            _ => None,
        }
    }
}

/// View state for the bug list: the fetched set plus filters, sort and page.
/// The rendered page is always a pure function of those inputs; there is no
/// other ordering state.
pub struct BugListView {
    bugs: Vec<Bug>,
    filter: BugFilter,
    sort_by: SortField,
    descending: bool,
    page: usize,
    search_debounce: Debounce,
}

impl Default for BugListView {
    fn default() -> Self {
        Self::new()
    }
}

impl BugListView {
    pub fn new() -> Self {
        BugListView {
            bugs: Vec::new(),
            filter: BugFilter::default(),
            sort_by: SortField::Created,
            descending: true,
            page: 1,
            search_debounce: Debounce::new(SEARCH_DEBOUNCE),
        }
    }

    /// Refetch the whole collection. On failure the previous set stays put
    /// and the error goes to the caller.
    pub async fn refresh(&mut self, api: &ApiClient, mine: bool) -> Result<()> {
        let bugs = if mine {
            api.my_bugs().await?
        } else {
            api.list_bugs(&BugQuery::default()).await?
        };
        self.set_bugs(bugs);
        Ok(())
    }

    pub fn set_bugs(&mut self, bugs: Vec<Bug>) {
        self.bugs = bugs;
    }

    pub fn filter(&self) -> &BugFilter {
        &self.filter
    }

    pub fn sort(&self) -> (SortField, bool) {
        (self.sort_by, self.descending)
    }

    pub fn page(&self) -> usize {
        self.page
    }

    // Every filter change drops back to page 1.

    pub fn set_status_filter(&mut self, status: Option<BugStatus>) {
        self.filter.status = status;
        self.page = 1;
    }

    pub fn set_priority_filter(&mut self, priority: Option<BugPriority>) {
        self.filter.priority = priority;
        self.page = 1;
    }

    pub fn set_search(&mut self, query: &str) {
        self.filter.search = query.to_string();
        self.page = 1;
    }

    /// Search-as-you-type entry point; the query is held until
    /// [`apply_pending_search`] sees 300ms of inactivity.
    pub fn type_search(&mut self, query: &str, now: Instant) {
        self.search_debounce.input(query.to_string(), now);
    }

    /// Returns true if a debounced query was applied.
    pub fn apply_pending_search(&mut self, now: Instant) -> bool {
        if let Some(query) = self.search_debounce.poll(now) {
            self.set_search(&query);
            true
        } else {
            false
        }
    }

    pub fn set_sort_field(&mut self, field: SortField) {
        self.sort_by = field;
        self.page = 1;
    }

    pub fn toggle_direction(&mut self) {
        self.descending = !self.descending;
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn next_page(&mut self) {
        let last = self.total_pages().max(1);
        self.page = (self.page + 1).min(last);
    }

    pub fn prev_page(&mut self) {
        self.page = self.page.saturating_sub(1).max(1);
    }

    /// The filtered and sorted collection. Stable sort: ties keep the
    /// server's order, so equal keys never shuffle between renders.
    pub fn visible(&self) -> Vec<&Bug> {
        let mut out: Vec<&Bug> = self.bugs.iter().filter(|b| self.filter.matches(b)).collect();
        out.sort_by(|a, b| {
            let ord = match self.sort_by {
                SortField::Created => a.created_date.cmp(&b.created_date),
                SortField::Updated => {
                    let a_at = a.updated_date.unwrap_or(a.created_date);
                    let b_at = b.updated_date.unwrap_or(b.created_date);
                    a_at.cmp(&b_at)
                }
                SortField::Priority => a.priority.rank().cmp(&b.priority.rank()),
            };
            if self.descending { ord.reverse() } else { ord }
        });
        out
    }

    pub fn total_matches(&self) -> usize {
        self.bugs.iter().filter(|b| self.filter.matches(b)).count()
    }

    pub fn total_pages(&self) -> usize {
        self.total_matches().div_ceil(PAGE_SIZE)
    }

    /// The slice of the pipeline output shown on the current page.
    pub fn page_items(&self) -> Vec<&Bug> {
        let visible = self.visible();
        let start = (self.page - 1) * PAGE_SIZE;
        visible.into_iter().skip(start).take(PAGE_SIZE).collect()
    }
}

/// View state for a single bug: loads via the direct single-item fetch,
/// refetches after each mutation, and keeps the previous record whenever an
/// operation fails.
pub struct BugDetailView {
    id: String,
    bug: Option<Bug>,
}

impl BugDetailView {
    pub fn new(id: &str) -> Self {
        BugDetailView {
            id: id.to_string(),
            bug: None,
        }
    }

    pub fn bug(&self) -> Option<&Bug> {
        self.bug.as_ref()
    }

    pub async fn load(&mut self, api: &ApiClient) -> Result<()> {
        let bug = api.get_bug(&self.id).await?;
        self.bug = Some(bug);
        Ok(())
    }

    pub async fn update_status(&mut self, api: &ApiClient, status: BugStatus) -> Result<()> {
        api.update_status(&self.id, status).await?;
        self.load(api).await
    }

    pub async fn assign_to_self(&mut self, api: &ApiClient) -> Result<()> {
        api.assign_bug(&self.id).await?;
        self.load(api).await
    }

    /// One-click transitions offered to the current user. Only developers
    /// get the menu, and the table is advisory: the server still has the
    /// last word on any transition.
    pub fn available_transitions(&self, user: Option<&SessionUser>) -> &'static [BugStatus] {
        match (user, &self.bug) {
            (Some(u), Some(bug)) if u.role == UserRole::Developer => {
                workflow::next_statuses(bug.status)
            }
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bug(id: &str, title: &str, priority: BugPriority, status: BugStatus, day: u32) -> Bug {
        Bug {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            priority,
            status,
            created_date: Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap(),
            updated_date: None,
            reporter_name: None,
            assigned_to_name: None,
            reproduction_steps: None,
            attachments: None,
        }
    }

    fn view_with(bugs: Vec<Bug>) -> BugListView {
        let mut view = BugListView::new();
        view.set_bugs(bugs);
        view
    }

    #[test]
    fn priority_sort_descending() {
        let mut view = view_with(vec![
            bug("1", "a", BugPriority::Low, BugStatus::Open, 1),
            bug("2", "b", BugPriority::Critical, BugStatus::Open, 2),
            bug("3", "c", BugPriority::Medium, BugStatus::Open, 3),
            bug("4", "d", BugPriority::High, BugStatus::Open, 4),
        ]);
        view.set_sort_field(SortField::Priority);
        let order: Vec<_> = view.visible().iter().map(|b| b.priority).collect();
        assert_eq!(
            order,
            vec![
                BugPriority::Critical,
                BugPriority::High,
                BugPriority::Medium,
                BugPriority::Low
            ]
        );
    }

    #[test]
    fn created_sort_both_directions() {
        let mut view = view_with(vec![
            bug("1", "a", BugPriority::Low, BugStatus::Open, 5),
            bug("2", "b", BugPriority::Low, BugStatus::Open, 1),
            bug("3", "c", BugPriority::Low, BugStatus::Open, 9),
        ]);
        let ids: Vec<_> = view.visible().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);

        view.toggle_direction();
        let ids: Vec<_> = view.visible().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1", "3"]);
    }

    #[test]
    fn updated_sort_falls_back_to_created() {
        let mut newer_update = bug("1", "a", BugPriority::Low, BugStatus::Open, 1);
        newer_update.updated_date = Some(Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap());
        let created_later = bug("2", "b", BugPriority::Low, BugStatus::Open, 10);

        let mut view = view_with(vec![created_later, newer_update]);
        view.set_sort_field(SortField::Updated);
        let ids: Vec<_> = view.visible().iter().map(|b| b.id.as_str()).collect();
        // bug 1 was created first but touched last
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let bugs: Vec<Bug> = (0..6)
            .map(|i| bug(&format!("b{i}"), "same", BugPriority::Medium, BugStatus::Open, 3))
            .collect();
        let mut view = view_with(bugs);
        view.set_sort_field(SortField::Priority);
        let ids: Vec<_> = view.visible().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b0", "b1", "b2", "b3", "b4", "b5"]);
        view.toggle_direction();
        let ids: Vec<_> = view.visible().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b0", "b1", "b2", "b3", "b4", "b5"]);
    }

    #[test]
    fn filters_compose() {
        let mut view = view_with(vec![
            bug("a1", "Login broken", BugPriority::High, BugStatus::Open, 1),
            bug("a2", "Login slow", BugPriority::Low, BugStatus::Open, 2),
            bug("a3", "Crash on save", BugPriority::High, BugStatus::Closed, 3),
        ]);
        view.set_status_filter(Some(BugStatus::Open));
        view.set_priority_filter(Some(BugPriority::High));
        view.set_search("LOGIN");
        let ids: Vec<_> = view.visible().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["a1"]);
    }

    #[test]
    fn search_matches_id_case_insensitively() {
        let mut view = view_with(vec![
            bug("AB12cd", "something", BugPriority::Low, BugStatus::Open, 1),
            bug("zz99", "other", BugPriority::Low, BugStatus::Open, 2),
        ]);
        view.set_search("ab12");
        let ids: Vec<_> = view.visible().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["AB12cd"]);
    }

    #[test]
    fn twenty_five_bugs_paginate_into_three_pages() {
        let bugs: Vec<Bug> = (0..25)
            .map(|i| bug(&format!("b{i:02}"), "t", BugPriority::Low, BugStatus::Open, 1))
            .collect();
        let mut view = view_with(bugs);
        assert_eq!(view.total_pages(), 3);

        view.set_page(3);
        let page3: Vec<_> = view.page_items().iter().map(|b| b.id.clone()).collect();
        assert_eq!(page3.len(), 5);
        let all: Vec<_> = view.visible().iter().map(|b| b.id.clone()).collect();
        assert_eq!(page3, all[20..].to_vec());

        view.set_page(4);
        assert!(view.page_items().is_empty());
    }

    #[test]
    fn filter_changes_reset_page() {
        let bugs: Vec<Bug> = (0..25)
            .map(|i| bug(&format!("b{i:02}"), "t", BugPriority::Low, BugStatus::Open, 1))
            .collect();
        let mut view = view_with(bugs);

        view.set_page(3);
        view.set_status_filter(None);
        assert_eq!(view.page(), 1);

        view.set_page(3);
        view.set_priority_filter(Some(BugPriority::Low));
        assert_eq!(view.page(), 1);

        view.set_page(3);
        view.set_search("b0");
        assert_eq!(view.page(), 1);

        view.set_page(2);
        view.set_sort_field(SortField::Priority);
        assert_eq!(view.page(), 1);
    }

    #[test]
    fn page_navigation_clamps() {
        let bugs: Vec<Bug> = (0..15)
            .map(|i| bug(&format!("b{i:02}"), "t", BugPriority::Low, BugStatus::Open, 1))
            .collect();
        let mut view = view_with(bugs);
        view.prev_page();
        assert_eq!(view.page(), 1);
        view.next_page();
        assert_eq!(view.page(), 2);
        view.next_page();
        assert_eq!(view.page(), 2);
    }

    #[test]
    fn debounce_releases_after_quiet_period() {
        let mut view = view_with(vec![
            bug("a1", "Login broken", BugPriority::High, BugStatus::Open, 1),
            bug("a2", "Crash", BugPriority::Low, BugStatus::Open, 2),
        ]);
        let start = Instant::now();
        view.type_search("log", start);
        view.type_search("login", start + Duration::from_millis(100));

        // still typing: nothing applied yet
        assert!(!view.apply_pending_search(start + Duration::from_millis(200)));
        assert_eq!(view.filter().search, "");
        assert_eq!(view.visible().len(), 2);

        // 300ms after the last keystroke the final query lands
        assert!(view.apply_pending_search(start + Duration::from_millis(401)));
        assert_eq!(view.filter().search, "login");
        assert_eq!(view.visible().len(), 1);

        // nothing pending afterwards
        assert!(!view.apply_pending_search(start + Duration::from_millis(800)));
    }

    #[test]
    fn pipeline_is_deterministic() {
        let bugs: Vec<Bug> = (0..12)
            .map(|i| {
                bug(
                    &format!("b{i:02}"),
                    if i % 2 == 0 { "even" } else { "odd" },
                    if i % 3 == 0 { BugPriority::High } else { BugPriority::Low },
                    BugStatus::Open,
                    1 + (i % 5) as u32,
                )
            })
            .collect();
        let mut view = view_with(bugs);
        view.set_priority_filter(Some(BugPriority::High));
        view.set_sort_field(SortField::Created);

        let first: Vec<_> = view.page_items().iter().map(|b| b.id.clone()).collect();
        for _ in 0..5 {
            let again: Vec<_> = view.page_items().iter().map(|b| b.id.clone()).collect();
            assert_eq!(first, again);
        }
    }

    mod detail {
        use super::*;
        use crate::api::ApiClient;
        use crate::session::TokenStore;

        fn dead_api(dir: &tempfile::TempDir) -> ApiClient {
            // no stored tokens: any authed call fails before touching the wire
            ApiClient::new(
                "http://localhost:5000",
                TokenStore::new(dir.path().join("session.json")),
            )
        }

        #[tokio::test]
        async fn failed_update_leaves_bug_untouched() {
            let dir = tempfile::tempdir().unwrap();
            let api = dead_api(&dir);
            let mut view = BugDetailView::new("b1");
            view.bug = Some(bug("b1", "t", BugPriority::Low, BugStatus::Open, 1));

            let err = view.update_status(&api, BugStatus::InProgress).await;
            assert!(err.is_err());
            assert_eq!(view.bug().unwrap().status, BugStatus::Open);

            let err = view.assign_to_self(&api).await;
            assert!(err.is_err());
            assert!(view.bug().unwrap().assigned_to_name.is_none());
        }

        #[test]
        fn transitions_only_for_developers() {
            let mut view = BugDetailView::new("b1");
            view.bug = Some(bug("b1", "t", BugPriority::Low, BugStatus::InProgress, 1));

            let dev = SessionUser {
                id: "u1".into(),
                name: "Dev".into(),
                email: "dev@bug.com".into(),
                role: UserRole::Developer,
                can_report_bugs: true,
            };
            assert_eq!(
                view.available_transitions(Some(&dev)),
                &[BugStatus::Resolved, BugStatus::Open, BugStatus::Closed]
            );

            let reporter = SessionUser {
                role: UserRole::Reporter,
                ..dev.clone()
            };
            assert!(view.available_transitions(Some(&reporter)).is_empty());
            assert!(view.available_transitions(None).is_empty());

            let unloaded = BugDetailView::new("b2");
            assert!(unloaded.available_transitions(Some(&dev)).is_empty());
        }
    }
}
