#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use kcon_api::{ApiError, FixtureApi, Fixtures, ListKind};
use kcon_core::{PaginatedRequest, PaginatedResponse, RequestPatch, SearchQuery};
use kcon_query::{fetch, from_fn, CancelHandle, FetchReply, QueryMachine, QueryNotice, QueryOptions, QueryStatus};

/// Fetcher that records every call and cancellation in order and holds
/// replies until the test resolves them.
#[derive(Clone, Default)]
struct Script {
    log: Arc<Mutex<Vec<String>>>,
    replies: Arc<Mutex<Vec<(PaginatedRequest, FetchReply<u32>)>>>,
}

impl Script {
    fn machine(&self) -> QueryMachine<u32> {
        let log = self.log.clone();
        let replies = self.replies.clone();
        let calls = Arc::new(Mutex::new(0u32));
        let fetcher = from_fn(move |req: &PaginatedRequest, reply: FetchReply<u32>| {
            let n = {
                let mut c = calls.lock().unwrap();
                *c += 1;
                *c
            };
            log.lock().unwrap().push(format!("fetch:{n}:page={}", req.page));
            replies.lock().unwrap().push((req.clone(), reply));
            let log = log.clone();
            CancelHandle::from_fn(move || log.lock().unwrap().push(format!("cancel:{n}")))
        });
        QueryMachine::new("numbers", Arc::new(fetcher), QueryOptions::default())
    }

    fn log(&self) -> Vec<String> { self.log.lock().unwrap().clone() }

    /// Remove the held reply issued for `page`.
    fn reply_for(&self, page: u32) -> (PaginatedRequest, FetchReply<u32>) {
        let mut replies = self.replies.lock().unwrap();
        let idx = replies.iter().position(|(r, _)| r.page == page).expect("reply for page");
        replies.remove(idx)
    }

    fn pending(&self) -> usize { self.replies.lock().unwrap().len() }
}

fn page_of(page: u32, total: u64) -> PaginatedResponse<u32> {
    let base = (page - 1) * 10;
    let items = (base..base + 10).filter(|n| u64::from(*n) < total).collect();
    PaginatedResponse::new(items, page, 10, total)
}

#[test]
fn late_response_for_old_page_never_overwrites_newer_page() {
    let script = Script::default();
    let mut q = script.machine();
    q.start();
    let (_, first) = script.reply_for(1);
    first.success(page_of(1, 35));
    q.pump();

    q.query(RequestPatch::page(2));
    q.query(RequestPatch::page(3));
    let (_, p3) = script.reply_for(3);
    p3.success(page_of(3, 35));
    q.pump();
    let (_, p2) = script.reply_for(2);
    p2.success(page_of(2, 35));
    q.pump();

    assert_eq!(q.request().page, 3);
    let resp = q.response().unwrap();
    assert_eq!(resp.page, 3);
    assert_eq!(resp.items, (20..30).collect::<Vec<u32>>());
    assert_eq!(q.status(), QueryStatus::Results);
}

#[test]
fn late_error_for_old_page_is_dropped() {
    let script = Script::default();
    let mut q = script.machine();
    q.start();
    q.query(RequestPatch::page(2));
    let (_, stale) = script.reply_for(1);
    stale.error("gateway timeout");
    q.pump();
    assert!(q.is_loading());
    assert!(q.error().is_none());
}

#[test]
fn new_query_cancels_previous_fetch_exactly_once_before_fetching() {
    let script = Script::default();
    let mut q = script.machine();
    q.start();
    q.query(RequestPatch::search(SearchQuery::name("bad")));
    q.refresh();
    assert_eq!(
        script.log(),
        vec!["fetch:1:page=1", "cancel:1", "fetch:2:page=1", "cancel:2", "fetch:3:page=1"]
    );
}

#[test]
fn settled_response_does_not_cancel_on_next_query() {
    let script = Script::default();
    let mut q = script.machine();
    q.start();
    let (_, r) = script.reply_for(1);
    r.success(page_of(1, 5));
    q.pump();
    q.refresh();
    assert_eq!(script.log(), vec!["fetch:1:page=1", "fetch:2:page=1"]);
}

#[test]
fn query_merges_patch_into_current_request() {
    let script = Script::default();
    let mut q = script.machine();
    q.start();
    q.query(RequestPatch::size(25));
    q.query(RequestPatch::search(SearchQuery::name("x")));
    let req = q.request();
    assert_eq!(req.size, 25);
    assert_eq!(req.page, 1);
    assert_eq!(req.query, Some(SearchQuery::name("x")));
    q.query(RequestPatch::page(2));
    assert_eq!(q.request().query, Some(SearchQuery::name("x")));
    assert_eq!(q.request().size, 25);
}

#[test]
fn blank_search_clears_query() {
    let script = Script::default();
    let mut q = script.machine();
    q.start();
    q.query(RequestPatch::search(SearchQuery::name("x")));
    q.query(RequestPatch::search(SearchQuery::name("   ")));
    assert!(q.request().query.is_none());
    let (_, r) = script.reply_for(1);
    drop(r);
    let (_, r) = script.reply_for(1);
    drop(r);
    let (_, r) = script.reply_for(1);
    r.success(PaginatedResponse::new(Vec::new(), 1, 10, 0));
    q.pump();
    assert_eq!(q.status(), QueryStatus::Empty);
    assert!(q.view().no_results);
    assert!(!q.view().query_empty);
}

#[test]
fn query_with_no_matches_is_query_empty() {
    let script = Script::default();
    let mut q = script.machine();
    q.start();
    q.query(RequestPatch::search(SearchQuery::name("x")));
    let (_, _stale) = script.reply_for(1);
    let (_, r) = script.reply_for(1);
    r.success(PaginatedResponse::new(Vec::new(), 1, 10, 0));
    q.pump();
    let v = q.view();
    assert!(v.query_empty);
    assert!(!v.query_results && !v.no_results && !v.results && !v.loading);
}

#[test]
fn page_navigation_is_guarded_at_both_ends() {
    let script = Script::default();
    let mut q = script.machine();
    q.start();
    assert!(!q.next_page(), "nothing loaded yet");
    assert!(!q.prev_page());
    let (_, r) = script.reply_for(1);
    r.success(page_of(1, 20));
    q.pump();

    assert!(!q.prev_page());
    assert!(q.next_page());
    let (_, r) = script.reply_for(2);
    r.success(page_of(2, 20));
    q.pump();
    assert_eq!(q.request().page, 2);
    assert!(!q.next_page(), "ceil(20/10) = 2 is the last page");
    assert_eq!(script.pending(), 0);
    assert!(q.prev_page());
    assert_eq!(q.request().page, 1);
}

#[test]
fn first_load_error_shows_error_without_data() {
    let script = Script::default();
    let mut q = script.machine();
    q.start();
    let (_, r) = script.reply_for(1);
    r.error("not_found: kafka");
    q.pump();
    let v = q.view();
    assert_eq!(v.status, QueryStatus::Error);
    assert_eq!(v.error, Some("not_found: kafka"));
    assert!(v.first_request);
    assert!(v.items().is_empty());
    let notices = q.drain_notices();
    assert_eq!(notices.last(), Some(&QueryNotice::Error("not_found: kafka".into())));
}

#[test]
fn poll_refresh_leaves_foreground_classification_alone() {
    let script = Script::default();
    let mut q = script.machine();
    q.start();
    let (_, r) = script.reply_for(1);
    r.success(page_of(1, 3));
    q.pump();
    q.drain_notices();

    // Polling disabled: ticks are ignored.
    q.poll_tick();
    assert_eq!(script.pending(), 0);

    q.enable_polling();
    q.poll_tick();
    assert_eq!(script.pending(), 1);
    assert_eq!(q.status(), QueryStatus::Results);
    assert!(!q.is_loading());
    assert!(q.drain_notices().is_empty(), "poll fetches emit no loading notice");

    let (_, r) = script.reply_for(1);
    r.success(page_of(1, 4));
    q.pump();
    assert_eq!(q.response().unwrap().total, 4);
}

#[tokio::test]
async fn foreground_query_supersedes_poll_fetch() {
    let script = Script::default();
    let mut q = script.machine();
    q.start();
    let (_, r) = script.reply_for(1);
    r.success(page_of(1, 3));
    q.pump();
    q.enable_polling();
    q.poll_tick();
    q.refresh();
    assert!(script.log().contains(&"cancel:2".to_string()), "poll fetch cancelled");

    // Whichever reply the poll fetch still delivers is ignored.
    let (_, poll) = script.reply_for(1);
    poll.success(page_of(1, 99));
    q.pump();
    assert!(q.is_loading());
    let (_, fg) = script.reply_for(1);
    fg.success(page_of(1, 5));
    q.pump();
    assert_eq!(q.response().unwrap().total, 5);
    q.stop();
}

#[test]
fn paused_polling_skips_ticks() {
    let script = Script::default();
    let mut q = script.machine();
    q.start();
    let (_, r) = script.reply_for(1);
    r.success(page_of(1, 3));
    q.pump();
    q.enable_polling();
    q.pause_polling(true);
    q.poll_tick();
    assert_eq!(script.pending(), 0);
    q.pause_polling(false);
    q.poll_tick();
    assert_eq!(script.pending(), 1);
}

#[test]
fn before_set_response_sees_outgoing_items() {
    let script = Script::default();
    let seen: Arc<Mutex<Vec<Vec<u32>>>> = Arc::default();
    let s = seen.clone();
    let mut q = script.machine().on_before_set_response(move |old| s.lock().unwrap().push(old));
    q.start();
    let (_, r) = script.reply_for(1);
    r.success(PaginatedResponse::new(vec![1, 2], 1, 10, 2));
    q.pump();
    assert!(seen.lock().unwrap().is_empty());
    q.refresh();
    let (_, r) = script.reply_for(1);
    r.success(PaginatedResponse::new(vec![3], 1, 10, 1));
    q.pump();
    assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2]]);
}

#[tokio::test]
async fn drives_fixture_api_through_spawned_tasks() {
    let api = Arc::new(FixtureApi::new(Fixtures::demo().unwrap()));
    let mut q = QueryMachine::new("kafkas", fetch::kafka_instances(api.clone()), QueryOptions::default());
    q.start();
    q.settle().await;
    let names: Vec<&str> = q.items().iter().map(|k| k.name.as_str()).collect();
    assert_eq!(names, vec!["badwords", "goodwords"]);
    assert!(q.view().results);

    q.query(RequestPatch::search(SearchQuery::name("bad")));
    q.settle().await;
    assert!(q.view().query_results);
    assert_eq!(q.items().len(), 1);

    api.set_list_failure(ListKind::Kafkas, Some(ApiError::NotFound("kafkas".into())));
    q.refresh();
    q.settle().await;
    assert_eq!(q.status(), QueryStatus::Error);
    assert_eq!(q.items().len(), 1, "previous data stays visible");

    api.set_list_failure(ListKind::Kafkas, None);
    q.refresh();
    q.settle().await;
    assert_eq!(q.status(), QueryStatus::QueryResults);
}

#[tokio::test(start_paused = true)]
async fn poll_timer_reissues_the_current_request() {
    let api = Arc::new(FixtureApi::new(Fixtures::demo().unwrap()));
    let options = QueryOptions { page_size: 10, poll_interval: std::time::Duration::from_millis(5000) };
    let mut q = QueryMachine::new("namespaces", fetch::namespaces(api), options);
    q.start();
    q.settle().await;
    q.drain_notices();
    q.enable_polling();
    tokio::time::sleep(std::time::Duration::from_millis(5100)).await;
    q.pump();
    q.settle().await;
    let notices = q.drain_notices();
    assert!(matches!(notices.as_slice(), [QueryNotice::Success { page: 1, .. }]), "{notices:?}");
    q.disable_polling();
}
