//! Submit, poll, resume and apply across the whole batch pipeline.

mod common;

use std::time::Duration;

use paperstore::batch::{BatchItemResult, BatchState};
use paperstore::config::BatchConfig;
use paperstore::db::batch_job_repo::{self, BatchJobRow, BatchJobState};
use paperstore::db::paper_repo;
use paperstore::MetadataSupervisor;

use common::{text, TestHarness};

async fn run_loop_to_completion(supervisor: &MetadataSupervisor) {
    supervisor.start().expect("Failed to start metadata loop");
    for _ in 0..500 {
        if !supervisor.status().running {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("metadata loop did not finish");
}

#[tokio::test]
async fn test_partial_results_fill_only_the_answered_paper() {
    let h = TestHarness::new();
    h.add_paper("P1");
    h.add_paper_with("P2", |p| {
        p.abstract_text = Some("Existing abstract".to_string());
        p.published_date = Some("2018-05-01".to_string());
    });
    let before_p2 = h.paper("P2");

    let supervisor = h.supervisor(BatchConfig::default());
    run_loop_to_completion(&supervisor).await;

    let jobs = h.jobs(BatchJobState::Submitted);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].member_ids, vec!["P1".to_string(), "P2".to_string()]);
    assert_eq!(h.client.member_ids(&jobs[0].external_name), jobs[0].member_ids);

    h.client.succeed(
        &jobs[0].external_name,
        vec![
            text(r#"{"title":"T1","authors":["A"],"date":"2020","abstract":"X"}"#),
            BatchItemResult::Error("content blocked".to_string()),
        ],
    );
    let outcome = supervisor.poller().unwrap().poll_once().await.unwrap();
    assert_eq!(outcome.applied, 1);
    assert_eq!(outcome.remaining, 0);

    let p1 = h.paper("P1");
    assert_eq!(p1.title.as_deref(), Some("Paper P1"));
    assert_eq!(p1.authors, vec!["A".to_string()]);
    assert_eq!(p1.published_date.as_deref(), Some("2020-01-01"));
    assert_eq!(p1.abstract_text.as_deref(), Some("X"));
    assert_eq!(h.paper("P2"), before_p2);

    let job = batch_job_repo::find_by_id(&h.db, &jobs[0].id)
        .unwrap()
        .unwrap();
    assert_eq!(job.state, BatchJobState::Applied);
    assert_eq!(job.papers_done, 1);
    assert!(job.completed_at.is_some());
    assert_eq!(supervisor.status().papers_done, 1);
}

#[tokio::test]
async fn test_resume_applies_jobs_from_previous_process() {
    let h = TestHarness::new();
    h.add_paper("a");
    h.add_paper("b");

    // Written by a process that has since exited.
    let job = BatchJobRow::submitted(
        "batches/42",
        vec!["b".to_string(), "a".to_string()],
        "2026-01-01T00:00:00.000Z",
    );
    batch_job_repo::insert(&h.db, &job).unwrap();
    h.client.succeed(
        "batches/42",
        vec![
            text(r#"{"abstract":"About b"}"#),
            text("```json\n{\"abstract\":\"About a\"}\n```"),
        ],
    );

    let supervisor = h.restarted_supervisor(BatchConfig::default());
    assert_eq!(supervisor.resume().unwrap(), 1);
    assert!(supervisor.poller_running());
    assert!(!supervisor.status().running);

    let outcome = supervisor.poller().unwrap().poll_once().await.unwrap();
    assert_eq!(outcome.resolved, 1);
    assert_eq!(h.paper("a").abstract_text.as_deref(), Some("About a"));
    assert_eq!(h.paper("b").abstract_text.as_deref(), Some("About b"));
    assert!(h.jobs(BatchJobState::Submitted).is_empty());
}

#[tokio::test]
async fn test_extra_results_are_ignored() {
    let h = TestHarness::new();
    h.add_paper("a");
    h.add_paper("b");
    let job = BatchJobRow::submitted(
        "batches/1",
        vec!["a".to_string(), "b".to_string()],
        "2026-01-01T00:00:00.000Z",
    );
    batch_job_repo::insert(&h.db, &job).unwrap();
    h.client.succeed(
        "batches/1",
        vec![
            text(r#"{"abstract":"A"}"#),
            text(r#"{"abstract":"B"}"#),
            text(r#"{"abstract":"C"}"#),
        ],
    );

    let supervisor = h.supervisor(BatchConfig::default());
    let outcome = supervisor.poller().unwrap().poll_once().await.unwrap();

    assert_eq!(outcome.applied, 2);
    assert_eq!(h.paper("a").abstract_text.as_deref(), Some("A"));
    assert_eq!(h.paper("b").abstract_text.as_deref(), Some("B"));
    let job = batch_job_repo::find_by_id(&h.db, &job.id).unwrap().unwrap();
    assert_eq!(job.papers_done, 2);
}

#[tokio::test]
async fn test_failed_job_leaves_papers_for_the_next_run() {
    let h = TestHarness::new();
    h.add_paper("a");
    let supervisor = h.supervisor(BatchConfig::default());

    run_loop_to_completion(&supervisor).await;
    let first = h.jobs(BatchJobState::Submitted);
    assert_eq!(first.len(), 1);

    h.client
        .finish_with(&first[0].external_name, BatchState::Cancelled);
    supervisor.poller().unwrap().poll_once().await.unwrap();

    let failed = h.jobs(BatchJobState::Failed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].papers_done, 0);
    assert_eq!(h.paper("a").abstract_text, None);
    assert_eq!(supervisor.count_eligible().unwrap(), 1);

    // A new run picks the paper up again.
    run_loop_to_completion(&supervisor).await;
    assert_eq!(h.client.submitted().len(), 2);
    assert_eq!(h.jobs(BatchJobState::Submitted).len(), 1);
}

#[tokio::test]
async fn test_status_errors_keep_the_job_submitted() {
    let h = TestHarness::new();
    h.add_paper("a");
    let supervisor = h.supervisor(BatchConfig::default());
    run_loop_to_completion(&supervisor).await;

    let handle = h.jobs(BatchJobState::Submitted)[0].external_name.clone();
    h.client.break_status(&handle);
    let poller = supervisor.poller().unwrap();
    let outcome = poller.poll_once().await.unwrap();
    assert_eq!(outcome.resolved, 0);
    assert_eq!(outcome.remaining, 1);

    h.client.succeed(&handle, vec![text(r#"{"abstract":"Later"}"#)]);
    let outcome = poller.poll_once().await.unwrap();
    assert_eq!(outcome.resolved, 1);
    assert_eq!(h.paper("a").abstract_text.as_deref(), Some("Later"));
}

#[tokio::test]
async fn test_in_flight_papers_are_not_resubmitted() {
    let h = TestHarness::new();
    h.add_paper("a");
    h.add_paper("b");
    let supervisor = h.supervisor(BatchConfig::default());

    run_loop_to_completion(&supervisor).await;
    run_loop_to_completion(&supervisor).await;

    assert_eq!(h.client.submitted().len(), 1);
    // Still eligible until the job is applied.
    assert_eq!(supervisor.count_eligible().unwrap(), 2);
}

#[tokio::test]
async fn test_refused_submission_creates_no_job() {
    let h = TestHarness::new();
    h.add_paper("a");
    h.client.refuse_submissions(true);
    let supervisor = h.supervisor(BatchConfig::default());

    run_loop_to_completion(&supervisor).await;

    assert!(h.jobs(BatchJobState::Submitted).is_empty());
    assert_eq!(h.paper("a").metadata_skip_reason, None);
    assert!(!supervisor.poller_running());
}

#[tokio::test]
async fn test_unreadable_files_are_skipped_for_good() {
    let h = TestHarness::new();
    h.add_paper("good");
    let bad = h.add_paper("bad");
    h.store.insert(&bad.file_id, b"%PDF-1.7 truncated".to_vec());

    let supervisor = h.supervisor(BatchConfig::default());
    run_loop_to_completion(&supervisor).await;

    let jobs = h.jobs(BatchJobState::Submitted);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].member_ids, vec!["good".to_string()]);
    assert!(h.paper("bad").metadata_skip_reason.is_some());
    assert_eq!(paper_repo::count_eligible(&h.db).unwrap(), 1);
}

#[tokio::test]
async fn test_chunks_respect_chunk_size() {
    let h = TestHarness::new();
    for i in 0..5 {
        h.add_paper(&format!("p{}", i));
    }
    let supervisor = h.supervisor(BatchConfig {
        chunk_size: 2,
        ..Default::default()
    });

    run_loop_to_completion(&supervisor).await;

    let sizes: Vec<usize> = h
        .client
        .submitted()
        .iter()
        .map(|(_, requests)| requests.len())
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(
        h.jobs(BatchJobState::Submitted)[0].member_ids,
        vec!["p0".to_string(), "p1".to_string()]
    );
}
