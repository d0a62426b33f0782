//! Lifecycle tests on a paused tokio clock.
//!
//! `status().await` は driver を一周するので、それまでに送った
//! コマンドはすべて処理済みになっている。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rstest::rstest;
use tokio::time::sleep;

use crate::app::{RefreshBuilder, RefreshStatus};
use crate::domain::{
    CyclePhase, LifecycleEvent, RefreshError, SubmissionError, TaskIdentifier,
};
use crate::impls::{InMemoryAssertions, InMemoryHost, InMemoryScheduler, RecordingEventSink};
use crate::ports::{Clock, FixedClock};

struct Fixture {
    id: TaskIdentifier,
    scheduler: InMemoryScheduler,
    assertions: InMemoryAssertions,
    host: InMemoryHost,
    events: RecordingEventSink,
    clock: Arc<FixedClock>,
}

impl Fixture {
    fn new() -> Self {
        let id = TaskIdentifier::new("com.example.refresh").unwrap();
        Self {
            scheduler: InMemoryScheduler::new().permit(id.clone()),
            assertions: InMemoryAssertions::new(),
            host: InMemoryHost::new(),
            events: RecordingEventSink::new(),
            clock: Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            )),
            id,
        }
    }

    fn builder(&self) -> RefreshBuilder {
        RefreshBuilder::new(self.id.clone())
            .scheduler(Arc::new(self.scheduler.clone()))
            .assertions(Arc::new(self.assertions.clone()))
            .host(Arc::new(self.host.clone()))
            .clock(self.clock.clone())
            .event_sink(Arc::new(self.events.clone()))
    }

    fn launch(&self) {
        self.scheduler.launch(&self.id).expect("handler registered");
    }

    fn successful_completions(&self) -> usize {
        self.scheduler
            .completions()
            .iter()
            .filter(|c| c.success == Some(true))
            .count()
    }
}

async fn status(manager: &crate::app::RefreshManager) -> RefreshStatus {
    manager.handle().status().await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn constructing_registers_exactly_once() {
    let fx = Fixture::new();
    let manager = fx.builder().build().unwrap();

    assert_eq!(fx.scheduler.registrations(), vec![fx.id.clone()]);
    assert_eq!(fx.events.names(), vec!["registered"]);
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn auto_completes_when_action_never_engages() {
    let fx = Fixture::new();
    fx.host.set_backgrounded(true);
    let manager = fx
        .builder()
        .auto_complete_delay(Duration::from_secs(1))
        .build()
        .unwrap();

    fx.launch();
    let st = status(&manager).await;
    assert_eq!(st.phase, CyclePhase::Running);
    assert!(st.assertion_held);
    assert!(st.timer_armed);
    assert_eq!(fx.assertions.acquired(), 1);

    sleep(Duration::from_millis(999)).await;
    assert!(status(&manager).await.has_current_task());
    assert!(fx.scheduler.completions().is_empty());

    sleep(Duration::from_millis(2)).await;
    let st = status(&manager).await;
    assert!(!st.has_current_task());
    assert_eq!(st.completed_cycles, 1);
    assert_eq!(fx.successful_completions(), 1);
    assert_eq!(fx.scheduler.completions().len(), 1);
    assert_eq!(fx.assertions.released(), 1);
    assert_eq!(fx.assertions.held(), 0);
    assert_eq!(fx.scheduler.submissions().len(), 1);

    assert_eq!(
        fx.events.names(),
        vec![
            "registered",
            "launched",
            "assertion_acquired",
            "timer_armed",
            "timer_fired",
            "submitted",
            "completed",
            "assertion_released",
        ]
    );
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn processing_suppresses_the_timer() {
    let fx = Fixture::new();
    let manager = fx
        .builder()
        .auto_complete_delay(Duration::from_secs(1))
        .build()
        .unwrap();
    let handle = manager.handle().clone();

    fx.launch();
    sleep(Duration::from_millis(200)).await;
    handle.set_processing(true).unwrap();

    // timer fires at t=1s: force-end only, no completion
    sleep(Duration::from_millis(801)).await;
    let st = status(&manager).await;
    assert_eq!(st.phase, CyclePhase::Processing);
    assert!(handle.is_processing());
    assert!(handle.has_current_task());
    assert!(!st.timer_armed);
    assert!(!st.assertion_held);
    assert_eq!(fx.assertions.released(), 1);
    assert!(fx.scheduler.completions().is_empty());
    assert!(
        fx.events
            .events()
            .contains(&LifecycleEvent::TimerFired { processing: true })
    );

    sleep(Duration::from_millis(999)).await;
    assert!(fx.scheduler.completions().is_empty());

    // t=2s
    handle.set_processing(false).unwrap();
    let st = status(&manager).await;
    assert_eq!(st.phase, CyclePhase::Idle);
    assert_eq!(fx.successful_completions(), 1);
    assert_eq!(fx.assertions.released(), 1);
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn toggling_processing_completes_only_once() {
    let fx = Fixture::new();
    let manager = fx.builder().build().unwrap();
    let handle = manager.handle().clone();

    fx.launch();
    handle.set_processing(true).unwrap();
    handle.set_processing(false).unwrap();
    handle.set_processing(true).unwrap();
    handle.set_processing(false).unwrap();

    let st = status(&manager).await;
    assert_eq!(st.completed_cycles, 1);
    assert!(!st.is_processing);
    assert_eq!(fx.scheduler.completions().len(), 1);

    // the canceled timer never acts on anything
    sleep(Duration::from_secs(3)).await;
    assert_eq!(fx.scheduler.completions().len(), 1);
    assert_eq!(fx.events.count("timer_fired"), 0);
    assert_eq!(fx.events.count("completed"), 1);
    manager.shutdown().await.unwrap();
}

#[rstest]
#[case::backgrounded(true, 1)]
#[case::foreground(false, 0)]
#[tokio::test(start_paused = true)]
async fn completion_resubmits_only_in_background(
    #[case] backgrounded: bool,
    #[case] expected_submissions: usize,
) {
    let fx = Fixture::new();
    fx.host.set_backgrounded(backgrounded);
    let fetch_delay = Duration::from_secs(15 * 60);
    let manager = fx
        .builder()
        .background_fetch_delay(fetch_delay)
        .build()
        .unwrap();

    fx.launch();
    sleep(Duration::from_millis(1001)).await;
    let st = status(&manager).await;
    assert_eq!(st.completed_cycles, 1);

    let submissions = fx.scheduler.submissions();
    assert_eq!(submissions.len(), expected_submissions);
    for request in submissions {
        assert_eq!(
            request.earliest_start,
            Some(fx.clock.now() + chrono::Duration::minutes(15))
        );
    }
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn action_that_finishes_early_cancels_the_timer() {
    let fx = Fixture::new();
    let manager = fx
        .builder()
        .auto_complete_delay(Duration::from_millis(500))
        .action(|refresh| {
            refresh.set_processing(true).unwrap();
            let refresh = refresh.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(100)).await;
                refresh.set_processing(false).unwrap();
            });
        })
        .build()
        .unwrap();

    fx.launch();
    sleep(Duration::from_millis(150)).await;
    let st = status(&manager).await;
    assert_eq!(st.completed_cycles, 1);
    assert!(!st.assertion_held);
    assert!(!st.timer_armed);
    assert_eq!(fx.successful_completions(), 1);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(fx.events.count("timer_fired"), 0);
    assert_eq!(
        fx.events.names(),
        vec![
            "registered",
            "launched",
            "assertion_acquired",
            "timer_armed",
            "action_invoked",
            "processing_changed",
            "processing_changed",
            "completed",
            "timer_canceled",
            "assertion_released",
        ]
    );
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn clearing_processing_without_a_task_is_a_no_op() {
    let fx = Fixture::new();
    let manager = fx.builder().build().unwrap();
    let handle = manager.handle().clone();

    handle.set_processing(true).unwrap();
    handle.set_processing(false).unwrap();
    handle.set_processing(false).unwrap();

    let st = status(&manager).await;
    assert_eq!(st.phase, CyclePhase::Idle);
    assert_eq!(st.completed_cycles, 0);
    assert!(fx.scheduler.completions().is_empty());
    assert_eq!(fx.events.count("completed"), 0);
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn entering_background_submits_a_request() {
    let fx = Fixture::new();
    let manager = fx
        .builder()
        .background_fetch_delay(Duration::from_secs(60))
        .build()
        .unwrap();

    fx.host.enter_background();
    let st = status(&manager).await;
    assert_eq!(st.submissions, 1);

    let pending = fx.scheduler.pending(&fx.id).unwrap();
    assert_eq!(
        pending.earliest_start,
        Some(fx.clock.now() + chrono::Duration::seconds(60))
    );
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unavailable_scheduling_is_skipped_not_fatal() {
    let fx = Fixture::new();
    let scheduler = InMemoryScheduler::new().unavailable();
    let manager = fx
        .builder()
        .scheduler(Arc::new(scheduler.clone()))
        .build()
        .unwrap();

    fx.host.enter_background();
    let st = status(&manager).await;
    assert_eq!(st.submissions, 0);
    assert!(!st.stopped);
    assert_eq!(fx.events.count("submission_skipped"), 1);
    assert!(!manager.is_finished());
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn rejected_submission_stops_the_driver() {
    let fx = Fixture::new();
    fx.scheduler
        .reject_submissions_with(SubmissionError::TooManyPendingRequests(fx.id.clone()));
    let manager = fx.builder().build().unwrap();

    fx.host.enter_background();
    let err = manager.join().await.unwrap_err();
    assert_eq!(
        err,
        RefreshError::Submission(SubmissionError::TooManyPendingRequests(fx.id.clone()))
    );
    assert_eq!(fx.host.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn fatal_submission_during_completion_still_completes() {
    let fx = Fixture::new();
    fx.host.set_backgrounded(true);
    let manager = fx.builder().build().unwrap();
    let handle = manager.handle().clone();

    fx.launch();
    assert!(status(&manager).await.has_current_task());
    fx.scheduler
        .reject_submissions_with(SubmissionError::Rejected("quota".into()));

    sleep(Duration::from_millis(1001)).await;
    let err = manager.join().await.unwrap_err();
    assert!(matches!(err, RefreshError::Submission(SubmissionError::Rejected(_))));
    assert_eq!(fx.successful_completions(), 1);
    assert_eq!(fx.assertions.held(), 0);

    // launches after the driver stopped are completed on the spot
    fx.launch();
    assert_eq!(fx.successful_completions(), 2);
    assert!(matches!(
        handle.set_processing(true),
        Err(RefreshError::DriverGone(_))
    ));
    assert!(handle.subscribe().borrow().stopped);
}

#[tokio::test(start_paused = true)]
async fn expiration_releases_assertion_but_keeps_task() {
    let fx = Fixture::new();
    let manager = fx
        .builder()
        .action(|refresh| refresh.set_processing(true).unwrap())
        .build()
        .unwrap();
    let handle = manager.handle().clone();

    fx.launch();
    assert_eq!(status(&manager).await.phase, CyclePhase::Processing);

    assert_eq!(fx.assertions.expire_all(), 1);
    let st = status(&manager).await;
    assert!(!st.assertion_held);
    assert!(!st.timer_armed);
    assert!(st.has_current_task());
    assert_eq!(fx.assertions.released(), 1);
    assert_eq!(fx.events.count("assertion_expired"), 1);

    handle.set_processing(false).unwrap();
    let st = status(&manager).await;
    assert_eq!(st.completed_cycles, 1);
    // already released; not released twice
    assert_eq!(fx.assertions.released(), 1);
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn second_launch_during_a_cycle_is_completed_immediately() {
    let fx = Fixture::new();
    let manager = fx
        .builder()
        .action(|refresh| refresh.set_processing(true).unwrap())
        .build()
        .unwrap();

    fx.launch();
    let first = status(&manager).await.current_launch;
    fx.launch();
    let st = status(&manager).await;

    assert_eq!(st.current_launch, first);
    assert_eq!(fx.assertions.acquired(), 1);
    let completions = fx.scheduler.completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].launch, 2);
    assert_eq!(fx.events.count("duplicate_launch"), 1);

    manager.handle().set_processing(false).unwrap();
    let st = status(&manager).await;
    assert_eq!(st.completed_cycles, 1);
    assert_eq!(fx.successful_completions(), 2);
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn action_can_be_replaced_and_cleared() {
    let fx = Fixture::new();
    let manager = fx.builder().build().unwrap();
    let handle = manager.handle().clone();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    handle
        .set_action(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert!(status(&manager).await.has_action);
    fx.launch();
    sleep(Duration::from_millis(1001)).await;
    assert_eq!(status(&manager).await.completed_cycles, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    handle.clear_action().unwrap();
    fx.launch();
    sleep(Duration::from_millis(1001)).await;
    let st = status(&manager).await;
    assert_eq!(st.completed_cycles, 2);
    assert!(!st.has_action);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn background_cycles_sustain_themselves() {
    let fx = Fixture::new();
    let manager = fx.builder().build().unwrap();

    fx.host.enter_background();
    assert_eq!(status(&manager).await.submissions, 1);

    for cycle in 1..=3u64 {
        assert_eq!(fx.scheduler.launch_due(fx.clock.now()).len(), 1);
        sleep(Duration::from_millis(1001)).await;
        let st = status(&manager).await;
        assert_eq!(st.completed_cycles, cycle);
        assert_eq!(st.submissions, cycle + 1);
    }
    assert_eq!(fx.assertions.acquired(), 3);
    assert_eq!(fx.assertions.released(), 3);
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_completes_the_in_flight_task() {
    let fx = Fixture::new();
    fx.host.set_backgrounded(true);
    let manager = fx
        .builder()
        .action(|refresh| refresh.set_processing(true).unwrap())
        .build()
        .unwrap();
    let handle = manager.handle().clone();

    fx.launch();
    assert!(status(&manager).await.has_current_task());

    manager.shutdown().await.unwrap();
    assert_eq!(fx.successful_completions(), 1);
    assert_eq!(fx.assertions.held(), 0);
    // no rescheduling on shutdown
    assert!(fx.scheduler.submissions().is_empty());
    assert!(matches!(handle.status().await, Err(RefreshError::DriverGone(_))));
    assert_eq!(fx.host.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_manager_stops_the_driver() {
    let fx = Fixture::new();
    let manager = fx.builder().build().unwrap();
    let mut status_rx = manager.handle().subscribe();
    drop(manager);

    status_rx
        .wait_for(|st| st.stopped)
        .await
        .expect("driver publishes its final status");
    assert_eq!(fx.host.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn panicking_action_leaves_completion_to_the_timer() {
    let fx = Fixture::new();
    let manager = fx
        .builder()
        .action(|_| panic!("refresh exploded"))
        .build()
        .unwrap();

    fx.launch();
    let st = status(&manager).await;
    assert!(st.has_current_task());
    assert!(st.assertion_held);
    assert!(!st.stopped);
    assert!(fx.events.events().iter().any(|event| matches!(
        event,
        LifecycleEvent::ActionPanicked { message, .. } if message == "refresh exploded"
    )));

    sleep(Duration::from_millis(1001)).await;
    let st = status(&manager).await;
    assert_eq!(st.completed_cycles, 1);
    assert_eq!(fx.scheduler.completions().len(), 1);
    assert_eq!(fx.successful_completions(), 1);
    assert_eq!(fx.assertions.held(), 0);
    assert_eq!(fx.assertions.released(), 1);
    assert!(!manager.is_finished());
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn processing_claimed_before_launch_suppresses_the_timer() {
    let fx = Fixture::new();
    let manager = fx.builder().build().unwrap();
    let handle = manager.handle().clone();

    handle.set_processing(true).unwrap();
    fx.launch();
    let st = status(&manager).await;
    assert_eq!(st.phase, CyclePhase::Processing);

    sleep(Duration::from_millis(1001)).await;
    assert!(status(&manager).await.has_current_task());
    assert!(fx.scheduler.completions().is_empty());

    handle.set_processing(false).unwrap();
    let st = status(&manager).await;
    assert_eq!(st.completed_cycles, 1);
    assert_eq!(fx.successful_completions(), 1);
    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn status_right_after_launch_sees_the_actions_claim() {
    let fx = Fixture::new();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let manager = fx
        .builder()
        .action(move |refresh| {
            refresh.set_processing(true).unwrap();
            record.lock().unwrap().push(refresh.is_processing());
        })
        .build()
        .unwrap();

    fx.launch();
    let st = status(&manager).await;
    assert_eq!(st.phase, CyclePhase::Processing);
    assert!(st.is_processing);
    assert_eq!(*seen.lock().unwrap(), vec![true]);
    assert!(manager.handle().is_processing());
    manager.shutdown().await.unwrap();
}
