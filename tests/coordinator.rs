use std::time::Duration;

use eventvisor::{
    Completion, CorrelationId, Coordinator, HandlerError, HandlerFn, HandlerRef, Processor,
    Status, Strategy, SubmitError, Tracked,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Job {
    label: &'static str,
    ms: u64,
    fail: bool,
}

fn job(label: &'static str, ms: u64) -> Job {
    Job {
        label,
        ms,
        fail: false,
    }
}

type Done = Vec<&'static str>;

fn jobs() -> HandlerRef<Job, Done> {
    HandlerFn::arc("jobs", |job: Job, mut done: Done| {
        async_stream::stream! {
            tokio::time::sleep(Duration::from_millis(job.ms)).await;
            if job.fail {
                yield Err(HandlerError::fail(job.label));
            } else {
                done.push(job.label);
                yield Ok(done);
            }
        }
    })
}

fn target() -> Processor<Job, Done> {
    Processor::builder("target", Vec::new(), jobs())
        .strategy(Strategy::Concurrent)
        .build()
}

fn completions() -> (
    impl Fn() -> Box<dyn FnOnce(Completion<Job>) + Send>,
    mpsc::UnboundedReceiver<Completion<Job>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let make = move || {
        let tx = tx.clone();
        Box::new(move |c: Completion<Job>| {
            let _ = tx.send(c);
        }) as Box<dyn FnOnce(Completion<Job>) + Send>
    };
    (make, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Completion<Job>>) -> Option<Completion<Job>> {
    timeout(Duration::from_secs(5), rx.recv()).await.ok().flatten()
}

#[tokio::test(start_paused = true)]
async fn callback_fires_once_after_completion() {
    let target = target();
    let coordinator = Coordinator::new("driver");
    let (cb, mut rx) = completions();

    let id = coordinator.drive(&target, job("a", 10), cb()).await.unwrap();
    assert_eq!(coordinator.in_flight(), 1);

    let done = next(&mut rx).await.expect("completion");
    assert_eq!(done.id(), id);
    assert!(done.is_success());
    assert!(done.error().is_none());
    assert_eq!(done.event(), &job("a", 10));
    assert_eq!(done.completed().status(), Status::Completed);
    assert_eq!(done.terminal().map(|e| e.status()), Some(Status::Success));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(coordinator.in_flight(), 0);
    assert_eq!(target.state(), vec!["a"]);

    target.close().await;
}

#[tokio::test(start_paused = true)]
async fn failed_event_is_reported_as_completion() {
    let target = target();
    let coordinator = Coordinator::new("driver");
    let (cb, mut rx) = completions();

    let failing = Job {
        label: "boom",
        ms: 0,
        fail: true,
    };
    coordinator.drive(&target, failing.clone(), cb()).await.unwrap();

    let done = next(&mut rx).await.expect("completion");
    assert!(!done.is_success());
    assert_eq!(
        done.error().map(|e| e.to_string()).as_deref(),
        Some("handler failed: boom")
    );
    assert_eq!(done.into_event(), failing);

    target.close().await;
}

#[tokio::test(start_paused = true)]
async fn close_cancels_pending_callbacks() {
    let target = target();
    let coordinator = Coordinator::new("driver");
    let (cb, mut rx) = completions();

    let id = coordinator.drive(&target, job("slow", 1_000), cb()).await.unwrap();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    target.bus().listen(id, move |env| {
        let _ = seen_tx.send(env.status());
        Ok(())
    });

    coordinator.close();
    coordinator.close();
    assert!(coordinator.is_closed());
    assert_eq!(coordinator.in_flight(), 0);

    // The target still finishes the event; nobody is called back.
    loop {
        let status = timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .ok()
            .flatten();
        match status {
            Some(Status::Completed) => break,
            Some(_) => continue,
            None => panic!("target never completed"),
        }
    }
    assert!(rx.try_recv().is_err());

    assert_eq!(
        coordinator.drive(&target, job("late", 0), cb()).await,
        Err(SubmitError::Closed)
    );
    target.close().await;
}

#[tokio::test(start_paused = true)]
async fn reused_id_replaces_stale_registration() {
    let target = target();
    let coordinator = Coordinator::new("driver");
    let (cb, mut rx) = completions();
    let id = CorrelationId::next();

    coordinator
        .drive_tracked(&target, Tracked::with_id(id, job("first", 1_000)), cb())
        .await
        .unwrap();
    coordinator
        .drive_tracked(&target, Tracked::with_id(id, job("second", 10)), cb())
        .await
        .unwrap();
    assert_eq!(coordinator.in_flight(), 1);

    let done = next(&mut rx).await.expect("completion");
    assert_eq!(done.event().label, "second");

    // "first" completes later under the same id; its callback was cancelled.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(coordinator.in_flight(), 0);

    target.close().await;
}

#[tokio::test(start_paused = true)]
async fn closed_target_rejects_drive() {
    let target = target();
    target.close().await;

    let coordinator = Coordinator::new("driver");
    let (cb, _rx) = completions();
    assert_eq!(
        coordinator.drive(&target, job("a", 0), cb()).await,
        Err(SubmitError::Closed)
    );
    assert_eq!(coordinator.in_flight(), 0);
    assert!(!coordinator.is_closed());
}

#[tokio::test(start_paused = true)]
async fn completion_can_feed_another_processor() {
    let todos = target();
    let notes: Processor<Job, Done> = Processor::builder("notes", Vec::new(), jobs())
        .strategy(Strategy::Sequential)
        .build();
    let mut note_states = notes.states();

    let notes_handle = notes.handle();
    notes
        .coordinator()
        .drive(&todos, job("write report", 5), move |done| {
            if done.is_success() {
                let _ = notes_handle.try_submit(job("report written", 0));
            }
        })
        .await
        .unwrap();

    let state = timeout(Duration::from_secs(5), note_states.recv())
        .await
        .expect("note state")
        .expect("open channel");
    assert_eq!(state, vec!["report written"]);
    assert_eq!(todos.state(), vec!["write report"]);

    notes.close().await;
    assert!(notes.coordinator().is_closed());
    todos.close().await;
}

#[tokio::test(start_paused = true)]
async fn closing_driver_processor_cancels_its_drives() {
    let todos = target();
    let notes: Processor<Job, Done> = Processor::builder("notes", Vec::new(), jobs()).build();
    let (cb, mut rx) = completions();

    notes
        .coordinator()
        .drive(&todos, job("long", 1_000), cb())
        .await
        .unwrap();
    assert_eq!(notes.coordinator().in_flight(), 1);

    notes.close().await;
    assert_eq!(notes.coordinator().in_flight(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(todos.state(), vec!["long"]);

    todos.close().await;
}

#[tokio::test(start_paused = true)]
async fn busy_droppable_target_still_completes_the_drive() {
    let target: Processor<Job, Done> = Processor::builder("target", Vec::new(), jobs())
        .strategy(Strategy::Droppable)
        .build();
    let coordinator = Coordinator::new("driver");
    let (cb, mut rx) = completions();

    coordinator.drive(&target, job("busy", 50), cb()).await.unwrap();
    coordinator.drive(&target, job("extra", 0), cb()).await.unwrap();
    assert_eq!(coordinator.in_flight(), 2);

    let turned_away = next(&mut rx).await.expect("completion");
    assert_eq!(turned_away.event().label, "extra");
    assert!(!turned_away.is_success());
    assert_eq!(
        turned_away.error().map(|e| e.to_string()).as_deref(),
        Some("processing cancelled")
    );

    let finished = next(&mut rx).await.expect("completion");
    assert_eq!(finished.event().label, "busy");
    assert!(finished.is_success());

    assert_eq!(coordinator.in_flight(), 0);
    assert_eq!(target.state(), vec!["busy"]);
    target.close().await;
}

#[tokio::test(start_paused = true)]
async fn no_callback_fires_once_driver_close_has_begun() {
    let todos = target();
    let notes: Processor<Job, Done> = Processor::builder("notes", Vec::new(), jobs()).build();
    let (cb, mut rx) = completions();

    let id = notes
        .coordinator()
        .drive(&todos, job("instant", 0), cb())
        .await
        .unwrap();
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    todos.bus().listen(id, move |env| {
        let _ = seen_tx.send(env.status());
        Ok(())
    });

    // Closing yields while the run loop winds down; "instant" completes meanwhile.
    notes.close().await;

    loop {
        let status = timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .ok()
            .flatten();
        match status {
            Some(Status::Completed) => break,
            Some(_) => continue,
            None => panic!("target never completed"),
        }
    }
    assert!(rx.try_recv().is_err());
    assert_eq!(notes.coordinator().in_flight(), 0);

    todos.close().await;
}
