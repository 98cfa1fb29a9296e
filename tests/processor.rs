use std::time::Duration;

use eventvisor::{
    CorrelationId, HandlerError, HandlerFn, HandlerRef, Processor, ProcessorConfig, Status,
    Strategy, SubmitError, Tracked,
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

fn failing(label: &'static str) -> Job {
    Job {
        label,
        ms: 0,
        fail: true,
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

fn processor(strategy: Strategy) -> Processor<Job, Done> {
    Processor::builder("jobs", Vec::new(), jobs())
        .strategy(strategy)
        .build()
}

type Lifecycle = mpsc::UnboundedReceiver<(Status, Option<String>)>;

/// Mints an id and starts recording its lifecycle before anything is submitted.
fn track(p: &Processor<Job, Done>) -> (CorrelationId, Lifecycle) {
    let id = CorrelationId::next();
    let (tx, rx) = mpsc::unbounded_channel();
    p.bus().listen(id, move |env| {
        let _ = tx.send((env.status(), env.error_ref().map(|e| e.to_string())));
        Ok(())
    });
    (id, rx)
}

async fn until_completed(rx: &mut Lifecycle) -> Vec<(Status, Option<String>)> {
    let mut seen = Vec::new();
    while let Ok(Some(item)) = timeout(Duration::from_secs(5), rx.recv()).await {
        let done = item.0 == Status::Completed;
        seen.push(item);
        if done {
            break;
        }
    }
    seen
}

fn ok_lifecycle() -> Vec<(Status, Option<String>)> {
    vec![
        (Status::Started, None),
        (Status::Success, None),
        (Status::Completed, None),
    ]
}

fn failed_lifecycle(err: &str) -> Vec<(Status, Option<String>)> {
    vec![
        (Status::Started, None),
        (Status::Error, Some(err.to_string())),
        (Status::Completed, None),
    ]
}

#[tokio::test(start_paused = true)]
async fn sequential_handles_events_in_order() {
    let p = processor(Strategy::Sequential);
    let (a, mut a_rx) = track(&p);
    let (b, mut b_rx) = track(&p);
    let (c, mut c_rx) = track(&p);

    p.submit_tracked(Tracked::with_id(a, job("a", 30))).await.unwrap();
    p.submit_tracked(Tracked::with_id(b, job("b", 10))).await.unwrap();
    p.submit_tracked(Tracked::with_id(c, job("c", 0))).await.unwrap();

    assert_eq!(until_completed(&mut a_rx).await, ok_lifecycle());
    assert_eq!(until_completed(&mut b_rx).await, ok_lifecycle());
    assert_eq!(until_completed(&mut c_rx).await, ok_lifecycle());
    assert_eq!(p.state(), vec!["a", "b", "c"]);

    p.close().await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_events_overlap() {
    let p = processor(Strategy::Concurrent);
    let (order_tx, mut order_rx) = mpsc::unbounded_channel();

    for (label, ms) in [("slow", 50), ("fast", 10)] {
        let id = CorrelationId::next();
        let order_tx = order_tx.clone();
        p.bus().listen(id, move |env| {
            if env.status() == Status::Success {
                let _ = order_tx.send(env.payload().label);
            }
            Ok(())
        });
        p.submit_tracked(Tracked::with_id(id, job(label, ms))).await.unwrap();
    }

    assert_eq!(order_rx.recv().await, Some("fast"));
    assert_eq!(order_rx.recv().await, Some("slow"));
    p.close().await;
}

#[tokio::test(start_paused = true)]
async fn restartable_cancels_running_event() {
    let p = processor(Strategy::Restartable);
    let (a, mut a_rx) = track(&p);
    let (b, mut b_rx) = track(&p);

    p.submit_tracked(Tracked::with_id(a, job("a", 100))).await.unwrap();
    p.submit_tracked(Tracked::with_id(b, job("b", 10))).await.unwrap();

    assert_eq!(
        until_completed(&mut a_rx).await,
        failed_lifecycle("processing cancelled")
    );
    assert_eq!(until_completed(&mut b_rx).await, ok_lifecycle());
    assert_eq!(p.state(), vec!["b"]);

    p.close().await;
}

#[tokio::test(start_paused = true)]
async fn droppable_ignores_events_while_busy() {
    let p = processor(Strategy::Droppable);
    let (a, mut a_rx) = track(&p);
    let (b, mut b_rx) = track(&p);

    p.submit_tracked(Tracked::with_id(a, job("a", 50))).await.unwrap();
    p.submit_tracked(Tracked::with_id(b, job("b", 0))).await.unwrap();

    // "b" is turned away without running, but its lifecycle is still closed.
    assert_eq!(
        until_completed(&mut b_rx).await,
        failed_lifecycle("processing cancelled")
    );
    assert_eq!(until_completed(&mut a_rx).await, ok_lifecycle());
    assert_eq!(p.state(), vec!["a"]);

    // Idle again: the next event is admitted.
    let (c, mut c_rx) = track(&p);
    p.submit_tracked(Tracked::with_id(c, job("c", 0))).await.unwrap();
    assert_eq!(until_completed(&mut c_rx).await, ok_lifecycle());

    p.close().await;
}

#[tokio::test(start_paused = true)]
async fn failure_reaches_hook_and_processor_keeps_running() {
    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    let p = Processor::builder("jobs", Vec::new(), jobs())
        .on_error(move |id, err| {
            let _ = err_tx.send((id, err.clone()));
        })
        .build();

    let (bad, mut bad_rx) = track(&p);
    p.submit_tracked(Tracked::with_id(bad, failing("disk full"))).await.unwrap();
    assert_eq!(
        until_completed(&mut bad_rx).await,
        failed_lifecycle("handler failed: disk full")
    );
    assert_eq!(
        err_rx.recv().await,
        Some((bad, HandlerError::fail("disk full")))
    );

    let (good, mut good_rx) = track(&p);
    p.submit_tracked(Tracked::with_id(good, job("ok", 0))).await.unwrap();
    assert_eq!(until_completed(&mut good_rx).await, ok_lifecycle());
    assert_eq!(p.state(), vec!["ok"]);

    p.close().await;
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_reaches_hook_and_processor_keeps_running() {
    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    let handler: HandlerRef<Job, Done> = HandlerFn::arc("jobs", |job: Job, mut done: Done| {
        async_stream::stream! {
            if job.fail {
                panic!("corrupt {}", job.label);
            }
            done.push(job.label);
            yield Ok::<_, HandlerError>(done);
        }
    });
    let p = Processor::builder("jobs", Vec::new(), handler)
        .strategy(Strategy::Sequential)
        .on_error(move |_id, err| {
            let _ = err_tx.send(err.clone());
        })
        .build();

    let (bad, mut bad_rx) = track(&p);
    p.submit_tracked(Tracked::with_id(bad, failing("index"))).await.unwrap();
    assert_eq!(
        until_completed(&mut bad_rx).await,
        failed_lifecycle("handler panicked: corrupt index")
    );
    assert_eq!(
        err_rx.recv().await,
        Some(HandlerError::Panicked {
            info: "corrupt index".to_string()
        })
    );

    let (good, mut good_rx) = track(&p);
    p.submit_tracked(Tracked::with_id(good, job("ok", 0))).await.unwrap();
    assert_eq!(until_completed(&mut good_rx).await, ok_lifecycle());
    assert_eq!(p.state(), vec!["ok"]);

    p.close().await;
}

#[tokio::test(start_paused = true)]
async fn slow_handler_times_out() {
    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    let p = Processor::builder("jobs", Vec::new(), jobs())
        .timeout(Duration::from_millis(20))
        .on_error(move |_id, err| {
            let _ = err_tx.send(err.as_label());
        })
        .build();

    let (id, mut rx) = track(&p);
    p.submit_tracked(Tracked::with_id(id, job("slow", 1_000))).await.unwrap();

    assert_eq!(
        until_completed(&mut rx).await,
        failed_lifecycle("timed out after 20ms")
    );
    assert_eq!(err_rx.recv().await, Some("handler_timeout"));
    assert!(p.state().is_empty());

    p.close().await;
}

#[tokio::test(start_paused = true)]
async fn close_brackets_in_flight_and_queued_events() {
    let p = processor(Strategy::Sequential);
    let (a, mut a_rx) = track(&p);
    let (b, mut b_rx) = track(&p);

    p.submit_tracked(Tracked::with_id(a, job("a", 10_000))).await.unwrap();
    p.submit_tracked(Tracked::with_id(b, job("b", 0))).await.unwrap();
    assert_eq!(a_rx.recv().await, Some((Status::Started, None)));

    p.close().await;

    assert_eq!(
        until_completed(&mut a_rx).await,
        vec![
            (Status::Error, Some("processing cancelled".to_string())),
            (Status::Completed, None),
        ]
    );
    assert_eq!(
        until_completed(&mut b_rx).await,
        failed_lifecycle("processing cancelled")
    );

    assert!(p.is_closed());
    assert!(p.bus().is_disposed());
    assert!(p.coordinator().is_closed());
    assert_eq!(p.submit(job("late", 0)).await, Err(SubmitError::Closed));
    assert_eq!(p.handle().try_submit(job("late", 0)), Err(SubmitError::Closed));
    p.close().await;
}

#[tokio::test]
async fn full_queue_is_reported() {
    let p = Processor::builder("jobs", Vec::new(), jobs())
        .config(ProcessorConfig {
            queue_capacity: 1,
            ..ProcessorConfig::default()
        })
        .build();
    let handle = p.handle();

    assert!(handle.try_submit(job("a", 0)).is_ok());
    assert_eq!(handle.try_submit(job("b", 0)), Err(SubmitError::Full));

    p.close().await;
}

#[tokio::test(start_paused = true)]
async fn states_are_broadcast() {
    let p = processor(Strategy::Sequential);
    let mut states = p.states();

    p.submit(job("a", 0)).await.unwrap();
    p.submit(job("b", 0)).await.unwrap();

    assert_eq!(states.recv().await.ok(), Some(vec!["a"]));
    assert_eq!(states.recv().await.ok(), Some(vec!["a", "b"]));
    p.close().await;
}
