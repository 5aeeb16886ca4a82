//! Execution order of nested reads and mutations.
//!
//! Every mutation queued at the moment a read would run is applied first,
//! including mutations queued by the operations that just ran.

mod common;

use common::{ordering_repo, CallLog, OrderingState};

fn set(count: u32) -> OrderingState {
    OrderingState { count }
}

#[tokio::test]
async fn test_mutation_then_read() {
    let repo = ordering_repo();
    let calls = CallLog::default();

    let c = calls.clone();
    repo.mutate(move |_| {
        c.push("s1");
        set(1)
    });
    let c = calls.clone();
    repo.read(move |_| c.push("w1"));

    calls.assert_matches(&["s1", "w1"]).await;
}

#[tokio::test]
async fn test_mutation_inside_read_runs_before_nested_read() {
    let repo = ordering_repo();
    let calls = CallLog::default();

    let (r, c) = (repo.clone(), calls.clone());
    repo.read(move |_| {
        c.push("w1");
        let c1 = c.clone();
        r.mutate(move |_| {
            c1.push("s1");
            set(1)
        });
        let c2 = c.clone();
        r.read(move |_| c2.push("w2"));
    });

    calls.assert_matches(&["w1", "s1", "w2"]).await;
}

#[tokio::test]
async fn test_nested_read_queued_first_still_waits_for_mutation() {
    let repo = ordering_repo();
    let calls = CallLog::default();

    let (r, c) = (repo.clone(), calls.clone());
    repo.read(move |_| {
        c.push("w1");
        let c2 = c.clone();
        r.read(move |_| c2.push("w2"));
        let c1 = c.clone();
        r.mutate(move |_| {
            c1.push("s1");
            set(1)
        });
    });

    calls.assert_matches(&["w1", "s1", "w2"]).await;
}

#[tokio::test]
async fn test_deeply_nested_mutations_drain_before_read() {
    let repo = ordering_repo();
    let calls = CallLog::default();

    let (r, c) = (repo.clone(), calls.clone());
    repo.read(move |_| {
        c.push("w1");
        let c2 = c.clone();
        r.read(move |_| c2.push("w2"));
        let (r1, c1) = (r.clone(), c.clone());
        r.mutate(move |_| {
            c1.push("s1");
            let (r2, c2) = (r1.clone(), c1.clone());
            r1.mutate(move |_| {
                c2.push("s2");
                let c3 = c2.clone();
                r2.mutate(move |_| {
                    c3.push("s3");
                    set(3)
                });
                set(2)
            });
            set(1)
        });
    });

    calls.assert_matches(&["w1", "s1", "s2", "s3", "w2"]).await;
    assert_eq!(repo.await_state().await.unwrap().count, 3);
}

#[tokio::test]
async fn test_mutation_from_nested_read_runs_after_it() {
    let repo = ordering_repo();
    let calls = CallLog::default();

    let (r, c) = (repo.clone(), calls.clone());
    repo.read(move |_| {
        c.push("w1");
        let (r4, c4) = (r.clone(), c.clone());
        r.read(move |_| {
            let c5 = c4.clone();
            r4.mutate(move |_| {
                c5.push("s4");
                set(4)
            });
            c4.push("w2");
        });
        let (r1, c1) = (r.clone(), c.clone());
        r.mutate(move |_| {
            c1.push("s1");
            let (r2, c2) = (r1.clone(), c1.clone());
            r1.mutate(move |_| {
                c2.push("s2");
                let c3 = c2.clone();
                r2.mutate(move |_| {
                    c3.push("s3");
                    set(3)
                });
                set(2)
            });
            set(1)
        });
    });

    calls
        .assert_matches(&["w1", "s1", "s2", "s3", "w2", "s4"])
        .await;
}

#[tokio::test]
async fn test_read_from_nested_mutation_runs_last() {
    let repo = ordering_repo();
    let calls = CallLog::default();

    let (r, c) = (repo.clone(), calls.clone());
    repo.read(move |_| {
        c.push("w1");
        let (r4, c4) = (r.clone(), c.clone());
        r.read(move |_| {
            let (r5, c5) = (r4.clone(), c4.clone());
            r4.mutate(move |_| {
                c5.push("s4");
                let c6 = c5.clone();
                r5.read(move |_| c6.push("w3"));
                set(4)
            });
            c4.push("w2");
        });
        let (r1, c1) = (r.clone(), c.clone());
        r.mutate(move |_| {
            c1.push("s1");
            let (r2, c2) = (r1.clone(), c1.clone());
            r1.mutate(move |_| {
                c2.push("s2");
                let c3 = c2.clone();
                r2.mutate(move |_| {
                    c3.push("s3");
                    set(3)
                });
                set(2)
            });
            set(1)
        });
    });

    calls
        .assert_matches(&["w1", "s1", "s2", "s3", "w2", "s4", "w3"])
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ordering_holds_on_multi_thread_runtime() {
    let repo = ordering_repo();
    let calls = CallLog::default();

    let (r, c) = (repo.clone(), calls.clone());
    repo.read(move |_| {
        c.push("w1");
        let c2 = c.clone();
        r.read(move |_| c2.push("w2"));
        let (r1, c1) = (r.clone(), c.clone());
        r.mutate(move |_| {
            c1.push("s1");
            let c2 = c1.clone();
            r1.mutate(move |_| {
                c2.push("s2");
                set(2)
            });
            set(1)
        });
    });

    calls.assert_matches(&["w1", "s1", "s2", "w2"]).await;
}

#[tokio::test]
async fn test_read_after_write_from_one_caller() {
    let repo = ordering_repo();
    for expected in 1..=20_u32 {
        repo.mutate(move |_| set(expected));
        let (tx, rx) = tokio::sync::oneshot::channel();
        repo.read(move |state| {
            let _ = tx.send(state.count);
        });
        assert_eq!(rx.await.unwrap(), expected);
    }
}
