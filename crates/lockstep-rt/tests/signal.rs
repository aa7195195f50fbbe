// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Coroutines parked on a `WaitSignal`, woken by notify or cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use lockstep_rt::{CancelToken, Scheduler, WaitError, WaitSignal};
use parking_lot::Mutex;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn notify_wakes_every_registered_coroutine() {
    init_logging();
    let sched = Scheduler::new();
    let signal = WaitSignal::new();
    let woken = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let (sig, w) = (signal.clone(), woken.clone());
        sched
            .spawn_task(async move {
                sig.wait(None).await?;
                w.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
    }
    assert_eq!(signal.waiter_count(), 3);

    signal.notify_all();
    assert_eq!(signal.waiter_count(), 0);
    // Notified off the resuming thread: continuations wait for the frame.
    assert_eq!(woken.load(Ordering::SeqCst), 0);
    assert_eq!(sched.pending().implicit, 3);

    sched.resume().unwrap();
    assert_eq!(woken.load(Ordering::SeqCst), 3);
}

#[test]
fn notify_inside_resume_continues_waiters_inline() {
    init_logging();
    let sched = Scheduler::new();
    let signal = WaitSignal::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let (sig, l) = (signal.clone(), log.clone());
    sched
        .spawn_task(async move {
            sig.wait(None).await?;
            l.lock().push("waiter");
            Ok(())
        })
        .unwrap();

    let (s, sig, l) = (sched.clone(), signal.clone(), log.clone());
    sched
        .spawn_task(async move {
            s.yield_now().await;
            sig.notify_all();
            l.lock().push("notifier");
            Ok(())
        })
        .unwrap();

    sched.resume().unwrap();
    assert_eq!(*log.lock(), vec!["waiter", "notifier"]);
}

#[test]
fn captured_wait_completes_after_earlier_notify() {
    init_logging();
    let sched = Scheduler::new();
    let signal = WaitSignal::new();

    let wait = signal.wait(None);
    signal.notify_all();

    let done = Arc::new(AtomicUsize::new(0));
    let d = done.clone();
    let handle = sched
        .spawn_task(async move {
            wait.await?;
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    assert_eq!(done.load(Ordering::SeqCst), 1);
    assert!(handle.is_complete());
    assert_eq!(signal.waiter_count(), 0);
}

#[test]
fn cancel_before_notify_completes_cancelled_once() {
    init_logging();
    let sched = Scheduler::new();
    let signal = WaitSignal::new();
    let token = CancelToken::new();
    let outcomes = Arc::new(Mutex::new(Vec::new()));

    let (sig, tok, out) = (signal.clone(), token.clone(), outcomes.clone());
    sched
        .spawn_task(async move {
            let result = sig.wait(Some(&tok)).await;
            out.lock().push(result);
            Ok(())
        })
        .unwrap();

    token.cancel();
    assert_eq!(signal.waiter_count(), 0);
    signal.notify_all();

    sched.resume().unwrap();
    sched.resume().unwrap();
    assert_eq!(*outcomes.lock(), vec![Err(WaitError::Cancelled)]);
}

#[test]
fn cancel_after_notify_is_a_no_op() {
    init_logging();
    let sched = Scheduler::new();
    let signal = WaitSignal::new();
    let token = CancelToken::new();
    let outcomes = Arc::new(Mutex::new(Vec::new()));

    let (sig, tok, out) = (signal.clone(), token.clone(), outcomes.clone());
    sched
        .spawn_task(async move {
            let result = sig.wait(Some(&tok)).await;
            out.lock().push(result);
            Ok(())
        })
        .unwrap();

    signal.notify_all();
    token.cancel();

    sched.resume().unwrap();
    assert_eq!(*outcomes.lock(), vec![Ok(())]);
}

#[test]
fn pre_cancelled_token_completes_without_suspending() {
    init_logging();
    let sched = Scheduler::new();
    let signal = WaitSignal::new();
    let token = CancelToken::new();
    token.cancel();

    let outcome = Arc::new(Mutex::new(None));
    let (sig, out) = (signal.clone(), outcome.clone());
    let handle = sched
        .spawn_task(async move {
            *out.lock() = Some(sig.wait(Some(&token)).await);
            Ok(())
        })
        .unwrap();

    assert!(handle.is_complete());
    assert_eq!(*outcome.lock(), Some(Err(WaitError::Cancelled)));
    assert_eq!(signal.waiter_count(), 0);
}

#[test]
fn racing_cancel_and_notify_fire_each_waiter_once() {
    init_logging();
    for _ in 0..100 {
        let sched = Scheduler::new();
        let signal = WaitSignal::new();
        let token = CancelToken::new();
        let outcomes = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..4 {
            let (sig, tok, out) = (signal.clone(), token.clone(), outcomes.clone());
            sched
                .spawn_task(async move {
                    let result = sig.wait(Some(&tok)).await;
                    out.lock().push(result);
                    Ok(())
                })
                .unwrap();
        }

        let canceller = {
            let token = token.clone();
            thread::spawn(move || token.cancel())
        };
        signal.notify_all();
        canceller.join().unwrap();

        sched.resume().unwrap();
        assert_eq!(outcomes.lock().len(), 4);
        assert_eq!(signal.waiter_count(), 0);
    }
}
