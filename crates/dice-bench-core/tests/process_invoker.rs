//! Subprocess invoker against real shell commands.

#![cfg(unix)]

use std::time::{Duration, Instant};

use dice_bench_core::{Invocation, InvokeOutcome, Invoker, ProcessInvoker};

fn sh(script: &str) -> Invocation {
    Invocation::new("/bin/sh").arg("-c").arg(script)
}

#[test]
fn captures_both_streams_and_exit_code() {
    let outcome = ProcessInvoker::default().invoke(&sh("echo out; echo err >&2; exit 3"));
    let InvokeOutcome::Completed(output) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(output.stdout, "out\n");
    assert_eq!(output.stderr, "err\n");
    assert_eq!(output.exit_code, Some(3));
    assert!(!output.success());
}

#[test]
fn finishes_within_timeout() {
    let outcome =
        ProcessInvoker::default().invoke(&sh("echo fast").timeout(Some(Duration::from_secs(10))));
    assert!(
        matches!(outcome, InvokeOutcome::Completed(ref o) if o.success() && o.stdout == "fast\n"),
        "{outcome:?}"
    );
}

#[test]
fn kills_tool_that_outlives_timeout() {
    let started = Instant::now();
    let outcome = ProcessInvoker::new(Duration::from_millis(10))
        .invoke(&sh("sleep 5 & wait").timeout(Some(Duration::from_millis(200))));
    assert!(matches!(outcome, InvokeOutcome::TimedOut { .. }), "{outcome:?}");
    assert!(
        started.elapsed() < Duration::from_secs(4),
        "timeout took {:?}",
        started.elapsed()
    );
}

#[test]
fn large_output_does_not_block() {
    let script = "i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done";
    let outcome =
        ProcessInvoker::default().invoke(&sh(script).timeout(Some(Duration::from_secs(30))));
    let InvokeOutcome::Completed(output) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(output.stdout.lines().count(), 20000);
    assert!(output.stdout.ends_with("line-19999\n"));
}

#[test]
fn background_child_holding_output_does_not_outlive_timeout() {
    let started = Instant::now();
    let outcome = ProcessInvoker::new(Duration::from_millis(5))
        .invoke(&sh("echo hi; sleep 4 &").timeout(Some(Duration::from_millis(300))));
    let took = started.elapsed();
    assert!(took < Duration::from_secs(2), "invoke took {took:?}");
    let InvokeOutcome::Completed(output) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(output.stdout, "hi\n");
    assert!(output.success());
}

#[test]
fn quick_exit_is_seen_before_a_full_poll_interval() {
    let outcome = ProcessInvoker::new(Duration::from_millis(500))
        .invoke(&sh("exit 0").timeout(Some(Duration::from_secs(10))));
    let InvokeOutcome::Completed(output) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert!(
        output.elapsed < Duration::from_millis(250),
        "elapsed {:?}",
        output.elapsed
    );
}
