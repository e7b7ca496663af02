// tests/edge_rate_limit.rs
//
// Per-address fixed-window limiter in front of the analysis endpoint.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use case_note_critic::clock::ManualClock;
use case_note_critic::rate_limit::{EdgeRateLimiter, SWEEP_INTERVAL, UNKNOWN_CALLER};

fn limiter(limit: u32) -> (EdgeRateLimiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    (
        EdgeRateLimiter::new(limit, StdDuration::from_secs(60), clock.clone()),
        clock,
    )
}

#[test]
fn allows_up_to_limit_then_limits() {
    let (rl, _clock) = limiter(15);
    for i in 0..15 {
        let d = rl.check("203.0.113.7");
        assert!(!d.limited, "request {i} should pass");
        assert_eq!(d.remaining, 14 - i);
    }
    let d = rl.check("203.0.113.7");
    assert!(d.limited);
    assert_eq!(d.remaining, 0);
    assert_eq!(d.reset_in_ms, 60_000);
}

#[test]
fn window_expiry_starts_a_new_window() {
    let (rl, clock) = limiter(2);
    rl.check("a");
    rl.check("a");
    clock.advance(Duration::seconds(30));
    let d = rl.check("a");
    assert!(d.limited);
    assert_eq!(d.reset_in_ms, 30_000);

    // Exactly at the reset instant the old window still applies.
    clock.advance(Duration::seconds(30));
    assert!(rl.check("a").limited);

    clock.advance(Duration::milliseconds(1));
    let d = rl.check("a");
    assert!(!d.limited);
    assert_eq!(d.remaining, 1);
    assert_eq!(d.reset_in_ms, 60_000);
}

#[test]
fn addresses_do_not_share_windows() {
    let (rl, _clock) = limiter(1);
    assert!(!rl.check("10.0.0.1").limited);
    assert!(rl.check("10.0.0.1").limited);
    assert!(!rl.check("10.0.0.2").limited);
    assert_eq!(rl.tracked_addresses(), 2);
}

#[test]
fn unknown_callers_share_one_bucket() {
    let (rl, _clock) = limiter(3);
    for _ in 0..3 {
        assert!(!rl.check(UNKNOWN_CALLER).limited);
    }
    assert!(rl.check(UNKNOWN_CALLER).limited);
}

#[test]
fn zero_limit_is_clamped_to_one() {
    let (rl, _clock) = limiter(0);
    assert_eq!(rl.limit(), 1);
    assert!(!rl.check("x").limited);
    assert!(rl.check("x").limited);
}

#[test]
fn defaults_match_fifteen_per_minute() {
    let rl = EdgeRateLimiter::with_defaults();
    assert_eq!(rl.limit(), 15);
}

#[test]
fn expired_addresses_are_swept_during_checks() {
    let (rl, clock) = limiter(5);
    for i in 0..SWEEP_INTERVAL {
        rl.check(&format!("10.0.{}.{}", i / 256, i % 256));
    }
    assert_eq!(rl.tracked_addresses(), SWEEP_INTERVAL as usize);

    clock.advance(Duration::hours(1));
    // The check that completes the next interval sweeps everything stale.
    for _ in 0..SWEEP_INTERVAL {
        rl.check("198.51.100.1");
    }
    assert_eq!(rl.tracked_addresses(), 1);
}

#[test]
fn sweep_keeps_addresses_with_a_live_window() {
    let (rl, clock) = limiter(5);
    rl.check("old");
    clock.advance(Duration::seconds(45));
    rl.check("recent");

    assert_eq!(rl.sweep_expired(), 0);
    clock.advance(Duration::seconds(20));
    assert_eq!(rl.sweep_expired(), 1);
    assert_eq!(rl.tracked_addresses(), 1);
    // The surviving window is intact.
    assert_eq!(rl.check("recent").remaining, 3);
}
