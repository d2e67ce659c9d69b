//! Scenario tests for the token-based timer facility.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant, SystemTime};

use tbox_event::{Backend, Loop, RunMode};
use tbox_eventx::{Timers, Token};

fn new_loop() -> Loop {
	Loop::new(Backend::Epoll).unwrap()
}

#[test]
fn do_after_fires_once_on_time() {
	let ev_loop = new_loop();
	let timers = Timers::new(&ev_loop);

	let start = Instant::now();
	let observed: Rc<RefCell<Vec<(Token, Duration)>>> = Rc::new(RefCell::new(Vec::new()));
	let expected: Rc<RefCell<Option<Token>>> = Rc::new(RefCell::new(None));

	let token = {
		let observed = observed.clone();
		timers.do_after(Duration::from_millis(1000), move |t| {
			observed.borrow_mut().push((t, start.elapsed()));
		})
	};
	*expected.borrow_mut() = Some(token);

	ev_loop.exit_after(Duration::from_millis(1500));
	ev_loop.run_loop(RunMode::Forever).unwrap();
	timers.cleanup();

	let observed = observed.borrow();
	assert_eq!(observed.len(), 1);
	let (fired_token, delay) = observed[0];
	assert_eq!(Some(fired_token), *expected.borrow());
	assert!(delay > Duration::from_millis(995), "fired after {delay:?}");
	assert!(delay < Duration::from_millis(1005), "fired after {delay:?}");
}

#[test]
fn cancel_before_fire() {
	let ev_loop = new_loop();
	let timers = Timers::new(&ev_loop);

	let tag = Rc::new(RefCell::new(false));
	let token = {
		let tag = tag.clone();
		timers.do_after(Duration::from_millis(100), move |_| *tag.borrow_mut() = true)
	};
	assert!(timers.cancel(token));

	ev_loop.exit_after(Duration::from_millis(200));
	ev_loop.run_loop(RunMode::Forever).unwrap();
	timers.cleanup();

	assert!(!*tag.borrow());
}

#[test]
fn cancel_twice_second_returns_false() {
	let ev_loop = new_loop();
	let timers = Timers::new(&ev_loop);

	let token = timers.do_after(Duration::from_millis(100), |_| {});
	assert!(timers.cancel(token));
	assert!(!timers.cancel(token));
}

#[test]
fn do_at_fires_once_on_time() {
	let ev_loop = new_loop();
	let timers = Timers::new(&ev_loop);

	let start = Instant::now();
	let fired_at: Rc<RefCell<Option<Duration>>> = Rc::new(RefCell::new(None));

	{
		let fired_at = fired_at.clone();
		timers.do_at(SystemTime::now() + Duration::from_millis(1000), move |_| {
			*fired_at.borrow_mut() = Some(start.elapsed());
		});
	}

	ev_loop.exit_after(Duration::from_millis(1500));
	ev_loop.run_loop(RunMode::Forever).unwrap();
	timers.cleanup();

	let delay = fired_at.borrow().expect("callback fired");
	assert!(delay > Duration::from_millis(995), "fired after {delay:?}");
	assert!(delay < Duration::from_millis(1005), "fired after {delay:?}");
}

#[test]
fn do_at_in_the_past_fires_promptly() {
	let ev_loop = new_loop();
	let timers = Timers::new(&ev_loop);

	let fired = Rc::new(RefCell::new(false));
	{
		let fired = fired.clone();
		timers.do_at(SystemTime::now() - Duration::from_secs(5), move |_| {
			*fired.borrow_mut() = true;
		});
	}

	ev_loop.exit_after(Duration::from_millis(50));
	ev_loop.run_loop(RunMode::Forever).unwrap();
	timers.cleanup();

	assert!(*fired.borrow());
}

#[test]
fn do_every_fires_each_period() {
	let ev_loop = new_loop();
	let timers = Timers::new(&ev_loop);

	let count = Rc::new(RefCell::new(0u32));
	{
		let count = count.clone();
		timers.do_every(Duration::from_millis(100), move |_| *count.borrow_mut() += 1);
	}

	ev_loop.exit_after(Duration::from_millis(1050));
	ev_loop.run_loop(RunMode::Forever).unwrap();
	timers.cleanup();

	let fired = *count.borrow();
	assert!((9..=11).contains(&fired), "fired {fired} times");
}

#[test]
fn periodic_timer_cancels_itself() {
	let ev_loop = new_loop();
	let timers = Timers::new(&ev_loop);

	let count = Rc::new(RefCell::new(0u32));
	{
		let count = count.clone();
		let timers = timers.clone();
		timers.clone().do_every(Duration::from_millis(20), move |token| {
			*count.borrow_mut() += 1;
			if *count.borrow() == 3 {
				// Self-cancel from inside the callback is allowed.
				assert!(timers.cancel(token));
				assert!(!timers.cancel(token));
			}
		});
	}

	ev_loop.exit_after(Duration::from_millis(200));
	ev_loop.run_loop(RunMode::Forever).unwrap();
	timers.cleanup();

	assert_eq!(*count.borrow(), 3);
}

#[test]
fn one_timer_cancels_another() {
	let ev_loop = new_loop();
	let timers = Timers::new(&ev_loop);

	let victim_fired = Rc::new(RefCell::new(false));
	let victim = {
		let victim_fired = victim_fired.clone();
		timers.do_after(Duration::from_millis(100), move |_| *victim_fired.borrow_mut() = true)
	};
	{
		let timers = timers.clone();
		timers.clone().do_after(Duration::from_millis(20), move |_| {
			assert!(timers.cancel(victim));
		});
	}

	ev_loop.exit_after(Duration::from_millis(200));
	ev_loop.run_loop(RunMode::Forever).unwrap();
	timers.cleanup();

	assert!(!*victim_fired.borrow());
}

#[test]
fn cleanup_freezes_outstanding_timers() {
	let ev_loop = new_loop();
	let timers = Timers::new(&ev_loop);

	let count = Rc::new(RefCell::new(0u32));
	for _ in 0..4 {
		let count = count.clone();
		timers.do_after(Duration::from_millis(30), move |_| *count.borrow_mut() += 1);
	}
	assert_eq!(timers.pending(), 4);
	timers.cleanup();
	assert_eq!(timers.pending(), 0);

	ev_loop.exit_after(Duration::from_millis(100));
	ev_loop.run_loop(RunMode::Forever).unwrap();

	assert_eq!(*count.borrow(), 0);
}

#[test]
fn tokens_are_distinct_and_ordered() {
	let ev_loop = new_loop();
	let timers = Timers::new(&ev_loop);

	let a = timers.do_after(Duration::from_millis(10), |_| {});
	let b = timers.do_after(Duration::from_millis(10), |_| {});
	assert_ne!(a, b);
	assert!(a < b);
	timers.cleanup();
}
