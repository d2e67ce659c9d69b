use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tbox_event::{Backend, Loop, RunMode};

use super::*;
use crate::action::{Outcome, State};

fn new_loop() -> Loop {
	Loop::new(Backend::Epoll).unwrap()
}

fn drive(ev_loop: &Loop, ms: u64) {
	ev_loop.exit_after(Duration::from_millis(ms));
	ev_loop.run_loop(RunMode::Forever).unwrap();
}

#[test]
fn test_start_only_from_idle() {
	let ev_loop = new_loop();
	let action = sleep(&ev_loop, Duration::from_millis(50));
	assert_eq!(action.state(), State::Idle);
	assert!(action.start());
	assert_eq!(action.state(), State::Running);
	assert!(!action.start());
}

#[test]
fn test_finish_is_deferred_not_synchronous() {
	let ev_loop = new_loop();
	let action = function(&ev_loop, || true);
	let fired = Rc::new(RefCell::new(false));
	{
		let fired = fired.clone();
		action.set_finish_callback(move |_| *fired.borrow_mut() = true);
	}
	assert!(action.start());
	// The function ran, but completion only lands at the next dispatch
	// boundary.
	assert_eq!(action.state(), State::Running);
	assert!(!*fired.borrow());

	drive(&ev_loop, 10);
	assert_eq!(action.state(), State::Finished);
	assert_eq!(action.outcome(), Outcome::Succ);
	assert!(*fired.borrow());
}

#[test]
fn test_stop_skips_finish_callback() {
	let ev_loop = new_loop();
	let action = sleep(&ev_loop, Duration::from_millis(500));
	let fired = Rc::new(RefCell::new(false));
	{
		let fired = fired.clone();
		action.set_finish_callback(move |_| *fired.borrow_mut() = true);
	}
	action.start();
	assert!(action.stop());
	assert_eq!(action.state(), State::Finished);
	assert_eq!(action.outcome(), Outcome::Fail);
	assert!(!action.stop());

	drive(&ev_loop, 10);
	assert!(!*fired.borrow());
}

#[test]
fn test_pause_resume_roundtrip() {
	let ev_loop = new_loop();
	let action = sleep(&ev_loop, Duration::from_millis(100));
	assert!(!action.pause());
	action.start();
	assert!(action.pause());
	assert_eq!(action.state(), State::Paused);
	assert!(!action.pause());
	assert!(action.resume());
	assert_eq!(action.state(), State::Running);
	assert!(!action.resume());
}

#[test]
fn test_reset_requires_inactive() {
	let ev_loop = new_loop();
	let action = function(&ev_loop, || false);
	action.start();
	assert!(!action.reset());
	drive(&ev_loop, 10);
	assert_eq!(action.outcome(), Outcome::Fail);
	assert!(action.reset());
	assert_eq!(action.state(), State::Idle);
	assert_eq!(action.outcome(), Outcome::Undetermined);

	// A reset action runs again from scratch.
	action.start();
	drive(&ev_loop, 10);
	assert_eq!(action.state(), State::Finished);
}

#[test]
#[should_panic(expected = "at least one run")]
fn test_repeat_rejects_zero_times() {
	let ev_loop = new_loop();
	let child = succ(&ev_loop);
	repeat(&ev_loop, child, 0, RepeatMode::NoBreak);
}

#[test]
#[should_panic(expected = "at least one child")]
fn test_sequence_rejects_empty() {
	let ev_loop = new_loop();
	sequence(&ev_loop, Vec::new());
}

#[test]
fn test_to_json_reports_tree() {
	let ev_loop = new_loop();
	let child = succ(&ev_loop);
	let action = repeat(&ev_loop, child, 5, RepeatMode::NoBreak);

	let doc = action.to_json();
	assert_eq!(doc["name"], "Repeat");
	assert_eq!(doc["state"], "idle");
	assert_eq!(doc["result"], "undetermined");
	assert_eq!(doc["repeat_times"], 5);
	assert_eq!(doc["remain_times"], 4);
	assert_eq!(doc["child"]["name"], "Succ");
}

#[test]
fn test_to_json_is_pure() {
	let ev_loop = new_loop();
	let action = succ(&ev_loop);
	let before = action.to_json();
	let again = action.to_json();
	assert_eq!(before, again);
	assert_eq!(action.state(), State::Idle);
}
