//! Signal routing into the loop.
//!
//! These tests mutate process-wide dispositions, so they are serialized.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serial_test::serial;
use tbox_event::{Backend, Loop, Mode, RunMode};

fn raise(signo: i32) {
	unsafe {
		libc::raise(signo);
	}
}

#[test]
#[serial]
fn signal_delivered_on_loop_thread() {
	let ev_loop = Loop::new(Backend::Epoll).unwrap();
	let hits = Rc::new(RefCell::new(Vec::new()));

	let event = ev_loop.new_signal_event();
	{
		let hits = hits.clone();
		event.set_callback(move |signo| hits.borrow_mut().push(signo));
	}
	assert!(event.initialize(libc::SIGUSR1, Mode::Persist));
	assert!(event.enable().unwrap());

	let timer = ev_loop.new_timer_event();
	timer.set_callback(|| raise(libc::SIGUSR1));
	timer.initialize(Duration::from_millis(10), Mode::Oneshot);
	timer.enable();

	ev_loop.exit_after(Duration::from_millis(100));
	ev_loop.run_loop(RunMode::Forever).unwrap();

	assert_eq!(*hits.borrow(), vec![libc::SIGUSR1]);
}

#[test]
#[serial]
fn repeated_arrivals_coalesce_between_cycles() {
	let ev_loop = Loop::new(Backend::Epoll).unwrap();
	let count = Rc::new(RefCell::new(0u32));

	let event = ev_loop.new_signal_event();
	{
		let count = count.clone();
		event.set_callback(move |_| *count.borrow_mut() += 1);
	}
	event.initialize(libc::SIGUSR2, Mode::Persist);
	event.enable().unwrap();

	let timer = ev_loop.new_timer_event();
	timer.set_callback(|| {
		// Both arrivals land before the next dispatch cycle.
		raise(libc::SIGUSR2);
		raise(libc::SIGUSR2);
	});
	timer.initialize(Duration::from_millis(10), Mode::Oneshot);
	timer.enable();

	ev_loop.exit_after(Duration::from_millis(100));
	ev_loop.run_loop(RunMode::Forever).unwrap();

	assert_eq!(*count.borrow(), 1);
}

#[test]
#[serial]
fn oneshot_signal_subscription_fires_once() {
	let ev_loop = Loop::new(Backend::Epoll).unwrap();
	let once_count = Rc::new(RefCell::new(0u32));
	let keeper_count = Rc::new(RefCell::new(0u32));

	// The keeper stays enabled so the process-wide disposition survives the
	// oneshot subscription disabling itself mid-test.
	let keeper = ev_loop.new_signal_event();
	{
		let keeper_count = keeper_count.clone();
		keeper.set_callback(move |_| *keeper_count.borrow_mut() += 1);
	}
	keeper.initialize(libc::SIGUSR1, Mode::Persist);
	keeper.enable().unwrap();

	let event = ev_loop.new_signal_event();
	{
		let once_count = once_count.clone();
		event.set_callback(move |_| *once_count.borrow_mut() += 1);
	}
	event.initialize(libc::SIGUSR1, Mode::Oneshot);
	event.enable().unwrap();

	let timer = ev_loop.new_timer_event();
	timer.set_callback(|| raise(libc::SIGUSR1));
	timer.initialize(Duration::from_millis(10), Mode::Persist);
	timer.enable();

	ev_loop.exit_after(Duration::from_millis(75));
	ev_loop.run_loop(RunMode::Forever).unwrap();

	assert_eq!(*once_count.borrow(), 1);
	assert!(!event.is_enabled());
	assert!(*keeper_count.borrow() > 1);
}

#[test]
#[serial]
fn disabled_subscription_stays_silent() {
	let ev_loop = Loop::new(Backend::Epoll).unwrap();
	let fired = Rc::new(RefCell::new(false));
	let keeper_fired = Rc::new(RefCell::new(false));

	// Keeper holds the disposition so disabling `event` does not revert
	// SIGUSR1 to its (terminating) default before the raise.
	let keeper = ev_loop.new_signal_event();
	{
		let keeper_fired = keeper_fired.clone();
		keeper.set_callback(move |_| *keeper_fired.borrow_mut() = true);
	}
	keeper.initialize(libc::SIGUSR1, Mode::Persist);
	keeper.enable().unwrap();

	let event = ev_loop.new_signal_event();
	{
		let fired = fired.clone();
		event.set_callback(move |_| *fired.borrow_mut() = true);
	}
	event.initialize(libc::SIGUSR1, Mode::Persist);
	event.enable().unwrap();
	event.disable();

	let timer = ev_loop.new_timer_event();
	timer.set_callback(|| raise(libc::SIGUSR1));
	timer.initialize(Duration::from_millis(10), Mode::Oneshot);
	timer.enable();

	ev_loop.exit_after(Duration::from_millis(60));
	ev_loop.run_loop(RunMode::Forever).unwrap();

	assert!(!*fired.borrow());
	assert!(*keeper_fired.borrow());
}
