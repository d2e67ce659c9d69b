use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use super::state::ExitRequest;
use super::*;
use crate::mask::Mode;

#[test]
fn test_exit_request_earliest_wins() {
	let e = ExitRequest::None.tighten(500);
	assert_eq!(e, ExitRequest::At(500));
	assert_eq!(e.tighten(900), ExitRequest::At(500));
	assert_eq!(e.tighten(100), ExitRequest::At(100));
	assert_eq!(ExitRequest::Now.tighten(100), ExitRequest::Now);
}

#[test]
fn test_timer_deadline_orders_by_deadline_then_seq() {
	use super::state::TimerDeadline;
	let mut heap = std::collections::BinaryHeap::new();
	heap.push(TimerDeadline { deadline_ns: 30, seq: 0, key: 0, generation: 0 });
	heap.push(TimerDeadline { deadline_ns: 10, seq: 2, key: 1, generation: 0 });
	heap.push(TimerDeadline { deadline_ns: 10, seq: 1, key: 2, generation: 0 });
	let order: Vec<usize> = std::iter::from_fn(|| heap.pop()).map(|t| t.key).collect();
	assert_eq!(order, vec![2, 1, 0]);
}

#[test]
fn test_run_next_fifo_before_wait() {
	let ev_loop = Loop::new(Backend::Epoll).unwrap();
	let order = Rc::new(RefCell::new(Vec::new()));

	let o = order.clone();
	ev_loop.run_next(move || o.borrow_mut().push(1));
	let o = order.clone();
	ev_loop.run_next(move || o.borrow_mut().push(2));

	ev_loop.exit_after(Duration::from_millis(10));
	ev_loop.run_loop(RunMode::Forever).unwrap();
	assert_eq!(*order.borrow(), vec![1, 2]);
}

#[test]
fn test_run_in_loop_single_cycle() {
	let ev_loop = Loop::new(Backend::Epoll).unwrap();
	let hit = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));

	let h = hit.clone();
	ev_loop.run_in_loop(move || h.store(true, std::sync::atomic::Ordering::SeqCst));
	ev_loop.run_loop(RunMode::Once).unwrap();
	assert!(hit.load(std::sync::atomic::Ordering::SeqCst));
}

#[test]
fn test_oneshot_timer_fires_once() {
	let ev_loop = Loop::new(Backend::Epoll).unwrap();
	let count = Rc::new(RefCell::new(0u32));

	let timer = ev_loop.new_timer_event();
	let c = count.clone();
	timer.set_callback(move || *c.borrow_mut() += 1);
	assert!(timer.initialize(Duration::from_millis(10), Mode::Oneshot));
	assert!(timer.enable());

	ev_loop.exit_after(Duration::from_millis(100));
	ev_loop.run_loop(RunMode::Forever).unwrap();

	assert_eq!(*count.borrow(), 1);
	assert!(!timer.is_enabled());
}

#[test]
fn test_persist_timer_fires_repeatedly() {
	let ev_loop = Loop::new(Backend::Epoll).unwrap();
	let count = Rc::new(RefCell::new(0u32));

	let timer = ev_loop.new_timer_event();
	let c = count.clone();
	timer.set_callback(move || *c.borrow_mut() += 1);
	timer.initialize(Duration::from_millis(10), Mode::Persist);
	timer.enable();

	ev_loop.exit_after(Duration::from_millis(105));
	ev_loop.run_loop(RunMode::Forever).unwrap();

	let fired = *count.borrow();
	assert!((8..=11).contains(&fired), "fired {fired} times");
}

#[test]
fn test_timer_disable_from_own_callback() {
	let ev_loop = Loop::new(Backend::Epoll).unwrap();
	let count = Rc::new(RefCell::new(0u32));

	let timer = Rc::new(ev_loop.new_timer_event());
	let c = count.clone();
	let t = timer.clone();
	timer.set_callback(move || {
		*c.borrow_mut() += 1;
		t.disable();
	});
	timer.initialize(Duration::from_millis(5), Mode::Persist);
	timer.enable();

	ev_loop.exit_after(Duration::from_millis(60));
	ev_loop.run_loop(RunMode::Forever).unwrap();
	assert_eq!(*count.borrow(), 1);
}

#[test]
fn test_exit_loop_from_callback() {
	let ev_loop = Loop::new(Backend::Epoll).unwrap();

	let timer = ev_loop.new_timer_event();
	let inner = ev_loop.clone();
	timer.set_callback(move || inner.exit_loop());
	timer.initialize(Duration::from_millis(5), Mode::Oneshot);
	timer.enable();

	// Fallback so a regression cannot hang the test binary.
	ev_loop.exit_after(Duration::from_secs(5));
	let start = std::time::Instant::now();
	ev_loop.run_loop(RunMode::Forever).unwrap();
	assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_unknown_backend_tag() {
	assert!(Loop::from_tag("libuv").is_err());
	assert!(Loop::from_tag("epoll").is_ok());
}
