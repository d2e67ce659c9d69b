//! The same observable behavior across every compiled-in backend.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tbox_event::{Backend, EventMask, Loop, Mode, RunMode};

#[test]
fn timer_fires_on_every_backend() {
	for backend in Backend::available() {
		let ev_loop = Loop::new(backend).unwrap();
		let count = Rc::new(RefCell::new(0u32));

		let timer = ev_loop.new_timer_event();
		{
			let count = count.clone();
			timer.set_callback(move || *count.borrow_mut() += 1);
		}
		timer.initialize(Duration::from_millis(10), Mode::Oneshot);
		timer.enable();

		ev_loop.exit_after(Duration::from_millis(60));
		ev_loop.run_loop(RunMode::Forever).unwrap();
		assert_eq!(*count.borrow(), 1, "backend {backend:?}");
	}
}

#[test]
fn pipe_read_on_every_backend() {
	for backend in Backend::available() {
		let ev_loop = Loop::new(backend).unwrap();
		let (reader, mut writer) = os_pipe::pipe().unwrap();
		let reader = Rc::new(RefCell::new(reader));
		let payload = Rc::new(RefCell::new(String::new()));

		let event = ev_loop.new_fd_event();
		{
			let reader = reader.clone();
			let payload = payload.clone();
			event.set_callback(move |_| {
				let mut buf = [0u8; 16];
				let n = reader.borrow_mut().read(&mut buf).unwrap();
				payload.borrow_mut().push_str(&String::from_utf8_lossy(&buf[..n]));
			});
		}
		assert!(event.initialize(&*reader.borrow(), EventMask::READ, Mode::Persist));
		assert!(event.enable().unwrap(), "backend {backend:?}");

		writer.write_all(b"ping").unwrap();
		ev_loop.exit_after(Duration::from_millis(50));
		ev_loop.run_loop(RunMode::Forever).unwrap();
		assert_eq!(*payload.borrow(), "ping", "backend {backend:?}");
	}
}

#[test]
fn cross_thread_wake_on_every_backend() {
	for backend in Backend::available() {
		let ev_loop = Loop::new(backend).unwrap();
		let handle = ev_loop.handle();
		let hit = Arc::new(AtomicBool::new(false));

		let worker = {
			let hit = hit.clone();
			thread::spawn(move || {
				thread::sleep(Duration::from_millis(20));
				let inner = hit.clone();
				handle.run_in_loop(move || inner.store(true, Ordering::SeqCst));
				thread::sleep(Duration::from_millis(20));
				handle.exit_loop();
			})
		};

		let start = Instant::now();
		ev_loop.run_loop(RunMode::Forever).unwrap();
		worker.join().unwrap();
		assert!(hit.load(Ordering::SeqCst), "backend {backend:?}");
		assert!(start.elapsed() < Duration::from_secs(2), "backend {backend:?}");
	}
}

#[test]
fn exit_deadline_is_honored() {
	for backend in Backend::available() {
		let ev_loop = Loop::new(backend).unwrap();
		let start = Instant::now();
		ev_loop.exit_after(Duration::from_millis(50));
		ev_loop.run_loop(RunMode::Forever).unwrap();
		let elapsed = start.elapsed();
		assert!(elapsed >= Duration::from_millis(45), "backend {backend:?}: {elapsed:?}");
		assert!(elapsed < Duration::from_millis(500), "backend {backend:?}: {elapsed:?}");
	}
}
