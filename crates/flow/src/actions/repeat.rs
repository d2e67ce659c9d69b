//! Run one child a fixed number of times.

use std::cell::RefCell;
use std::rc::Rc;

use tbox_event::Loop;

use crate::action::{Action, Behavior, Finisher, Json};

/// How a repeat reacts to its child's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatMode {
	/// Run all repetitions regardless of the child's results; finish succ.
	NoBreak,
	/// Finish succ on the first child success.
	BreakSucc,
	/// Finish fail on the first child failure.
	BreakFail,
}

struct Shared {
	child: Action,
	times: usize,
	remain: usize,
	mode: RepeatMode,
}

struct RepeatBehavior {
	shared: Rc<RefCell<Shared>>,
}

impl Behavior for RepeatBehavior {
	fn bind(&mut self, parent: &Finisher) {
		let parent = parent.clone();
		let shared = Rc::downgrade(&self.shared);
		let child = self.shared.borrow().child.clone();
		child.set_finish_callback(move |is_succ| {
			let Some(shared) = shared.upgrade() else {
				return;
			};
			let mode = shared.borrow().mode;
			let breaks = matches!((mode, is_succ), (RepeatMode::BreakSucc, true) | (RepeatMode::BreakFail, false));
			if breaks {
				parent.finish(is_succ);
			} else if parent.is_running() {
				let restart = {
					let mut s = shared.borrow_mut();
					if s.remain > 0 {
						s.remain -= 1;
						Some(s.child.clone())
					} else {
						None
					}
				};
				match restart {
					Some(child) => {
						child.reset();
						child.start();
					}
					None => parent.finish(true),
				}
			}
		});
	}

	fn on_start(&mut self, _ctx: &Finisher) -> bool {
		let child = {
			let mut shared = self.shared.borrow_mut();
			// The first run happens unconditionally; `remain` counts the
			// restarts still owed after it.
			shared.remain = shared.times - 1;
			shared.child.clone()
		};
		child.start()
	}

	fn on_stop(&mut self) {
		self.shared.borrow().child.stop();
	}

	fn on_pause(&mut self) {
		self.shared.borrow().child.pause();
	}

	fn on_resume(&mut self, _ctx: &Finisher) {
		self.shared.borrow().child.resume();
	}

	fn on_reset(&mut self) {
		self.shared.borrow().child.reset();
	}

	fn to_json(&self, doc: &mut serde_json::Map<String, Json>) {
		let shared = self.shared.borrow();
		doc.insert("repeat_times".into(), (shared.times as u64).into());
		doc.insert("remain_times".into(), (shared.remain as u64).into());
		doc.insert("child".into(), shared.child.to_json());
	}
}

/// Runs `child` up to `times` times, breaking early per `mode`.
pub fn repeat(ev_loop: &Loop, child: Action, times: usize, mode: RepeatMode) -> Action {
	assert!(times != 0, "repeat requires at least one run");
	Action::new(
		ev_loop,
		"Repeat",
		Box::new(RepeatBehavior {
			shared: Rc::new(RefCell::new(Shared {
				child,
				times,
				remain: times - 1,
				mode,
			})),
		}),
	)
}
