//! Re-run one child until a result breaks the loop.

use std::cell::RefCell;
use std::rc::Rc;

use tbox_event::Loop;

use crate::action::{Action, Behavior, Finisher, Json};

/// When a looping action stops re-running its child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
	/// Never finishes by itself; only `stop()` ends it.
	Forever,
	/// Finishes succ when the child first succeeds.
	UntilSucc,
	/// Finishes fail when the child first fails.
	UntilFail,
}

struct Shared {
	child: Action,
	mode: LoopMode,
}

struct LoopBehavior {
	shared: Rc<RefCell<Shared>>,
}

impl Behavior for LoopBehavior {
	fn bind(&mut self, parent: &Finisher) {
		let parent = parent.clone();
		let shared = Rc::downgrade(&self.shared);
		let child = self.shared.borrow().child.clone();
		child.set_finish_callback(move |is_succ| {
			let Some(shared) = shared.upgrade() else {
				return;
			};
			if !parent.is_running() {
				return;
			}
			let mode = shared.borrow().mode;
			let breaks = matches!((mode, is_succ), (LoopMode::UntilSucc, true) | (LoopMode::UntilFail, false));
			if breaks {
				parent.finish(is_succ);
			} else {
				let child = shared.borrow().child.clone();
				child.reset();
				child.start();
			}
		});
	}

	fn on_start(&mut self, _ctx: &Finisher) -> bool {
		self.shared.borrow().child.clone().start()
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
		let mode = match shared.mode {
			LoopMode::Forever => "forever",
			LoopMode::UntilSucc => "until_succ",
			LoopMode::UntilFail => "until_fail",
		};
		doc.insert("mode".into(), mode.into());
		doc.insert("child".into(), shared.child.to_json());
	}
}

/// Re-runs `child` per `mode`.
///
/// The child should take real time to finish (a sleep, an fd wait): a child
/// that completes immediately restarts within the same dispatch boundary
/// and will spin the loop thread.
pub fn loop_action(ev_loop: &Loop, child: Action, mode: LoopMode) -> Action {
	Action::new(
		ev_loop,
		"Loop",
		Box::new(LoopBehavior {
			shared: Rc::new(RefCell::new(Shared { child, mode })),
		}),
	)
}
