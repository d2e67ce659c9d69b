//! Run children left to right; the first failure short-circuits.

use std::cell::RefCell;
use std::rc::Rc;

use tbox_event::Loop;

use crate::action::{Action, Behavior, Finisher, Json};

struct Shared {
	children: Vec<Action>,
	index: usize,
}

struct SequenceBehavior {
	shared: Rc<RefCell<Shared>>,
}

impl SequenceBehavior {
	fn current(&self) -> Option<Action> {
		let shared = self.shared.borrow();
		shared.children.get(shared.index).cloned()
	}
}

impl Behavior for SequenceBehavior {
	fn bind(&mut self, parent: &Finisher) {
		let children = self.shared.borrow().children.clone();
		for child in children {
			let parent = parent.clone();
			let shared = Rc::downgrade(&self.shared);
			child.set_finish_callback(move |is_succ| {
				let Some(shared) = shared.upgrade() else {
					return;
				};
				if !parent.is_running() {
					return;
				}
				if !is_succ {
					parent.finish(false);
					return;
				}
				let next = {
					let mut s = shared.borrow_mut();
					s.index += 1;
					s.children.get(s.index).cloned()
				};
				match next {
					Some(child) => {
						child.start();
					}
					None => parent.finish(true),
				}
			});
		}
	}

	fn on_start(&mut self, _ctx: &Finisher) -> bool {
		let first = {
			let mut shared = self.shared.borrow_mut();
			shared.index = 0;
			shared.children[0].clone()
		};
		first.start()
	}

	fn on_stop(&mut self) {
		if let Some(child) = self.current() {
			child.stop();
		}
	}

	fn on_pause(&mut self) {
		if let Some(child) = self.current() {
			child.pause();
		}
	}

	fn on_resume(&mut self, _ctx: &Finisher) {
		if let Some(child) = self.current() {
			child.resume();
		}
	}

	fn on_reset(&mut self) {
		let mut shared = self.shared.borrow_mut();
		shared.index = 0;
		for child in &shared.children {
			child.reset();
		}
	}

	fn to_json(&self, doc: &mut serde_json::Map<String, Json>) {
		let shared = self.shared.borrow();
		doc.insert("index".into(), (shared.index as u64).into());
		let children: Vec<Json> = shared.children.iter().map(Action::to_json).collect();
		doc.insert("children".into(), children.into());
	}
}

/// Runs `children` in order. Fails on the first failing child; succeeds
/// when every child succeeded.
pub fn sequence(ev_loop: &Loop, children: Vec<Action>) -> Action {
	assert!(!children.is_empty(), "sequence requires at least one child");
	Action::new(
		ev_loop,
		"Sequence",
		Box::new(SequenceBehavior {
			shared: Rc::new(RefCell::new(Shared { children, index: 0 })),
		}),
	)
}
