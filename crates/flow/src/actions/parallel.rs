//! Run all children at once.

use std::cell::RefCell;
use std::rc::Rc;

use tbox_event::Loop;

use crate::action::{Action, Behavior, Finisher, Json, State};

/// When a parallel action reports completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelPolicy {
	/// Wait for every child; succeed iff all succeeded.
	All,
	/// The first finished child decides; the rest are stopped.
	Any,
}

struct Shared {
	children: Vec<Action>,
	policy: ParallelPolicy,
	done: Vec<bool>,
	all_succ: bool,
}

struct ParallelBehavior {
	shared: Rc<RefCell<Shared>>,
}

impl ParallelBehavior {
	fn active_children(&self) -> Vec<Action> {
		let shared = self.shared.borrow();
		shared
			.children
			.iter()
			.filter(|c| matches!(c.state(), State::Running | State::Paused))
			.cloned()
			.collect()
	}
}

impl Behavior for ParallelBehavior {
	fn bind(&mut self, parent: &Finisher) {
		let children = self.shared.borrow().children.clone();
		for (index, child) in children.into_iter().enumerate() {
			let parent = parent.clone();
			let shared = Rc::downgrade(&self.shared);
			child.set_finish_callback(move |is_succ| {
				let Some(shared) = shared.upgrade() else {
					return;
				};
				if !parent.is_running() {
					return;
				}
				let mut s = shared.borrow_mut();
				s.done[index] = true;
				match s.policy {
					ParallelPolicy::Any => {
						let rest: Vec<Action> = s
							.children
							.iter()
							.enumerate()
							.filter(|&(i, _)| i != index)
							.map(|(_, c)| c.clone())
							.collect();
						drop(s);
						for child in rest {
							child.stop();
						}
						parent.finish(is_succ);
					}
					ParallelPolicy::All => {
						s.all_succ &= is_succ;
						if s.done.iter().all(|&d| d) {
							let all_succ = s.all_succ;
							drop(s);
							parent.finish(all_succ);
						}
					}
				}
			});
		}
	}

	fn on_start(&mut self, _ctx: &Finisher) -> bool {
		let children = {
			let mut shared = self.shared.borrow_mut();
			shared.done.iter_mut().for_each(|d| *d = false);
			shared.all_succ = true;
			shared.children.clone()
		};
		for child in children {
			child.start();
		}
		true
	}

	fn on_stop(&mut self) {
		for child in self.active_children() {
			child.stop();
		}
	}

	fn on_pause(&mut self) {
		for child in self.active_children() {
			child.pause();
		}
	}

	fn on_resume(&mut self, _ctx: &Finisher) {
		for child in self.active_children() {
			child.resume();
		}
	}

	fn on_reset(&mut self) {
		let mut shared = self.shared.borrow_mut();
		shared.done.iter_mut().for_each(|d| *d = false);
		shared.all_succ = true;
		for child in &shared.children {
			child.reset();
		}
	}

	fn to_json(&self, doc: &mut serde_json::Map<String, Json>) {
		let shared = self.shared.borrow();
		let policy = match shared.policy {
			ParallelPolicy::All => "all",
			ParallelPolicy::Any => "any",
		};
		doc.insert("policy".into(), policy.into());
		let children: Vec<Json> = shared.children.iter().map(Action::to_json).collect();
		doc.insert("children".into(), children.into());
	}
}

/// Starts every child at once and completes per `policy`.
pub fn parallel(ev_loop: &Loop, policy: ParallelPolicy, children: Vec<Action>) -> Action {
	assert!(!children.is_empty(), "parallel requires at least one child");
	let done = vec![false; children.len()];
	Action::new(
		ev_loop,
		"Parallel",
		Box::new(ParallelBehavior {
			shared: Rc::new(RefCell::new(Shared {
				children,
				policy,
				done,
				all_succ: true,
			})),
		}),
	)
}
