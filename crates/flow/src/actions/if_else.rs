//! Branch on a condition child's result.

use std::cell::RefCell;
use std::rc::Rc;

use tbox_event::Loop;

use crate::action::{Action, Behavior, Finisher, Json, State};

struct Shared {
	cond: Action,
	then_branch: Option<Action>,
	else_branch: Option<Action>,
}

struct IfElseBehavior {
	shared: Rc<RefCell<Shared>>,
}

impl IfElseBehavior {
	fn active_parts(&self) -> Vec<Action> {
		let shared = self.shared.borrow();
		[Some(&shared.cond), shared.then_branch.as_ref(), shared.else_branch.as_ref()]
			.into_iter()
			.flatten()
			.filter(|a| matches!(a.state(), State::Running | State::Paused))
			.cloned()
			.collect()
	}
}

impl Behavior for IfElseBehavior {
	fn bind(&mut self, parent: &Finisher) {
		{
			let parent = parent.clone();
			let shared = Rc::downgrade(&self.shared);
			self.shared.borrow().cond.set_finish_callback(move |is_succ| {
				let Some(shared) = shared.upgrade() else {
					return;
				};
				if !parent.is_running() {
					return;
				}
				let branch = {
					let s = shared.borrow();
					if is_succ { s.then_branch.clone() } else { s.else_branch.clone() }
				};
				match branch {
					Some(branch) => {
						branch.start();
					}
					// A missing branch is a successful no-op.
					None => parent.finish(true),
				}
			});
		}
		for branch in [
			self.shared.borrow().then_branch.clone(),
			self.shared.borrow().else_branch.clone(),
		]
		.into_iter()
		.flatten()
		{
			let parent = parent.clone();
			branch.set_finish_callback(move |is_succ| {
				if parent.is_running() {
					parent.finish(is_succ);
				}
			});
		}
	}

	fn on_start(&mut self, _ctx: &Finisher) -> bool {
		self.shared.borrow().cond.clone().start()
	}

	fn on_stop(&mut self) {
		for part in self.active_parts() {
			part.stop();
		}
	}

	fn on_pause(&mut self) {
		for part in self.active_parts() {
			part.pause();
		}
	}

	fn on_resume(&mut self, _ctx: &Finisher) {
		for part in self.active_parts() {
			part.resume();
		}
	}

	fn on_reset(&mut self) {
		let shared = self.shared.borrow();
		shared.cond.reset();
		if let Some(branch) = &shared.then_branch {
			branch.reset();
		}
		if let Some(branch) = &shared.else_branch {
			branch.reset();
		}
	}

	fn to_json(&self, doc: &mut serde_json::Map<String, Json>) {
		let shared = self.shared.borrow();
		doc.insert("if".into(), shared.cond.to_json());
		if let Some(branch) = &shared.then_branch {
			doc.insert("then".into(), branch.to_json());
		}
		if let Some(branch) = &shared.else_branch {
			doc.insert("else".into(), branch.to_json());
		}
	}
}

/// Runs `cond`, then the branch matching its result. A missing branch
/// finishes succ immediately.
pub fn if_else(ev_loop: &Loop, cond: Action, then_branch: Option<Action>, else_branch: Option<Action>) -> Action {
	Action::new(
		ev_loop,
		"IfElse",
		Box::new(IfElseBehavior {
			shared: Rc::new(RefCell::new(Shared {
				cond,
				then_branch,
				else_branch,
			})),
		}),
	)
}
