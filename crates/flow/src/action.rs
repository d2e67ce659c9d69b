//! The action state machine.
//!
//! An [`Action`] is a cheap handle to one node of a workflow tree. The base
//! lifecycle (start/stop/pause/resume/reset) lives here; what a node *does*
//! is supplied by its [`Behavior`]. Completion always travels through
//! [`Finisher::finish`], which defers the state transition and the finish
//! callback to the loop's `run_next` queue so observers never see a state
//! machine mid-transition.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tbox_event::Loop;

/// Structured introspection document.
pub type Json = serde_json::Value;

/// Lifecycle state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
	Idle,
	Running,
	Paused,
	Finished,
}

impl State {
	fn as_str(self) -> &'static str {
		match self {
			State::Idle => "idle",
			State::Running => "running",
			State::Paused => "paused",
			State::Finished => "finished",
		}
	}
}

/// Result of a finished action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Undetermined,
	Succ,
	Fail,
}

impl Outcome {
	fn as_str(self) -> &'static str {
		match self {
			Outcome::Undetermined => "undetermined",
			Outcome::Succ => "succ",
			Outcome::Fail => "fail",
		}
	}
}

type FinishCallback = Rc<RefCell<Option<Box<dyn FnMut(bool)>>>>;

/// What a concrete action supplies on top of the base state machine.
///
/// Hooks are invoked while the owning action is borrowed: a behavior must
/// not call back into its own action's methods from inside a hook. Talking
/// to child actions and to the [`Finisher`] is always fine.
pub trait Behavior {
	/// Wires child finish callbacks to the owning action. Called once,
	/// right after the action is created.
	fn bind(&mut self, parent: &Finisher) {
		let _ = parent;
	}

	/// Enters the running state. Returning `false` aborts the start and the
	/// action drops back to idle.
	fn on_start(&mut self, ctx: &Finisher) -> bool;

	fn on_stop(&mut self) {}

	fn on_pause(&mut self) {}

	fn on_resume(&mut self, ctx: &Finisher) {
		let _ = ctx;
	}

	fn on_reset(&mut self) {}

	/// Adds behavior-specific fields to the introspection document. Pure.
	fn to_json(&self, doc: &mut serde_json::Map<String, Json>) {
		let _ = doc;
	}
}

struct Inner {
	name: String,
	state: State,
	outcome: Outcome,
	finish_cb: FinishCallback,
	behavior: Box<dyn Behavior>,
	ev_loop: Loop,
}

/// One node of a workflow tree.
///
/// Clones are handles to the same node. Composite actions own their
/// children exclusively: dropping the composite drops the tree.
#[derive(Clone)]
pub struct Action {
	inner: Rc<RefCell<Inner>>,
}

impl Action {
	/// Builds an action from a custom behavior. The constructors in
	/// [`actions`](crate::actions) cover the built-in leaves and
	/// combinators.
	pub fn new(ev_loop: &Loop, name: &str, mut behavior: Box<dyn Behavior>) -> Action {
		let inner = Rc::new(RefCell::new(Inner {
			name: name.to_string(),
			state: State::Idle,
			outcome: Outcome::Undetermined,
			finish_cb: Rc::new(RefCell::new(None)),
			behavior: Box::new(Unbound),
			ev_loop: ev_loop.clone(),
		}));
		let action = Action { inner };
		behavior.bind(&action.finisher());
		action.inner.borrow_mut().behavior = behavior;
		action
	}

	pub(crate) fn finisher(&self) -> Finisher {
		let ev_loop = self.inner.borrow().ev_loop.clone();
		Finisher {
			inner: Rc::downgrade(&self.inner),
			ev_loop,
		}
	}

	pub fn name(&self) -> String {
		self.inner.borrow().name.clone()
	}

	pub fn state(&self) -> State {
		self.inner.borrow().state
	}

	pub fn outcome(&self) -> Outcome {
		self.inner.borrow().outcome
	}

	/// Installs the callback invoked (on the loop thread, deferred) when the
	/// action finishes by itself. `stop()` does not trigger it.
	pub fn set_finish_callback(&self, f: impl FnMut(bool) + 'static) {
		let slot = self.inner.borrow().finish_cb.clone();
		*slot.borrow_mut() = Some(Box::new(f));
	}

	/// Idle → Running. Illegal transitions are no-ops returning `false`.
	pub fn start(&self) -> bool {
		{
			let mut inner = self.inner.borrow_mut();
			if inner.state != State::Idle {
				return false;
			}
			inner.state = State::Running;
			inner.outcome = Outcome::Undetermined;
		}
		let ctx = self.finisher();
		let ok = self.inner.borrow_mut().behavior.on_start(&ctx);
		if !ok {
			let mut inner = self.inner.borrow_mut();
			inner.state = State::Idle;
			tracing::debug!(action = %inner.name, "start aborted by behavior");
			return false;
		}
		tracing::trace!(action = %self.inner.borrow().name, "action started");
		true
	}

	/// Running/Paused → Finished(fail), *without* the finish callback.
	pub fn stop(&self) -> bool {
		{
			let inner = self.inner.borrow();
			if inner.state != State::Running && inner.state != State::Paused {
				return false;
			}
		}
		let mut inner = self.inner.borrow_mut();
		inner.behavior.on_stop();
		inner.state = State::Finished;
		inner.outcome = Outcome::Fail;
		tracing::debug!(action = %inner.name, "action stopped");
		true
	}

	/// Running → Paused.
	pub fn pause(&self) -> bool {
		let mut inner = self.inner.borrow_mut();
		if inner.state != State::Running {
			return false;
		}
		inner.behavior.on_pause();
		inner.state = State::Paused;
		true
	}

	/// Paused → Running.
	pub fn resume(&self) -> bool {
		{
			let mut inner = self.inner.borrow_mut();
			if inner.state != State::Paused {
				return false;
			}
			inner.state = State::Running;
		}
		let ctx = self.finisher();
		self.inner.borrow_mut().behavior.on_resume(&ctx);
		true
	}

	/// Finished (or Idle, as a no-op) → Idle. Illegal while active.
	pub fn reset(&self) -> bool {
		{
			let inner = self.inner.borrow();
			if inner.state == State::Running || inner.state == State::Paused {
				return false;
			}
		}
		let mut inner = self.inner.borrow_mut();
		inner.behavior.on_reset();
		inner.state = State::Idle;
		inner.outcome = Outcome::Undetermined;
		true
	}

	/// Emits `{name, state, result, ...}` plus behavior-specific fields,
	/// recursively over children. Pure.
	pub fn to_json(&self) -> Json {
		let inner = self.inner.borrow();
		let mut doc = serde_json::Map::new();
		doc.insert("name".into(), inner.name.clone().into());
		doc.insert("state".into(), inner.state.as_str().into());
		doc.insert("result".into(), inner.outcome.as_str().into());
		inner.behavior.to_json(&mut doc);
		Json::Object(doc)
	}

	/// Applies a deferred finish: sets the terminal state and invokes the
	/// finish callback at most once per terminal transition.
	fn finish_now(&self, is_succ: bool) {
		{
			let mut inner = self.inner.borrow_mut();
			if inner.state != State::Running && inner.state != State::Paused {
				return;
			}
			inner.state = State::Finished;
			inner.outcome = if is_succ { Outcome::Succ } else { Outcome::Fail };
			tracing::debug!(action = %inner.name, is_succ, "action finished");
		}
		let slot = self.inner.borrow().finish_cb.clone();
		let cb = slot.borrow_mut().take();
		if let Some(mut f) = cb {
			f(is_succ);
			let mut s = slot.borrow_mut();
			if s.is_none() {
				*s = Some(f);
			}
		}
	}
}

/// Placeholder behavior held while the real one is being bound.
struct Unbound;

impl Behavior for Unbound {
	fn on_start(&mut self, _ctx: &Finisher) -> bool {
		false
	}
}

/// Weak handle a behavior uses to complete (or inspect) its owning action.
///
/// `finish` never runs synchronously: the transition and the finish
/// callback are posted through the loop's `run_next` queue.
#[derive(Clone)]
pub struct Finisher {
	inner: Weak<RefCell<Inner>>,
	ev_loop: Loop,
}

impl Finisher {
	/// Reports completion of the owning action. No-op once the action has
	/// already reached a terminal state by the time the deferred runs.
	pub fn finish(&self, is_succ: bool) {
		let weak = self.inner.clone();
		self.ev_loop.run_next(move || {
			if let Some(inner) = weak.upgrade() {
				Action { inner }.finish_now(is_succ);
			}
		});
	}

	/// Current state of the owning action, if it still exists.
	pub fn state(&self) -> Option<State> {
		self.inner.upgrade().map(|inner| inner.borrow().state)
	}

	pub fn is_running(&self) -> bool {
		self.state() == Some(State::Running)
	}

	/// The loop driving the owning action.
	pub fn ev_loop(&self) -> &Loop {
		&self.ev_loop
	}
}
