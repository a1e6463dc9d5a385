//! Calls, returns and concurrent execution units.

use super::*;
use crate::native;
use std::sync::atomic::AtomicU64;
use std::thread;
use tau_core::object::Native;
use tracing::{debug, warn};

static NEXT_UNIT: AtomicU64 = AtomicU64::new(1);

impl Vm {
    /// Index of the callee for a call with `nargs` arguments on the stack.
    fn callee_slot(&self, nargs: usize) -> Result<usize, VmError> {
        self.stack
            .len()
            .checked_sub(nargs + 1)
            .ok_or(VmError::StackUnderflow)
    }

    pub(super) fn call(&mut self, nargs: usize) -> Result<(), VmError> {
        let slot = self.callee_slot(nargs)?;
        let callee = self.stack[slot].clone().unwrap_getsetter();
        match callee {
            Object::Closure(closure) => self.call_closure(closure, nargs),
            Object::Builtin(builtin) => {
                let args = self.pop_n(nargs)?;
                let result = builtin.call(&args);
                self.stack.truncate(slot);
                self.push_new(result)
            }
            Object::Native(handle) => {
                let addr = handle.address().ok_or(VmError::NotCallable)?;
                let args = self.pop_n(nargs)?;
                let word = native::call(addr, &args)?;
                self.stack.truncate(slot);
                self.push_new(Object::native(Native::Pointer(word)))
            }
            _ => Err(VmError::NotCallable),
        }
    }

    /// Push a frame for `closure` over the `nargs` arguments on top of the
    /// stack and reserve its locals.
    pub(super) fn call_closure(
        &mut self,
        closure: Gc<Closure>,
        nargs: usize,
    ) -> Result<(), VmError> {
        let expected = closure.func.num_params as usize;
        if expected != nargs {
            return Err(VmError::WrongArgumentCount {
                expected,
                got: nargs,
            });
        }
        if self.frames.len() >= self.config.max_frames {
            return Err(VmError::FrameOverflow(self.config.max_frames));
        }
        let base = self
            .stack
            .len()
            .checked_sub(nargs)
            .ok_or(VmError::StackUnderflow)?;
        let top = base + (closure.func.num_locals as usize).max(nargs);
        if top > self.config.stack_size {
            return Err(VmError::StackOverflow);
        }
        for arg in &mut self.stack[base..] {
            if matches!(arg, Object::GetSetter(_)) {
                *arg = std::mem::take(arg).unwrap_getsetter();
            }
        }
        self.stack.resize(top, Object::Null);
        self.frames.push(Frame::new(closure, base));
        Ok(())
    }

    /// Pop the current frame, replace the callee slot with `value`. Returns
    /// `true` when the outermost frame returned and the unit is done.
    pub(super) fn return_from_call(&mut self, value: Object) -> Result<bool, VmError> {
        let frame = self.frames.pop().ok_or(VmError::NoFrame)?;
        self.stack.truncate(frame.base.saturating_sub(1));
        self.push(value)?;
        Ok(self.frames.is_empty())
    }

    /// Start the callee in a new execution unit on its own thread and push
    /// null without waiting for it. Arguments are shared with the new unit.
    pub(super) fn concurrent_call(&mut self, nargs: usize) -> Result<(), VmError> {
        let slot = self.callee_slot(nargs)?;
        let callee = self.stack[slot].clone().unwrap_getsetter();
        let args = self.pop_n(nargs)?;
        self.stack.truncate(slot);
        for arg in &args {
            arg.share();
        }
        let id = NEXT_UNIT.fetch_add(1, Ordering::Relaxed);
        let builder = thread::Builder::new().name(format!("tau-unit-{id}"));

        match callee {
            Object::Closure(closure) => {
                let callee = Object::Closure(closure.clone());
                callee.share();
                let mut unit = self.spawn_unit(self.config.spawned());
                unit.stack.push(callee);
                unit.stack.extend(args);
                unit.call_closure(closure, nargs)?;
                debug!(unit = id, nargs, "spawning execution unit");
                builder
                    .spawn(move || unit.run_detached(id))
                    .map_err(|e| VmError::Spawn(e.to_string()))?;
            }
            Object::Builtin(builtin) => {
                debug!(unit = id, builtin = builtin.name, "spawning builtin unit");
                builder
                    .spawn(move || {
                        builtin.call(&args);
                    })
                    .map_err(|e| VmError::Spawn(e.to_string()))?;
            }
            _ => return Err(VmError::NotCallable),
        }
        self.push(Object::Null)
    }

    /// Body of a spawned unit. A fatal error aborts only this unit.
    fn run_detached(mut self, id: u64) {
        if let Err(fatal) = self.run() {
            warn!(unit = id, error = %fatal.error, "execution unit aborted");
            eprintln!("{fatal}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
