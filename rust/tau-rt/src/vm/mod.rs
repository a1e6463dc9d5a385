//! The stack-based virtual machine.
//!
//! A [`Vm`] is one execution unit: an operand stack, a call-frame stack and
//! a private allocation registry. Units created by `concurrent_call` or by
//! module imports share the constant pool, the global table, the import
//! cache and the module loader through [`State`].

mod call;
mod module;
mod ops;

pub use module::{Module, ModuleContext, ModuleLoader};

use crate::builtins;
use crate::config::VmConfig;
use crate::error::{Fatal, VmError};
use crate::gc::{self, Heap, SweepStats};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tau_core::gc::Gc;
use tau_core::object::{Bookmark, Closure, Function};
use tau_core::{Bytecode, Object, Opcode};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared by every unit descending from one root [`Vm`].
pub struct State {
    consts: RwLock<Vec<Object>>,
    globals: RwLock<Vec<Object>>,
    ndefs: AtomicU32,
    imports: Mutex<HashMap<String, Object>>,
    loader: RwLock<Option<Arc<dyn ModuleLoader>>>,
}

impl State {
    fn new(bytecode: &Bytecode, globals_size: usize) -> Self {
        for c in &bytecode.constants {
            c.share();
        }
        Self {
            consts: RwLock::new(bytecode.constants.clone()),
            globals: RwLock::new(vec![Object::Null; globals_size]),
            ndefs: AtomicU32::new(bytecode.ndefs),
            imports: Mutex::new(HashMap::new()),
            loader: RwLock::new(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// An activation record. `base` is the stack index of the first argument;
/// the callee sits just below it.
struct Frame {
    closure: Gc<Closure>,
    ip: usize,
    base: usize,
}

impl Frame {
    fn new(closure: Gc<Closure>, base: usize) -> Self {
        Self {
            closure,
            ip: 0,
            base,
        }
    }

    fn function(&self) -> &Function {
        &self.closure.func
    }
}

// ---------------------------------------------------------------------------
// VM
// ---------------------------------------------------------------------------

pub struct Vm {
    config: VmConfig,
    state: Arc<State>,
    stack: Vec<Object>,
    frames: Vec<Frame>,
    heap: Heap,
    last_popped: Object,
    /// Offset of the instruction being executed in the current function.
    op_start: usize,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_config(bytecode, VmConfig::default())
    }

    pub fn with_config(bytecode: Bytecode, config: VmConfig) -> Self {
        let state = Arc::new(State::new(&bytecode, config.globals_size));
        let mut vm = Self::unit(state, config);
        vm.enter_main(&bytecode);
        vm
    }

    /// Install the loader used by `load_module`. It is shared with every
    /// unit spawned from this one.
    pub fn with_loader(self, loader: Arc<dyn ModuleLoader>) -> Self {
        *self.state.loader.write() = Some(loader);
        self
    }

    fn unit(state: Arc<State>, config: VmConfig) -> Self {
        let heap = Heap::new(config.heap_capacity, config.gc_threshold_percent);
        Self {
            stack: Vec::with_capacity(config.stack_size.min(1024)),
            frames: Vec::new(),
            heap,
            last_popped: Object::Null,
            op_start: 0,
            config,
            state,
        }
    }

    /// A fresh unit sharing this unit's state.
    fn spawn_unit(&self, config: VmConfig) -> Vm {
        Vm::unit(self.state.clone(), config)
    }

    fn enter_main(&mut self, bytecode: &Bytecode) {
        let main = Arc::new(bytecode.main_function());
        let Object::Closure(closure) = Object::closure(main, Vec::new()) else {
            return;
        };
        self.frames.push(Frame::new(closure, 0));
    }

    // --- Inspection ---

    /// The value most recently removed by `pop`.
    pub fn last_popped(&self) -> &Object {
        &self.last_popped
    }

    /// The value of global slot `index`.
    pub fn global(&self, index: usize) -> Option<Object> {
        self.state.globals.read().get(index).cloned()
    }

    /// The value on top of the operand stack.
    pub fn stack_top(&self) -> Option<&Object> {
        self.stack.last()
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Number of global definitions known to the shared state, including
    /// those of imported modules.
    pub fn ndefs(&self) -> u32 {
        self.state.ndefs.load(Ordering::Acquire)
    }

    // --- Execution ---

    /// Run until the outermost frame returns or a halt instruction. A fatal
    /// error aborts this unit and is reported with its source position.
    pub fn run(&mut self) -> Result<(), Fatal> {
        self.execute().map_err(|e| self.fatal(e))
    }

    /// Bookmarks are recorded at the offset just past their instructions,
    /// so the lookup starts one byte into the faulting instruction.
    fn fatal(&self, error: VmError) -> Fatal {
        let bookmark = self
            .frames
            .last()
            .and_then(|f| Bookmark::lookup(&f.function().bookmarks, self.op_start + 1))
            .cloned();
        Fatal::new(error, self.config.file.clone(), bookmark)
    }

    fn execute(&mut self) -> Result<(), VmError> {
        loop {
            let Some(frame) = self.frames.last() else {
                return Ok(());
            };
            let ins = &frame.function().instructions;
            let ip = frame.ip;
            if ip >= ins.len() {
                // Falling off the end of a function returns null; falling
                // off the end of the outermost frame halts.
                if self.frames.len() == 1 {
                    return Ok(());
                }
                if self.return_from_call(Object::Null)? {
                    return Ok(());
                }
                continue;
            }
            let byte = ins[ip];
            self.op_start = ip;
            let op = Opcode::from_byte(byte).ok_or(VmError::UnknownOpcode(byte))?;
            self.frame_mut()?.ip += 1;

            match op {
                Opcode::Constant => {
                    let idx = self.read_u16()?;
                    let c = self.constant(idx)?;
                    self.push(c)?;
                }
                Opcode::True => self.push(Object::Bool(true))?,
                Opcode::False => self.push(Object::Bool(false))?,
                Opcode::Null => self.push(Object::Null)?,
                Opcode::List => {
                    let n = self.read_u16()?;
                    let items = self.pop_n(n)?;
                    self.push_new(Object::list(items))?;
                }
                Opcode::Map => {
                    let n = self.read_u16()?;
                    let items = self.pop_n(n)?;
                    let map = ops::build_map(items)?;
                    self.push_new(map)?;
                }
                Opcode::Closure => {
                    let idx = self.read_u16()?;
                    let nfree = self.read_u8()?;
                    self.push_closure(idx, nfree)?;
                }
                Opcode::CurrentClosure => {
                    let closure = self.frame()?.closure.clone();
                    self.push(Object::Closure(closure))?;
                }
                Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::BwAnd
                | Opcode::BwOr
                | Opcode::BwXor
                | Opcode::BwLShift
                | Opcode::BwRShift
                | Opcode::GreaterThan
                | Opcode::GreaterThanEqual => {
                    let right = self.pop_value()?;
                    let left = self.pop_value()?;
                    let result = ops::binary(op, &left, &right)?;
                    self.push_new(result)?;
                }
                Opcode::And | Opcode::Or => {
                    let right = self.pop_value()?;
                    let left = self.pop_value()?;
                    let result = if op == Opcode::And {
                        left.is_truthy() && right.is_truthy()
                    } else {
                        left.is_truthy() || right.is_truthy()
                    };
                    self.push(Object::Bool(result))?;
                }
                Opcode::Equal | Opcode::NotEqual => {
                    let right = self.pop_value()?;
                    let left = self.pop_value()?;
                    let eq = left.equals(&right);
                    self.push(Object::Bool(if op == Opcode::Equal { eq } else { !eq }))?;
                }
                Opcode::BwNot | Opcode::Minus | Opcode::Bang => {
                    let operand = self.pop_value()?;
                    self.push(ops::unary(op, &operand)?)?;
                }
                Opcode::Index => {
                    let index = self.pop_value()?;
                    let left = self.pop_value()?;
                    let result = ops::index(&left, &index)?;
                    self.push_new(result)?;
                }
                Opcode::Call => {
                    let nargs = self.read_u8()?;
                    self.call(nargs)?;
                }
                Opcode::ConcurrentCall => {
                    let nargs = self.read_u8()?;
                    self.concurrent_call(nargs)?;
                }
                Opcode::Return => {
                    if self.return_from_call(Object::Null)? {
                        return Ok(());
                    }
                }
                Opcode::ReturnValue => {
                    let value = self.pop_value()?;
                    if self.return_from_call(value)? {
                        return Ok(());
                    }
                }
                Opcode::Jump => {
                    let target = self.read_u16()?;
                    self.frame_mut()?.ip = target;
                }
                Opcode::JumpNotTruthy => {
                    let target = self.read_u16()?;
                    let cond = self.pop_value()?;
                    if !cond.is_truthy() {
                        self.frame_mut()?.ip = target;
                    }
                }
                Opcode::Dot => {
                    let right = self.pop()?;
                    let left = self.pop_value()?;
                    self.push(ops::dot(&left, &right)?)?;
                }
                Opcode::Define => {
                    let value = self.pop_value()?;
                    let target = self.pop()?;
                    let Object::GetSetter(gs) = target else {
                        return Err(VmError::CannotAssign(target.type_name()));
                    };
                    let result = gs.set(value);
                    self.push(result)?;
                }
                Opcode::GetGlobal => {
                    let idx = self.read_u16()?;
                    let value = self.global(idx).ok_or(VmError::GlobalIndex(idx))?;
                    self.push(value)?;
                }
                Opcode::SetGlobal => {
                    let idx = self.read_u16()?;
                    let value = self.peek()?.clone().unwrap_getsetter();
                    value.share();
                    let mut globals = self.state.globals.write();
                    let slot = globals.get_mut(idx).ok_or(VmError::GlobalIndex(idx))?;
                    *slot = value;
                }
                Opcode::GetLocal => {
                    let idx = self.read_u8()?;
                    let slot = self.local_slot(idx)?;
                    let value = self.stack[slot].clone();
                    self.push(value)?;
                }
                Opcode::SetLocal => {
                    let idx = self.read_u8()?;
                    let slot = self.local_slot(idx)?;
                    let value = self.peek()?.clone().unwrap_getsetter();
                    self.stack[slot] = value;
                }
                Opcode::GetBuiltin => {
                    let idx = self.read_u8()?;
                    let builtin = builtins::get(idx).ok_or(VmError::BuiltinIndex(idx))?;
                    self.push(Object::Builtin(builtin))?;
                }
                Opcode::GetFree => {
                    let idx = self.read_u8()?;
                    let value = self
                        .frame()?
                        .closure
                        .free
                        .get(idx)
                        .cloned()
                        .ok_or(VmError::FreeIndex(idx))?;
                    self.push(value)?;
                }
                Opcode::LoadModule => {
                    let path = self.pop_value()?;
                    let Object::String(path) = path else {
                        return Err(VmError::Import(format!(
                            "expected string, got {}",
                            path.type_name()
                        )));
                    };
                    self.load_module(path.to_string_lossy())?;
                }
                Opcode::Interpolate => {
                    let idx = self.read_u16()?;
                    let nargs = self.read_u16()?;
                    self.interpolate(idx, nargs)?;
                }
                Opcode::Pop => {
                    self.last_popped = self.pop()?.unwrap_getsetter();
                }
                Opcode::Halt => return Ok(()),
            }
        }
    }

    // --- Instruction stream ---

    fn frame(&self) -> Result<&Frame, VmError> {
        self.frames.last().ok_or(VmError::NoFrame)
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, VmError> {
        self.frames.last_mut().ok_or(VmError::NoFrame)
    }

    fn read_u8(&mut self) -> Result<usize, VmError> {
        let frame = self.frame_mut()?;
        let b = *frame
            .closure
            .func
            .instructions
            .get(frame.ip)
            .ok_or(VmError::TruncatedInstruction)?;
        frame.ip += 1;
        Ok(b as usize)
    }

    fn read_u16(&mut self) -> Result<usize, VmError> {
        let frame = self.frame_mut()?;
        let v = tau_core::opcode::read_u16(&frame.closure.func.instructions, frame.ip)
            .ok_or(VmError::TruncatedInstruction)?;
        frame.ip += 2;
        Ok(v as usize)
    }

    fn constant(&self, idx: usize) -> Result<Object, VmError> {
        self.state
            .consts
            .read()
            .get(idx)
            .cloned()
            .ok_or(VmError::ConstantIndex(idx))
    }

    fn local_slot(&self, idx: usize) -> Result<usize, VmError> {
        let slot = self.frame()?.base + idx;
        if slot >= self.stack.len() {
            return Err(VmError::LocalIndex(idx));
        }
        Ok(slot)
    }

    // --- Operand stack ---

    fn push(&mut self, o: Object) -> Result<(), VmError> {
        if self.stack.len() >= self.config.stack_size {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(o);
        Ok(())
    }

    /// Push a freshly allocated object: register it with the heap and run
    /// a collection if the registry crossed its threshold.
    fn push_new(&mut self, o: Object) -> Result<(), VmError> {
        let tracked = self.heap.track(&o);
        self.push(o)?;
        if tracked && self.heap.should_collect() {
            self.collect();
        }
        Ok(())
    }

    fn pop(&mut self) -> Result<Object, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    /// Pop and resolve a getsetter to its value.
    fn pop_value(&mut self) -> Result<Object, VmError> {
        Ok(self.pop()?.unwrap_getsetter())
    }

    /// Pop the top `n` values, returned bottom first with getsetters resolved.
    fn pop_n(&mut self, n: usize) -> Result<Vec<Object>, VmError> {
        let start = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or(VmError::StackUnderflow)?;
        Ok(self
            .stack
            .drain(start..)
            .map(Object::unwrap_getsetter)
            .collect())
    }

    fn peek(&self) -> Result<&Object, VmError> {
        self.stack.last().ok_or(VmError::StackUnderflow)
    }

    // --- Collection ---

    /// Run a full collection of this unit's registry. The roots are the
    /// operand stack, the constant pool, the globals, the closures of the
    /// active frames and the last popped value.
    pub fn collect(&mut self) -> SweepStats {
        let frames: Vec<Object> = self
            .frames
            .iter()
            .map(|f| Object::Closure(f.closure.clone()))
            .collect();
        {
            let consts = self.state.consts.read();
            let globals = self.state.globals.read();
            gc::mark_roots(&[
                self.stack.as_slice(),
                consts.as_slice(),
                globals.as_slice(),
                frames.as_slice(),
                std::slice::from_ref(&self.last_popped),
            ]);
        }
        self.heap.sweep()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tau_core::opcode::make;

    fn program(parts: &[(Opcode, &[usize])]) -> Vec<u8> {
        parts.iter().flat_map(|(op, args)| make(*op, args)).collect()
    }

    #[test]
    fn test_constant_and_pop() {
        let ins = program(&[(Opcode::Constant, &[0]), (Opcode::Pop, &[])]);
        let mut vm = Vm::new(Bytecode::new(ins, vec![Object::Int(7)]));
        vm.run().unwrap();
        assert!(vm.last_popped().equals(&Object::Int(7)));
    }

    #[test]
    fn test_empty_program_halts() {
        let mut vm = Vm::new(Bytecode::default());
        vm.run().unwrap();
        assert!(vm.last_popped().is_null());
    }

    #[test]
    fn test_set_global_keeps_value_on_stack() {
        let ins = program(&[(Opcode::Constant, &[0]), (Opcode::SetGlobal, &[3])]);
        let mut vm = Vm::new(Bytecode::new(ins, vec![Object::string("g")]));
        vm.run().unwrap();
        assert_eq!(vm.global(3).unwrap().to_string(), "g");
        assert_eq!(vm.stack_top().unwrap().to_string(), "g");
        assert!(vm.global(3).unwrap().header().unwrap().is_shared());
    }

    #[test]
    fn test_unknown_opcode_is_fatal() {
        let mut vm = Vm::new(Bytecode::new(vec![0xee], vec![]));
        let fatal = vm.run().unwrap_err();
        assert_eq!(fatal.error, VmError::UnknownOpcode(0xee));
    }

    #[test]
    fn test_truncated_operand_is_fatal() {
        let mut vm = Vm::new(Bytecode::new(vec![Opcode::Constant as u8, 0], vec![]));
        assert_eq!(vm.run().unwrap_err().error, VmError::TruncatedInstruction);
    }

    #[test]
    fn test_stack_overflow() {
        let mut parts = Vec::new();
        for _ in 0..5 {
            parts.push((Opcode::Null, &[][..]));
        }
        let config = VmConfig::default().with_stack_size(4);
        let mut vm = Vm::with_config(Bytecode::new(program(&parts), vec![]), config);
        assert_eq!(vm.run().unwrap_err().error, VmError::StackOverflow);
    }

    #[test]
    fn test_collect_frees_unreachable_and_keeps_stack() {
        let ins = program(&[
            (Opcode::Constant, &[0]),
            (Opcode::Constant, &[0]),
            (Opcode::Add, &[]),
            (Opcode::Pop, &[]),
            (Opcode::Constant, &[0]),
            (Opcode::Constant, &[0]),
            (Opcode::Add, &[]),
        ]);
        let mut vm = Vm::new(Bytecode::new(ins, vec![Object::string("ab")]));
        vm.run().unwrap();
        assert_eq!(vm.heap().len(), 2);
        // Drop the popped concatenation from the roots.
        vm.last_popped = Object::Null;
        let stats = vm.collect();
        assert_eq!(stats.freed, 1);
        assert_eq!(vm.stack_top().unwrap().to_string(), "abab");
    }
}
