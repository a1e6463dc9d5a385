//! Module imports.
//!
//! The VM does not compile source. A [`ModuleLoader`] supplied by the host
//! turns an import path into compiled bytecode whose constant indices and
//! global slots continue those of the importing program.

use super::*;
use tau_core::gc::alloc;
use tau_core::object::{is_exported, Namespace};
use tracing::debug;

/// Where a module being loaded must place its definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleContext {
    /// Number of global slots already defined. The module's own globals
    /// start at this index.
    pub ndefs: u32,
    /// Length of the shared constant pool. The module's constants are
    /// appended, so its first constant gets this index.
    pub const_base: usize,
}

/// A compiled module ready to run.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Top-level code and the constants it adds to the shared pool.
    /// `ndefs` is the total definition count after this module.
    pub bytecode: Bytecode,
    /// Top-level names and the global slot each one was bound to.
    pub exports: Vec<(String, usize)>,
}

/// Resolves import paths to compiled modules.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &str, ctx: ModuleContext) -> Result<Module, String>;
}

impl Vm {
    /// Load, run and bind the module at `path`, pushing its namespace. A
    /// module is executed at most once per program; later imports of the
    /// same path reuse the cached namespace.
    pub(super) fn load_module(&mut self, path: String) -> Result<(), VmError> {
        let cached = self.state.imports.lock().get(&path).cloned();
        if let Some(module) = cached {
            return self.push(module);
        }

        let loader = self.state.loader.read().clone().ok_or_else(|| {
            VmError::Import(format!("no module loader configured for \"{path}\""))
        })?;
        let ctx = ModuleContext {
            ndefs: self.state.ndefs.load(Ordering::Acquire),
            const_base: self.state.consts.read().len(),
        };
        let module = loader
            .load(&path, ctx)
            .map_err(|e| VmError::Import(format!("{path}: {e}")))?;
        debug!(
            path = %path,
            constants = module.bytecode.constants.len(),
            exports = module.exports.len(),
            "loaded module"
        );

        {
            let mut consts = self.state.consts.write();
            for c in &module.bytecode.constants {
                c.share();
            }
            consts.extend(module.bytecode.constants.iter().cloned());
        }
        self.state
            .ndefs
            .fetch_max(module.bytecode.ndefs, Ordering::AcqRel);

        let config = self.config.spawned().with_file(path.clone());
        let mut unit = self.spawn_unit(config);
        unit.enter_main(&module.bytecode);
        unit.run()
            .map_err(|fatal| VmError::Import(format!("{path}: {fatal}")))?;

        let namespace = Namespace::new();
        {
            let globals = self.state.globals.read();
            for (name, slot) in &module.exports {
                if !is_exported(name) {
                    continue;
                }
                let value = match globals.get(*slot) {
                    Some(Object::Namespace(ns)) => ns.to_module(),
                    Some(other) => other.clone(),
                    None => return Err(VmError::GlobalIndex(*slot)),
                };
                namespace.set(name, value);
            }
        }
        let namespace = Object::Namespace(alloc(namespace));
        namespace.share();
        self.state
            .imports
            .lock()
            .insert(path, namespace.clone());
        self.push(namespace)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tau_core::opcode::make;

    /// Serves one module that defines `Answer = 42` and `hidden = 1`.
    struct OneModule {
        loads: AtomicUsize,
    }

    impl ModuleLoader for OneModule {
        fn load(&self, path: &str, ctx: ModuleContext) -> Result<Module, String> {
            if path != "answer" {
                return Err("not found".into());
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            let base = ctx.const_base;
            let g = ctx.ndefs as usize;
            let mut ins = make(Opcode::Constant, &[base]);
            ins.extend(make(Opcode::SetGlobal, &[g]));
            ins.extend(make(Opcode::Pop, &[]));
            ins.extend(make(Opcode::Constant, &[base + 1]));
            ins.extend(make(Opcode::SetGlobal, &[g + 1]));
            ins.extend(make(Opcode::Pop, &[]));
            let bytecode = Bytecode::new(ins, vec![Object::Int(42), Object::Int(1)])
                .with_ndefs(ctx.ndefs + 2);
            Ok(Module {
                bytecode,
                exports: vec![("Answer".into(), g), ("hidden".into(), g + 1)],
            })
        }
    }

    fn importer(path: &str, times: usize) -> Bytecode {
        let mut ins = Vec::new();
        for _ in 0..times {
            ins.extend(make(Opcode::Constant, &[0]));
            ins.extend(make(Opcode::LoadModule, &[]));
            ins.extend(make(Opcode::Pop, &[]));
        }
        Bytecode::new(ins, vec![Object::string(path)]).with_ndefs(1)
    }

    #[test]
    fn test_import_exposes_capitalized_names() {
        let loader = Arc::new(OneModule {
            loads: AtomicUsize::new(0),
        });
        let mut vm = Vm::new(importer("answer", 1)).with_loader(loader);
        vm.run().unwrap();
        let Object::Namespace(ns) = vm.last_popped() else {
            panic!("expected a namespace, got {:?}", vm.last_popped());
        };
        assert!(ns.get("Answer").unwrap().equals(&Object::Int(42)));
        assert!(ns.get("hidden").is_none());
        assert_eq!(vm.ndefs(), 3);
        assert!(vm.global(1).unwrap().equals(&Object::Int(42)));
    }

    #[test]
    fn test_import_is_cached() {
        let loader = Arc::new(OneModule {
            loads: AtomicUsize::new(0),
        });
        let mut vm = Vm::new(importer("answer", 2)).with_loader(loader.clone());
        vm.run().unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_import_without_loader() {
        let mut vm = Vm::new(importer("answer", 1));
        let fatal = vm.run().unwrap_err();
        assert_eq!(
            fatal.error.to_string(),
            "import: no module loader configured for \"answer\""
        );
    }

    #[test]
    fn test_loader_error_is_fatal() {
        let loader = Arc::new(OneModule {
            loads: AtomicUsize::new(0),
        });
        let mut vm = Vm::new(importer("missing", 1)).with_loader(loader);
        let fatal = vm.run().unwrap_err();
        assert_eq!(fatal.error.to_string(), "import: missing: not found");
    }
}
